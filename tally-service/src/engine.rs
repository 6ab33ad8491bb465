use crate::channel::{LiveSync, Subscription, SubscriptionHandle};
use crate::error::{ChannelDisconnected, EngineError, SubmitError};
use crate::gateway::{Accepted, SubmissionGateway};
use crate::settings::Settings;
use std::sync::Arc;
use tally_core::{CandidateSet, ResultSnapshot, SessionState, SessionToken, Tally};
use tally_store::backend::WatchId;
use tally_store::{DocumentBackend, Pause, SessionRegistry, StoreError, TallyStore};

/// The tally engine: gateway, store and live channel wired together over
/// one backing document.
///
/// The live channel is fed from two sources: the store's change
/// notifications and the tallies committed by this engine's own accepted
/// ballots. The second one makes an accepted ballot part of the very next
/// snapshot delivered, whatever the latency of the backend notifications.
///
/// An engine opened on an existing document resumes its tally and the
/// sessions recorded next to it, so a known session is never counted twice.
pub struct Engine<B: DocumentBackend> {
    gateway: SubmissionGateway<B>,
    store: Arc<TallyStore<B>>,
    live: LiveSync,
    watch: WatchId,
}

impl<B: DocumentBackend> Engine<B> {
    pub fn new(settings: &Settings, backend: B) -> Result<Self, EngineError> {
        Self::with_pause(settings, backend, Arc::new(std::thread::sleep))
    }

    /// open the engine with `pause` waiting between two store attempts in
    /// place of sleeping the submitting thread
    pub fn with_pause(settings: &Settings, backend: B, pause: Pause) -> Result<Self, EngineError> {
        if settings.retry.max_attempts == 0 {
            return Err(EngineError::NoRetryBudget);
        }

        let candidates = settings.candidate_set()?;
        let layout = settings.field_layout()?;
        let store = Arc::new(
            TallyStore::new(backend, settings.document.clone(), layout)
                .with_strategy(settings.write_strategy)
                .with_retry(settings.retry)
                .with_pause(pause),
        );

        let initial = store.read()?;
        let sessions = SessionRegistry::from_voted(store.voted_sessions()?);
        let live = LiveSync::new(&initial, settings.basis);
        let watch = store.watch(Arc::new(live.clone()))?;

        tracing::info!(
            document = %settings.document,
            candidates = candidates.len(),
            version = %initial.version(),
            sessions = sessions.len(),
            basis = ?settings.basis,
            strategy = ?settings.write_strategy,
            "tally engine started"
        );

        Ok(Self {
            gateway: SubmissionGateway::with_sessions(candidates, store.clone(), sessions),
            store,
            live,
            watch,
        })
    }

    pub fn candidates(&self) -> &CandidateSet {
        self.gateway.candidates()
    }

    pub fn live(&self) -> &LiveSync {
        &self.live
    }

    pub fn store(&self) -> &TallyStore<B> {
        &self.store
    }

    pub fn session_state(&self, token: &SessionToken) -> Option<SessionState> {
        self.gateway.session_state(token)
    }

    /// see [`SubmissionGateway::submit`]
    pub fn submit(&self, token: &SessionToken, raw_candidate: u32) -> Result<Accepted, SubmitError> {
        let accepted = self.gateway.submit(token, raw_candidate)?;
        if let Accepted::Counted(increment) = &accepted {
            self.live.commit(&increment.tally, increment.revision);
        }
        Ok(accepted)
    }

    pub fn tally(&self) -> Result<Tally, StoreError> {
        self.store.read()
    }

    pub fn subscribe(&self) -> Result<(ResultSnapshot, Subscription), ChannelDisconnected> {
        self.live.subscribe()
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.live.unsubscribe(handle)
    }

    /// start a new voting period: counters back to zero, recorded sessions
    /// forgotten and observers disconnected
    ///
    /// Meant to run while no ballot is being submitted.
    pub fn reset(&self) -> Result<(), StoreError> {
        let tally = self.store.reset()?;
        self.gateway.clear_sessions();
        self.live.restart(&tally);
        tracing::info!("new voting period started");
        Ok(())
    }
}

impl<B: DocumentBackend> Drop for Engine<B> {
    fn drop(&mut self) {
        self.store.unwatch(self.watch);
        self.live.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::CandidateSettings;
    use tally_core::{CandidateIndex, Version};
    use tally_store::{MemoryBackend, RetryPolicy};

    #[test]
    pub fn refuses_an_empty_retry_budget() {
        let settings = Settings {
            retry: RetryPolicy::immediate(0),
            ..Settings::default()
        };
        assert!(matches!(
            Engine::new(&settings, MemoryBackend::new()),
            Err(EngineError::NoRetryBudget)
        ));
    }

    #[test]
    pub fn refuses_a_single_candidate() {
        let settings = Settings {
            candidates: vec![CandidateSettings {
                key: "alone".to_owned(),
                field: None,
            }],
            ..Settings::default()
        };
        assert!(matches!(
            Engine::new(&settings, MemoryBackend::new()),
            Err(EngineError::Candidates(_))
        ));
    }

    #[test]
    pub fn resumes_from_the_persisted_tally() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let engine = Engine::new(&Settings::default(), backend.clone()).unwrap();
            engine.submit(&SessionToken::new("a"), 0).unwrap();
            engine.submit(&SessionToken::new("b"), 2).unwrap();
        }

        let engine = Engine::new(&Settings::default(), backend.clone()).unwrap();
        assert_eq!(engine.tally().unwrap().counts(), &[1, 0, 1]);
        assert_eq!(engine.live().latest().version, Version::new(2));
    }

    #[test]
    pub fn restarted_engine_does_not_recount_a_known_session() {
        let backend = Arc::new(MemoryBackend::new());
        let a = SessionToken::new("a");
        {
            let engine = Engine::new(&Settings::default(), backend.clone()).unwrap();
            engine.submit(&a, 0).unwrap();
            engine.submit(&SessionToken::new("b"), 2).unwrap();
        }

        let engine = Engine::new(&Settings::default(), backend.clone()).unwrap();
        assert_eq!(engine.session_state(&a), Some(SessionState::Voted(CandidateIndex::new(0))));
        assert!(matches!(
            engine.submit(&a, 0),
            Ok(Accepted::Replayed { candidate }) if candidate == CandidateIndex::new(0)
        ));
        assert_eq!(
            engine.submit(&a, 1).unwrap_err(),
            SubmitError::AlreadyVoted {
                recorded: CandidateIndex::new(0)
            }
        );
        assert_eq!(engine.tally().unwrap().counts(), &[1, 0, 1]);

        assert!(matches!(engine.submit(&SessionToken::new("c"), 1), Ok(Accepted::Counted(_))));
        assert_eq!(engine.tally().unwrap().counts(), &[1, 1, 1]);
    }

    #[test]
    pub fn reset_period_is_not_restored() {
        let backend = Arc::new(MemoryBackend::new());
        let a = SessionToken::new("a");
        {
            let engine = Engine::new(&Settings::default(), backend.clone()).unwrap();
            engine.submit(&a, 0).unwrap();
            engine.reset().unwrap();
        }

        let engine = Engine::new(&Settings::default(), backend.clone()).unwrap();
        assert_eq!(engine.session_state(&a), None);
        assert!(matches!(engine.submit(&a, 1), Ok(Accepted::Counted(_))));
        assert_eq!(engine.tally().unwrap().counts(), &[0, 1, 0]);
    }

    #[test]
    pub fn drop_stops_watching_the_document() {
        let backend = Arc::new(MemoryBackend::new());
        let key = Settings::default().document;
        let engine = Engine::new(&Settings::default(), backend.clone()).unwrap();
        assert_eq!(backend.watchers(&key), 1);
        drop(engine);
        assert_eq!(backend.watchers(&key), 0);
    }

    #[test]
    pub fn reset_starts_a_new_period() {
        let engine = Engine::new(&Settings::default(), MemoryBackend::new()).unwrap();
        let token = SessionToken::new("abc");
        engine.submit(&token, 1).unwrap();
        let (_, subscription) = engine.subscribe().unwrap();

        engine.reset().unwrap();

        assert_eq!(engine.tally().unwrap(), Tally::zero(3));
        assert_eq!(engine.session_state(&token), None);
        assert!(subscription.try_next().is_none());
        let (initial, _) = engine.subscribe().unwrap();
        assert_eq!(initial.version, Version::ZERO);

        assert!(matches!(engine.submit(&token, 2), Ok(Accepted::Counted(_))));
    }
}
