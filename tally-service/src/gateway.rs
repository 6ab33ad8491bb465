use crate::error::SubmitError;
use std::sync::Arc;
use tally_core::{CandidateIndex, CandidateSet, SessionState, SessionToken};
use tally_store::{Claim, DocumentBackend, Increment, SessionRegistry, StoreError, TallyStore};

/// A submission that was counted, now or before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepted {
    /// the ballot was counted by this submission
    Counted(Increment),
    /// the session had already voted for this candidate, nothing changed
    Replayed { candidate: CandidateIndex },
}

/// Validates and deduplicates ballots before they reach the tally.
pub struct SubmissionGateway<B> {
    candidates: CandidateSet,
    sessions: SessionRegistry,
    store: Arc<TallyStore<B>>,
}

impl<B: DocumentBackend> SubmissionGateway<B> {
    pub fn new(candidates: CandidateSet, store: Arc<TallyStore<B>>) -> Self {
        Self::with_sessions(candidates, store, SessionRegistry::new())
    }

    /// gateway resuming a voting period, `sessions` holds the sessions
    /// that already voted
    pub fn with_sessions(
        candidates: CandidateSet,
        store: Arc<TallyStore<B>>,
        sessions: SessionRegistry,
    ) -> Self {
        Self {
            candidates,
            sessions,
            store,
        }
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn session_state(&self, token: &SessionToken) -> Option<SessionState> {
        self.sessions.state(token)
    }

    /// cast the session's ballot for the candidate
    ///
    /// At most one increment per session ever reaches the tally store:
    /// submitting again for the same candidate is accepted without
    /// counting twice, submitting for another candidate is refused.
    ///
    /// Once counted, the session is also recorded in the store so that a
    /// gateway resuming the period knows it voted. The ballot stays
    /// accepted if only that record fails.
    ///
    /// Blocks the calling thread while the store is retried.
    ///
    /// # errors
    ///
    /// * [`SubmitError::InvalidCandidate`], nothing is recorded;
    /// * [`SubmitError::AlreadyVoted`], the session voted for another
    ///   candidate;
    /// * [`SubmitError::Store`], the ballot could not be written and the
    ///   session is still unvoted, the submission can be sent again.
    #[tracing::instrument(level = "debug", skip_all, fields(session = %token, candidate = raw_candidate))]
    pub fn submit(
        &self,
        token: &SessionToken,
        raw_candidate: u32,
    ) -> Result<Accepted, SubmitError> {
        let candidate = self.candidates.index(raw_candidate)?;

        match self
            .sessions
            .claim(token, candidate, || self.count(token, candidate))?
        {
            Claim::Claimed(increment) => {
                tracing::debug!(
                    count = increment.count,
                    version = %increment.version(),
                    "ballot accepted"
                );
                Ok(Accepted::Counted(increment))
            }
            Claim::Replayed(candidate) => {
                tracing::debug!("ballot already counted, replay accepted");
                Ok(Accepted::Replayed { candidate })
            }
            Claim::AlreadyVoted { recorded } => {
                tracing::warn!(%recorded, "session already voted for another candidate");
                Err(SubmitError::AlreadyVoted { recorded })
            }
        }
    }

    fn count(
        &self,
        token: &SessionToken,
        candidate: CandidateIndex,
    ) -> Result<Increment, StoreError> {
        let increment = self.store.increment(candidate)?;
        if let Err(error) = self.store.record_session(token, candidate) {
            tracing::error!(%error, "ballot counted but the session could not be recorded");
        }
        Ok(increment)
    }

    /// forget every session, to start a new voting period
    pub(crate) fn clear_sessions(&self) {
        self.sessions.clear()
    }
}
