use crate::backend::{
    BackendError, Document, DocumentBackend, DocumentKey, DocumentListener, Fields, Revision,
    WatchId,
};
use crate::error::StoreError;
use crate::layout::FieldLayout;
use crate::retry::{Pause, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tally_core::{CandidateIndex, SessionToken, Tally, Version};

const SESSIONS_SUFFIX: &str = ".sessions";

/// How a ballot is written to the backing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteStrategy {
    /// read the document, write it back conditioned on its revision and
    /// start over on a conflict
    CompareAndSwap,
    /// rely on the backend's own increment of a field
    AtomicIncrement,
}

impl Default for WriteStrategy {
    fn default() -> Self {
        WriteStrategy::CompareAndSwap
    }
}

/// Outcome of a committed increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    pub candidate: CandidateIndex,
    /// count of the candidate right after this increment
    pub count: u64,
    /// the whole tally as committed by this increment
    pub tally: Tally,
    /// revision of the document holding `tally`
    pub revision: Revision,
}

impl Increment {
    pub fn version(&self) -> Version {
        self.tally.version()
    }
}

/// Receives the tally after every change of the backing document.
///
/// Revisions only move forward, across resets too: a notification with an
/// older revision than one already seen is stale.
pub trait TallyListener: Send + Sync {
    fn tally_changed(&self, tally: Tally, revision: Revision);
}

/// Owner of the authoritative counters. All mutations of the tally go
/// through [`TallyStore::increment`].
///
/// The voted sessions are kept next to the counters, in a second document
/// (`<key>.sessions`) mapping each token to its candidate position plus one.
pub struct TallyStore<B> {
    backend: B,
    key: DocumentKey,
    sessions_key: DocumentKey,
    layout: FieldLayout,
    strategy: WriteStrategy,
    retry: RetryPolicy,
    pause: Pause,
}

impl<B: DocumentBackend> TallyStore<B> {
    pub fn new(backend: B, key: DocumentKey, layout: FieldLayout) -> Self {
        Self {
            backend,
            sessions_key: DocumentKey::new(format!("{}{}", key, SESSIONS_SUFFIX)),
            key,
            layout,
            strategy: WriteStrategy::default(),
            retry: RetryPolicy::default(),
            pause: Arc::new(std::thread::sleep),
        }
    }

    pub fn with_strategy(self, strategy: WriteStrategy) -> Self {
        Self { strategy, ..self }
    }

    pub fn with_retry(self, retry: RetryPolicy) -> Self {
        Self { retry, ..self }
    }

    /// wait between retries with `pause`, the current thread sleeps by
    /// default
    pub fn with_pause(self, pause: Pause) -> Self {
        Self { pause, ..self }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    pub fn sessions_key(&self) -> &DocumentKey {
        &self.sessions_key
    }

    fn retrying<T, F>(&self, operation: &'static str, attempt_once: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Result<T, BackendError>,
    {
        self.retry.run_with(operation, attempt_once, &*self.pause)
    }

    /// add one ballot for the candidate
    ///
    /// Concurrent increments never lose each other. A conflicting write is
    /// retried from a fresh read of the document.
    ///
    /// # errors
    ///
    /// * [`StoreError::UnknownCandidate`] if the layout has no counter for
    ///   the candidate;
    /// * [`StoreError::Unavailable`] once the retry budget is exhausted.
    pub fn increment(&self, candidate: CandidateIndex) -> Result<Increment, StoreError> {
        let field = self
            .layout
            .field(candidate)
            .ok_or(StoreError::UnknownCandidate(candidate))?;

        let document = self.retrying("increment", || match self.strategy {
            WriteStrategy::CompareAndSwap => {
                let current = self.backend.fetch(&self.key)?;
                let mut fields = current.fields;
                let value = fields.entry(field.to_owned()).or_insert(0);
                *value = value.saturating_add(1);
                self.backend
                    .compare_and_swap(&self.key, current.revision, fields)
            }
            WriteStrategy::AtomicIncrement => self.backend.increment(&self.key, field),
        })?;

        let tally = self.layout.decode(&document);
        let count = tally.count(candidate).unwrap_or(0);
        tracing::trace!(%candidate, count, version = %tally.version(), "tally incremented");
        Ok(Increment {
            candidate,
            count,
            tally,
            revision: document.revision,
        })
    }

    /// consistent snapshot of the tally: all counts come from one revision
    /// of the document
    pub fn read(&self) -> Result<Tally, StoreError> {
        let document = self.retrying("read", || self.backend.fetch(&self.key))?;
        Ok(self.layout.decode(&document))
    }

    /// put every counter back to zero and forget the voted sessions, to
    /// start a new voting period
    ///
    /// The counters are zeroed first: if forgetting the sessions then
    /// fails, sessions of the old period still cannot vote twice.
    pub fn reset(&self) -> Result<Tally, StoreError> {
        let document = self.retrying("reset", || {
            self.backend.overwrite(&self.key, self.layout.zeroed())
        })?;
        self.retrying("reset sessions", || {
            self.backend.overwrite(&self.sessions_key, Fields::new())
        })?;
        tracing::info!(key = %self.key, "tally reset");
        Ok(self.layout.decode(&document))
    }

    /// persist that the session voted for the candidate, once its ballot
    /// was counted
    pub fn record_session(
        &self,
        token: &SessionToken,
        candidate: CandidateIndex,
    ) -> Result<(), StoreError> {
        let marker = candidate.as_usize() as u64 + 1;
        self.retrying("record session", || {
            let current = self.backend.fetch(&self.sessions_key)?;
            if current.fields.get(token.as_str()) == Some(&marker) {
                return Ok(());
            }
            let mut fields = current.fields;
            fields.insert(token.as_str().to_owned(), marker);
            self.backend
                .compare_and_swap(&self.sessions_key, current.revision, fields)
                .map(|_| ())
        })
    }

    /// the sessions persisted as voted in the current period
    ///
    /// Markers naming a candidate outside the layout are skipped.
    pub fn voted_sessions(&self) -> Result<Vec<(SessionToken, CandidateIndex)>, StoreError> {
        let document = self.retrying("read sessions", || self.backend.fetch(&self.sessions_key))?;
        let layout = &self.layout;
        Ok(document
            .fields
            .into_iter()
            .filter(|(_, marker)| *marker != 0)
            .filter_map(|(token, marker)| {
                let candidate = usize::try_from(marker - 1)
                    .ok()
                    .and_then(CandidateIndex::from_position)
                    .filter(|candidate| layout.field(*candidate).is_some());
                if candidate.is_none() {
                    tracing::warn!(session = %token, marker, "ignoring session marker of an unknown candidate");
                }
                candidate.map(|candidate| (SessionToken::new(token), candidate))
            })
            .collect())
    }

    /// subscribe to the changes of the tally. The listener receives the
    /// current tally before this returns.
    pub fn watch(&self, listener: Arc<dyn TallyListener>) -> Result<WatchId, StoreError> {
        let watcher: Arc<dyn DocumentListener> = Arc::new(TallyWatcher {
            layout: self.layout.clone(),
            listener,
        });
        self.retrying("watch", || self.backend.watch(&self.key, watcher.clone()))
    }

    pub fn unwatch(&self, id: WatchId) {
        self.backend.unwatch(&self.key, id)
    }
}

struct TallyWatcher {
    layout: FieldLayout,
    listener: Arc<dyn TallyListener>,
}

impl DocumentListener for TallyWatcher {
    fn document_changed(&self, _key: &DocumentKey, document: &Document) {
        self.listener
            .tally_changed(self.layout.decode(document), document.revision)
    }
}
