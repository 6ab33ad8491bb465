//! Fault injection and recording helpers for tests of the tally and of
//! the crates built on top of it.

use crate::backend::{
    BackendError, Document, DocumentBackend, DocumentKey, DocumentListener, Fields, Revision,
    WatchId,
};
use crate::tally_store::TallyListener;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tally_core::Tally;

/// Wraps a backend and makes a configured number of operations fail.
///
/// Injected conflicts hit writes only (they are what a concurrent writer
/// would cause), injected outages hit every operation but `unwatch`.
pub struct FlakyBackend<B> {
    inner: B,
    conflicts: AtomicU32,
    outages: AtomicU32,
    writes: AtomicU64,
}

impl<B> FlakyBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            conflicts: AtomicU32::new(0),
            outages: AtomicU32::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// fail the next `n` writes with a conflict
    pub fn inject_conflicts(&self, n: u32) {
        self.conflicts.fetch_add(n, Ordering::SeqCst);
    }

    /// fail the next `n` operations as unreachable
    pub fn inject_outages(&self, n: u32) {
        self.outages.fetch_add(n, Ordering::SeqCst);
    }

    /// writes that reached the wrapped backend
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn outage(&self) -> Result<(), BackendError> {
        if Self::take(&self.outages) {
            Err(BackendError::Unavailable("injected outage".to_owned()))
        } else {
            Ok(())
        }
    }

    fn before_write(&self) -> Result<(), BackendError> {
        self.outage()?;
        if Self::take(&self.conflicts) {
            return Err(BackendError::Conflict {
                expected: Revision::INITIAL,
                actual: Revision::INITIAL.next(),
            });
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl<B: DocumentBackend> DocumentBackend for FlakyBackend<B> {
    fn fetch(&self, key: &DocumentKey) -> Result<Document, BackendError> {
        self.outage()?;
        self.inner.fetch(key)
    }

    fn compare_and_swap(
        &self,
        key: &DocumentKey,
        expected: Revision,
        fields: Fields,
    ) -> Result<Document, BackendError> {
        self.before_write()?;
        self.inner.compare_and_swap(key, expected, fields)
    }

    fn increment(&self, key: &DocumentKey, field: &str) -> Result<Document, BackendError> {
        self.before_write()?;
        self.inner.increment(key, field)
    }

    fn overwrite(&self, key: &DocumentKey, fields: Fields) -> Result<Document, BackendError> {
        self.before_write()?;
        self.inner.overwrite(key, fields)
    }

    fn watch(
        &self,
        key: &DocumentKey,
        listener: Arc<dyn DocumentListener>,
    ) -> Result<WatchId, BackendError> {
        self.outage()?;
        self.inner.watch(key, listener)
    }

    fn unwatch(&self, key: &DocumentKey, id: WatchId) {
        self.inner.unwatch(key, id)
    }
}

/// Keeps every document it is notified of.
#[derive(Default)]
pub struct RecordingDocuments {
    documents: Mutex<Vec<Document>>,
}

impl RecordingDocuments {
    pub fn documents(&self) -> Vec<Document> {
        self.documents.lock().clone()
    }
}

impl DocumentListener for RecordingDocuments {
    fn document_changed(&self, _key: &DocumentKey, document: &Document) {
        self.documents.lock().push(document.clone())
    }
}

/// Keeps every tally it is notified of, with its revision.
#[derive(Default)]
pub struct RecordingTallies {
    tallies: Mutex<Vec<(Tally, Revision)>>,
}

impl RecordingTallies {
    pub fn tallies(&self) -> Vec<Tally> {
        self.tallies.lock().iter().map(|(tally, _)| tally.clone()).collect()
    }

    pub fn revisions(&self) -> Vec<Revision> {
        self.tallies.lock().iter().map(|(_, revision)| *revision).collect()
    }
}

impl TallyListener for RecordingTallies {
    fn tally_changed(&self, tally: Tally, revision: Revision) {
        self.tallies.lock().push((tally, revision))
    }
}
