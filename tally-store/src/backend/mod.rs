//! The backing document collaborator.
//!
//! The tally lives in a single document of integer fields. Any medium that
//! can keep such a document, increment one of its fields atomically, swap it
//! conditionally on its revision and push every change to listeners can back
//! the tally.

mod memory;

pub use memory::MemoryBackend;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// fields of a document, by name
pub type Fields = BTreeMap<String, u64>;

/// Fixed identifier of a document in the backing store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn new<S: Into<String>>(key: S) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Revision of a document, moved forward by the backend on every write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u64);

impl Revision {
    pub const INITIAL: Revision = Revision(0);

    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    #[must_use]
    pub fn next(self) -> Revision {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub fields: Fields,
    pub revision: Revision,
}

impl Document {
    /// a document that was never written
    pub fn empty() -> Self {
        Self {
            fields: Fields::new(),
            revision: Revision::INITIAL,
        }
    }

    /// value of the field, a missing field reads as zero
    pub fn field(&self, name: &str) -> u64 {
        self.fields.get(name).copied().unwrap_or(0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("document was written concurrently, expected revision {expected} but found {actual}")]
    Conflict { expected: Revision, actual: Revision },

    #[error("backing store cannot be reached: {0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, BackendError::Conflict { .. })
    }
}

/// Handle of a change subscription, to give back to [`DocumentBackend::unwatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

impl WatchId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Receives the full document after every change.
///
/// Notifications of concurrent writes may reach a listener in any order,
/// listeners compare revisions (or anything derived from the fields) to
/// ignore stale documents.
pub trait DocumentListener: Send + Sync {
    fn document_changed(&self, key: &DocumentKey, document: &Document);
}

pub trait DocumentBackend: Send + Sync {
    /// current content of the document, [`Document::empty`] if it was never
    /// written
    fn fetch(&self, key: &DocumentKey) -> Result<Document, BackendError>;

    /// replace the fields of the document if its revision is still
    /// `expected`, fails with [`BackendError::Conflict`] otherwise
    fn compare_and_swap(
        &self,
        key: &DocumentKey,
        expected: Revision,
        fields: Fields,
    ) -> Result<Document, BackendError>;

    /// add one to the field, atomically, and return the resulting document
    fn increment(&self, key: &DocumentKey, field: &str) -> Result<Document, BackendError>;

    /// unconditionally replace the fields of the document
    fn overwrite(&self, key: &DocumentKey, fields: Fields) -> Result<Document, BackendError>;

    /// register a listener of the document's changes. The listener is
    /// called once with the current document before this returns.
    fn watch(
        &self,
        key: &DocumentKey,
        listener: Arc<dyn DocumentListener>,
    ) -> Result<WatchId, BackendError>;

    /// stop notifying the listener, unknown ids are ignored
    fn unwatch(&self, key: &DocumentKey, id: WatchId);
}

impl<B: DocumentBackend + ?Sized> DocumentBackend for Arc<B> {
    fn fetch(&self, key: &DocumentKey) -> Result<Document, BackendError> {
        (**self).fetch(key)
    }

    fn compare_and_swap(
        &self,
        key: &DocumentKey,
        expected: Revision,
        fields: Fields,
    ) -> Result<Document, BackendError> {
        (**self).compare_and_swap(key, expected, fields)
    }

    fn increment(&self, key: &DocumentKey, field: &str) -> Result<Document, BackendError> {
        (**self).increment(key, field)
    }

    fn overwrite(&self, key: &DocumentKey, fields: Fields) -> Result<Document, BackendError> {
        (**self).overwrite(key, fields)
    }

    fn watch(
        &self,
        key: &DocumentKey,
        listener: Arc<dyn DocumentListener>,
    ) -> Result<WatchId, BackendError> {
        (**self).watch(key, listener)
    }

    fn unwatch(&self, key: &DocumentKey, id: WatchId) {
        (**self).unwatch(key, id)
    }
}
