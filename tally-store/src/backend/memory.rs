use super::{
    BackendError, Document, DocumentBackend, DocumentKey, DocumentListener, Fields, Revision,
    WatchId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// In-process document store.
///
/// Writes are serialized by a single lock held only for the duration of the
/// write itself; listeners are notified after the lock is released.
#[derive(Default)]
pub struct MemoryBackend {
    documents: Mutex<HashMap<DocumentKey, Entry>>,
    next_watch: AtomicU64,
}

struct Entry {
    document: Document,
    listeners: Vec<(WatchId, Arc<dyn DocumentListener>)>,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            document: Document::empty(),
            listeners: Vec::new(),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// number of listeners currently watching the document
    pub fn watchers(&self, key: &DocumentKey) -> usize {
        self.documents
            .lock()
            .get(key)
            .map(|entry| entry.listeners.len())
            .unwrap_or(0)
    }

    fn write<F>(&self, key: &DocumentKey, update: F) -> Result<Document, BackendError>
    where
        F: FnOnce(&Document) -> Result<Fields, BackendError>,
    {
        let (document, listeners) = {
            let mut documents = self.documents.lock();
            let entry = documents.entry(key.clone()).or_default();
            let fields = update(&entry.document)?;
            entry.document = Document {
                fields,
                revision: entry.document.revision.next(),
            };
            let listeners: Vec<_> = entry.listeners.iter().map(|(_, l)| l.clone()).collect();
            (entry.document.clone(), listeners)
        };

        for listener in listeners {
            listener.document_changed(key, &document);
        }

        Ok(document)
    }
}

impl DocumentBackend for MemoryBackend {
    fn fetch(&self, key: &DocumentKey) -> Result<Document, BackendError> {
        Ok(self
            .documents
            .lock()
            .get(key)
            .map(|entry| entry.document.clone())
            .unwrap_or_else(Document::empty))
    }

    fn compare_and_swap(
        &self,
        key: &DocumentKey,
        expected: Revision,
        fields: Fields,
    ) -> Result<Document, BackendError> {
        self.write(key, move |current| {
            if current.revision == expected {
                Ok(fields)
            } else {
                Err(BackendError::Conflict {
                    expected,
                    actual: current.revision,
                })
            }
        })
    }

    fn increment(&self, key: &DocumentKey, field: &str) -> Result<Document, BackendError> {
        self.write(key, |current| {
            let mut fields = current.fields.clone();
            let value = fields.entry(field.to_owned()).or_insert(0);
            *value = value.saturating_add(1);
            Ok(fields)
        })
    }

    fn overwrite(&self, key: &DocumentKey, fields: Fields) -> Result<Document, BackendError> {
        self.write(key, move |_| Ok(fields))
    }

    fn watch(
        &self,
        key: &DocumentKey,
        listener: Arc<dyn DocumentListener>,
    ) -> Result<WatchId, BackendError> {
        let id = WatchId::new(self.next_watch.fetch_add(1, Ordering::Relaxed));
        let current = {
            let mut documents = self.documents.lock();
            let entry = documents.entry(key.clone()).or_default();
            entry.listeners.push((id, listener.clone()));
            entry.document.clone()
        };
        listener.document_changed(key, &current);
        Ok(id)
    }

    fn unwatch(&self, key: &DocumentKey, id: WatchId) {
        if let Some(entry) = self.documents.lock().get_mut(key) {
            entry.listeners.retain(|(watch, _)| *watch != id);
        }
    }
}
