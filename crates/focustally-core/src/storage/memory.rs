//! In-memory document store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::document::{DocPath, Document, Patch, WriteMode};
use super::store::DocumentStore;
use crate::error::StoreError;

/// Mutex-guarded ordered map of documents.
///
/// Every call holds the lock for its whole duration, so increments and
/// transactions are trivially serializable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<DocPath, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.lock().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<DocPath, Document>>, StoreError> {
        self.docs
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        Ok(self.lock()?.get(path).cloned())
    }

    fn set(&self, path: &DocPath, patch: &Patch, mode: WriteMode) -> Result<(), StoreError> {
        let mut docs = self.lock()?;
        let mut doc = match mode {
            WriteMode::Merge => docs.get(path).cloned().unwrap_or_default(),
            WriteMode::Replace => Document::new(),
        };
        patch.apply(&mut doc)?;
        docs.insert(path.clone(), doc);
        Ok(())
    }

    fn update(&self, path: &DocPath, patch: &Patch) -> Result<(), StoreError> {
        let mut docs = self.lock()?;
        let doc = docs
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        let mut next = doc.clone();
        patch.apply(&mut next)?;
        *doc = next;
        Ok(())
    }

    fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        self.lock()?.remove(path);
        Ok(())
    }

    fn list(&self, collection: &DocPath) -> Result<Vec<(DocPath, Document)>, StoreError> {
        let docs = self.lock()?;
        Ok(docs
            .iter()
            .filter(|(path, _)| path.is_child_of(collection))
            .map(|(path, doc)| (path.clone(), doc.clone()))
            .collect())
    }

    fn transaction(
        &self,
        path: &DocPath,
        f: &mut dyn FnMut(Option<&Document>) -> Option<Patch>,
    ) -> Result<bool, StoreError> {
        let mut docs = self.lock()?;
        let Some(patch) = f(docs.get(path)) else {
            return Ok(false);
        };
        let mut doc = docs.get(path).cloned().unwrap_or_default();
        patch.apply(&mut doc)?;
        docs.insert(path.clone(), doc);
        Ok(true)
    }
}
