use super::document::{DocPath, Document, Patch, WriteMode};
use crate::error::StoreError;

/// A document-oriented store.
///
/// Implementations must make every single call atomic, and [`transaction`]
/// serializable against every other write on the same store.
///
/// [`transaction`]: DocumentStore::transaction
pub trait DocumentStore: Send + Sync {
    /// Read a document.
    fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    /// Write a patch, creating the document if it does not exist.
    fn set(&self, path: &DocPath, patch: &Patch, mode: WriteMode) -> Result<(), StoreError>;

    /// Apply a patch to an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    fn update(&self, path: &DocPath, patch: &Patch) -> Result<(), StoreError>;

    /// Delete a document. Deleting a missing document is not an error.
    fn delete(&self, path: &DocPath) -> Result<(), StoreError>;

    /// Documents directly under `collection`, ordered by path.
    fn list(&self, collection: &DocPath) -> Result<Vec<(DocPath, Document)>, StoreError>;

    /// Read-modify-write of one document.
    ///
    /// `f` sees the current document (or `None`) and returns the patch to
    /// merge, or `None` to leave the store untouched. Returns whether a
    /// write happened.
    fn transaction(
        &self,
        path: &DocPath,
        f: &mut dyn FnMut(Option<&Document>) -> Option<Patch>,
    ) -> Result<bool, StoreError>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<T> {
    fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        (**self).get(path)
    }

    fn set(&self, path: &DocPath, patch: &Patch, mode: WriteMode) -> Result<(), StoreError> {
        (**self).set(path, patch, mode)
    }

    fn update(&self, path: &DocPath, patch: &Patch) -> Result<(), StoreError> {
        (**self).update(path, patch)
    }

    fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        (**self).delete(path)
    }

    fn list(&self, collection: &DocPath) -> Result<Vec<(DocPath, Document)>, StoreError> {
        (**self).list(collection)
    }

    fn transaction(
        &self,
        path: &DocPath,
        f: &mut dyn FnMut(Option<&Document>) -> Option<Patch>,
    ) -> Result<bool, StoreError> {
        (**self).transaction(path, f)
    }
}
