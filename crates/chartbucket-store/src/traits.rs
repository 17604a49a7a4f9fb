use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreResult;
use crate::object::{ObjectMeta, StoredObject};

/// Key-value object store holding chart archives, indexes and lock objects.
///
/// All implementations must satisfy these invariants:
/// - `put` replaces the whole object; there is no partial write.
/// - Overwriting a key yields a `last_modified` strictly later than before.
/// - `put_if_absent` never replaces an existing object. Backends without a
///   native conditional write may emulate it, with a race window between the
///   existence check and the write.
/// - Reads of a single key observe earlier writes to that key (at least
///   eventually).
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object's metadata without its payload.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    async fn stat(&self, key: &str) -> StoreResult<Option<ObjectMeta>>;

    /// Read an object and its metadata.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>>;

    /// Write an object unconditionally, replacing any existing one.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StoreResult<ObjectMeta>;

    /// Write an object only if no object exists at `key`.
    ///
    /// Returns `Ok(None)` without touching the store contents when the key is
    /// already taken.
    async fn put_if_absent(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StoreResult<Option<ObjectMeta>>;

    /// Delete an object. Returns `true` if the object existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// List metadata of all objects whose key starts with `prefix`, sorted
    /// by key.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>>;

    /// Fully qualified URL of the object at `key`.
    fn url(&self, key: &str) -> String;

    /// Check whether an object exists.
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.stat(key).await?.is_some())
    }
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn stat(&self, key: &str) -> StoreResult<Option<ObjectMeta>> {
        (**self).stat(key).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StoreResult<ObjectMeta> {
        (**self).put(key, data, content_type).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StoreResult<Option<ObjectMeta>> {
        (**self).put_if_absent(key, data, content_type).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        (**self).delete(key).await
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        (**self).list(prefix).await
    }

    fn url(&self, key: &str) -> String {
        (**self).url(key)
    }
}
