use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use crate::error::{StoreError, StoreResult};
use crate::object::{validate_key, ObjectMeta, StoredObject};
use crate::traits::ObjectStore;

/// In-memory, `BTreeMap`-based object store.
///
/// Intended for tests and embedding. Every trait call is counted, an optional
/// latency is applied before each call, and transient failures can be queued
/// with [`InMemoryObjectStore::fail_next`].
pub struct InMemoryObjectStore {
    base_url: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    calls: AtomicU64,
    pending_failures: AtomicU32,
    latency: Option<Duration>,
}

impl InMemoryObjectStore {
    /// Create a new empty store addressed as `mem://bucket`.
    pub fn new() -> Self {
        Self::with_base_url("mem://bucket")
    }

    /// Create a new empty store whose object URLs start with `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(BTreeMap::new()),
            calls: AtomicU64::new(0),
            pending_failures: AtomicU32::new(0),
            latency: None,
        }
    }

    /// Sleep for `latency` before serving each call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of trait calls served so far, including failed ones.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make the next `count` calls fail with [`StoreError::Network`].
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// All keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Peek at an object without counting a call.
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().expect("lock poisoned").get(key).cloned()
    }

    async fn enter(&self, op: &str, key: &str) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Network(format!("injected failure during {op} {key}")));
        }
        Ok(())
    }

    fn write_locked(
        map: &mut BTreeMap<String, StoredObject>,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> ObjectMeta {
        let mut last_modified = Utc::now();
        if let Some(previous) = map.get(key) {
            if last_modified <= previous.meta.last_modified {
                last_modified = previous.meta.last_modified + chrono::Duration::microseconds(1);
            }
        }
        let meta = ObjectMeta {
            key: key.to_string(),
            size: data.len() as u64,
            content_type: content_type.to_string(),
            last_modified,
        };
        map.insert(key.to_string(), StoredObject::new(meta.clone(), data));
        meta
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn stat(&self, key: &str) -> StoreResult<Option<ObjectMeta>> {
        self.enter("stat", key).await?;
        validate_key(key)?;
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(key).map(|obj| obj.meta.clone()))
    }

    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        self.enter("get", key).await?;
        validate_key(key)?;
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StoreResult<ObjectMeta> {
        self.enter("put", key).await?;
        validate_key(key)?;
        let mut map = self.objects.write().expect("lock poisoned");
        Ok(Self::write_locked(&mut map, key, data, content_type))
    }

    async fn put_if_absent(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StoreResult<Option<ObjectMeta>> {
        self.enter("put_if_absent", key).await?;
        validate_key(key)?;
        let mut map = self.objects.write().expect("lock poisoned");
        if map.contains_key(key) {
            return Ok(None);
        }
        Ok(Some(Self::write_locked(&mut map, key, data, content_type)))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.enter("delete", key).await?;
        validate_key(key)?;
        let mut map = self.objects.write().expect("lock poisoned");
        Ok(map.remove(key).is_some())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        self.enter("list", prefix).await?;
        let map = self.objects.read().expect("lock poisoned");
        Ok(map
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, obj)| obj.meta.clone())
            .collect())
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("base_url", &self.base_url)
            .field("object_count", &self.len())
            .field("calls", &self.call_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GZIP: &str = "application/gzip";

    #[tokio::test]
    async fn put_and_get_round_trip() {
        let store = InMemoryObjectStore::new();
        let meta = store
            .put("charts/foo-1.0.0.tgz", Bytes::from_static(b"chart"), GZIP)
            .await
            .unwrap();
        assert_eq!(meta.size, 5);
        assert_eq!(meta.content_type, GZIP);

        let obj = store.get("charts/foo-1.0.0.tgz").await.unwrap().expect("should exist");
        assert_eq!(obj.data, Bytes::from_static(b"chart"));
        assert_eq!(obj.meta, meta);
    }

    #[tokio::test]
    async fn missing_objects_read_as_none() {
        let store = InMemoryObjectStore::new();
        assert!(store.stat("charts/none").await.unwrap().is_none());
        assert!(store.get("charts/none").await.unwrap().is_none());
        assert!(!store.exists("charts/none").await.unwrap());
        assert!(!store.delete("charts/none").await.unwrap());
    }

    #[tokio::test]
    async fn overwrite_advances_last_modified() {
        let store = InMemoryObjectStore::new();
        let first = store.put("k", Bytes::from_static(b"a"), GZIP).await.unwrap();
        let second = store.put("k", Bytes::from_static(b"b"), GZIP).await.unwrap();
        assert!(second.last_modified > first.last_modified);
    }

    #[tokio::test]
    async fn put_if_absent_does_not_overwrite() {
        let store = InMemoryObjectStore::new();
        let created = store
            .put_if_absent("lock", Bytes::from_static(b"one"), "application/json")
            .await
            .unwrap();
        assert!(created.is_some());

        let second = store
            .put_if_absent("lock", Bytes::from_static(b"two"), "application/json")
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(store.object("lock").unwrap().data, Bytes::from_static(b"one"));
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = InMemoryObjectStore::new();
        for key in ["charts/a.tgz", "charts/b.tgz", "other/c.tgz", "chartsx/d.tgz"] {
            store.put(key, Bytes::new(), GZIP).await.unwrap();
        }
        let listed: Vec<String> = store
            .list("charts/")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(listed, vec!["charts/a.tgz", "charts/b.tgz"]);
    }

    #[tokio::test]
    async fn counts_every_call() {
        let store = InMemoryObjectStore::new();
        assert_eq!(store.call_count(), 0);
        store.stat("a").await.unwrap();
        store.put("a", Bytes::new(), GZIP).await.unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(store.call_count(), 3);
        // Peeking is not a store call.
        store.object("a");
        assert_eq!(store.call_count(), 3);
    }

    #[tokio::test]
    async fn injected_failures_are_transient_and_consumed() {
        let store = InMemoryObjectStore::new();
        store.fail_next(2);
        assert!(store.stat("a").await.unwrap_err().is_transient());
        assert!(store.stat("a").await.unwrap_err().is_transient());
        assert!(store.stat("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_invalid_keys() {
        let store = InMemoryObjectStore::new();
        let err = store.put("../escape", Bytes::new(), GZIP).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));
    }

    #[test]
    fn url_joins_base_and_key() {
        let store = InMemoryObjectStore::with_base_url("s3://bucket/");
        assert_eq!(store.url("charts/a.tgz"), "s3://bucket/charts/a.tgz");
    }

    #[test]
    fn debug_format() {
        let store = InMemoryObjectStore::new();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryObjectStore"));
        assert!(debug.contains("object_count"));
    }
}
