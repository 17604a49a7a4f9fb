use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backoff::Backoff;
use crate::error::StoreResult;
use crate::object::{ObjectMeta, StoredObject};
use crate::traits::ObjectStore;

/// Bounded retry schedule for transient store failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Store wrapper that retries calls failing with a transient error.
///
/// Non-transient errors and exhausted retries are returned unchanged.
/// A retried `put_if_absent` whose first attempt did land reports `None`;
/// callers that own the object they tried to create must recognise it.
pub struct RetryingStore {
    inner: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
}

impl RetryingStore {
    pub fn new(inner: Arc<dyn ObjectStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn run<T, F, Fut>(&self, op: &'static str, key: &str, mut call: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = StoreResult<T>> + Send,
        T: Send,
    {
        let mut backoff = Backoff::new(self.policy.base_delay, self.policy.max_delay);
        let mut attempt = 1;
        loop {
            match call().await {
                Err(err) if err.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = backoff.next_delay();
                    warn!(op, key, attempt, ?delay, error = %err, "transient store failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl ObjectStore for RetryingStore {
    async fn stat(&self, key: &str) -> StoreResult<Option<ObjectMeta>> {
        self.run("stat", key, || self.inner.stat(key)).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        self.run("get", key, || self.inner.get(key)).await
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StoreResult<ObjectMeta> {
        self.run("put", key, || self.inner.put(key, data.clone(), content_type))
            .await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StoreResult<Option<ObjectMeta>> {
        self.run("put_if_absent", key, || {
            self.inner.put_if_absent(key, data.clone(), content_type)
        })
        .await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.run("delete", key, || self.inner.delete(key)).await
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        self.run("list", prefix, || self.inner.list(prefix)).await
    }

    fn url(&self, key: &str) -> String {
        self.inner.url(key)
    }
}

impl std::fmt::Debug for RetryingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingStore")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
