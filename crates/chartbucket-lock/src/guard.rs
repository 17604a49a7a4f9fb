//! Scoped acquisition with guaranteed release.

use std::sync::Arc;

use tracing::warn;

use crate::error::LockResult;
use crate::traits::{LockLease, RepositoryLock};

/// A held repository lock.
///
/// Call [`LockGuard::release`] on every normal exit path. If the guard is
/// dropped while still holding the lease (early return, panic unwinding, or
/// the owning future being cancelled) the release is spawned onto the
/// current tokio runtime. Outside a runtime the lock is left to expire after
/// its ttl.
#[must_use = "dropping the guard releases the lock in the background"]
pub struct LockGuard {
    lock: Arc<dyn RepositoryLock>,
    lease: Option<LockLease>,
}

impl LockGuard {
    /// Acquire `key` through `lock` and wrap the lease in a guard.
    pub async fn acquire(lock: Arc<dyn RepositoryLock>, key: &str) -> LockResult<Self> {
        let lease = lock.acquire(key).await?;
        Ok(Self {
            lock,
            lease: Some(lease),
        })
    }

    pub fn lease(&self) -> Option<&LockLease> {
        self.lease.as_ref()
    }

    /// Release the lock and wait for the release to finish.
    pub async fn release(mut self) -> LockResult<()> {
        match self.lease.take() {
            Some(lease) => self.lock.release(&lease).await,
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let lock = Arc::clone(&self.lock);
                handle.spawn(async move {
                    if let Err(err) = lock.release(&lease).await {
                        warn!(key = %lease.key, error = %err, "background lock release failed");
                    }
                });
            }
            Err(_) => {
                warn!(key = %lease.key, "no runtime to release lock; it will expire after its ttl");
            }
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("lease", &self.lease)
            .finish_non_exhaustive()
    }
}
