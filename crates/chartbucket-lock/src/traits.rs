//! The [`RepositoryLock`] trait defining the mutual-exclusion interface.

use async_trait::async_trait;

use crate::error::LockResult;
use crate::token::LockToken;

/// Proof of a successful acquisition, needed to release the lock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockLease {
    /// Key of the lock object.
    pub key: String,
    pub token: LockToken,
}

/// Mutual exclusion for index mutations of one repository.
///
/// Implementations must be usable from separate processes: the exclusion
/// lives in shared storage, never in process memory.
#[async_trait]
pub trait RepositoryLock: Send + Sync {
    /// Acquire the lock identified by `key`, waiting a bounded time.
    ///
    /// Fails with [`LockError::Timeout`](crate::LockError::Timeout) when the
    /// bound elapses. Dropping the returned future while waiting abandons the
    /// wait without holding the lock.
    async fn acquire(&self, key: &str) -> LockResult<LockLease>;

    /// Release a lease obtained from [`RepositoryLock::acquire`].
    ///
    /// Releasing a lease that was already taken over leaves the new holder's
    /// lock in place.
    async fn release(&self, lease: &LockLease) -> LockResult<()>;
}
