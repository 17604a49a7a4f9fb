//! Error types for lock operations.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while acquiring or releasing a repository lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock stayed held by someone else for longer than the wait bound.
    #[error("timed out after {waited:?} waiting for repository lock {key} (held by {holder})")]
    Timeout {
        key: String,
        waited: Duration,
        holder: String,
    },

    /// The lock token could not be encoded.
    #[error("lock token error: {0}")]
    Token(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] chartbucket_store::StoreError),
}

/// Convenience type alias for lock operations.
pub type LockResult<T> = std::result::Result<T, LockError>;
