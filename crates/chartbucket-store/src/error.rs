use std::io;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The key is empty, absolute, or escapes the store root.
    #[error("invalid object key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// A transient failure talking to the store. Safe to retry.
    #[error("network failure: {0}")]
    Network(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Object metadata could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The store location could not be parsed.
    #[error("invalid store url {0:?}")]
    InvalidUrl(String),
}

impl StoreError {
    /// Whether the failure is transient and the call may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Network(_) => true,
            StoreError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
