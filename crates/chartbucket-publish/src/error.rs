//! Error types for the publish protocol.

use std::io;

use chartbucket_index::IndexError;
use chartbucket_lock::LockError;
use chartbucket_store::StoreError;
use thiserror::Error;

/// Coarse classification of a [`PublishError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    FlagConflict,
    AlreadyExists,
    LockTimeout,
    MalformedIndex,
    NetworkFailure,
    InvalidChart,
    NotFound,
    Storage,
}

/// Errors that can occur while publishing to or maintaining a repository.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Mutually exclusive overwrite flags were both set.
    #[error("The --force and --ignore-if-exists flags are mutually exclusive and cannot be specified together.")]
    FlagConflict,

    /// Strict policy found an existing artifact.
    #[error("The chart already exists in the repository and cannot be overwritten without an explicit intent.")]
    AlreadyExists { key: String },

    /// The repository lock stayed held past the wait bound.
    #[error("could not lock the repository: {0}")]
    LockTimeout(#[source] LockError),

    /// The stored index does not parse. It is never repaired automatically.
    #[error("the repository index {key} is malformed: {source}")]
    MalformedIndex {
        key: String,
        #[source]
        source: IndexError,
    },

    /// The chart archive is unreadable or its metadata is invalid.
    #[error("invalid chart {path}: {reason}")]
    InvalidChart { path: String, reason: String },

    /// The requested chart version is not in the index.
    #[error("chart {name} version {version} not found in the repository")]
    NotFound { name: String, version: String },

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Lock operation failed for a reason other than a timeout.
    #[error("lock error: {0}")]
    Lock(#[source] LockError),

    /// Index could not be built or serialized.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Local I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PublishError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PublishError::FlagConflict => ErrorKind::FlagConflict,
            PublishError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            PublishError::LockTimeout(_) => ErrorKind::LockTimeout,
            PublishError::MalformedIndex { .. } => ErrorKind::MalformedIndex,
            PublishError::InvalidChart { .. } => ErrorKind::InvalidChart,
            PublishError::NotFound { .. } => ErrorKind::NotFound,
            PublishError::Store(err) | PublishError::Lock(LockError::Store(err)) => {
                if err.is_transient() {
                    ErrorKind::NetworkFailure
                } else {
                    ErrorKind::Storage
                }
            }
            PublishError::Lock(_) | PublishError::Index(_) | PublishError::Io(_) => {
                ErrorKind::Storage
            }
        }
    }
}

impl From<LockError> for PublishError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { .. } => PublishError::LockTimeout(err),
            LockError::Store(store) => PublishError::Store(store),
            other => PublishError::Lock(other),
        }
    }
}

/// Convenience type alias for publish operations.
pub type PublishResult<T> = std::result::Result<T, PublishError>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn user_facing_messages() {
        assert_eq!(
            PublishError::FlagConflict.to_string(),
            "The --force and --ignore-if-exists flags are mutually exclusive and cannot be specified together."
        );
        let exists = PublishError::AlreadyExists {
            key: "charts/foo-1.0.0.tgz".into(),
        };
        assert!(exists.to_string().starts_with("The chart already exists"));
    }

    #[test]
    fn lock_errors_are_classified() {
        let timeout: PublishError = LockError::Timeout {
            key: "charts/index.yaml.lock".into(),
            waited: Duration::from_secs(1),
            holder: "pid-1@host".into(),
        }
        .into();
        assert_eq!(timeout.kind(), ErrorKind::LockTimeout);

        let network: PublishError = LockError::Store(StoreError::Network("reset".into())).into();
        assert_eq!(network.kind(), ErrorKind::NetworkFailure);
        assert!(matches!(network, PublishError::Store(_)));
    }

    #[test]
    fn store_errors_are_classified() {
        let transient = PublishError::from(StoreError::Network("timeout".into()));
        assert_eq!(transient.kind(), ErrorKind::NetworkFailure);
        let permanent = PublishError::from(StoreError::InvalidUrl("x".into()));
        assert_eq!(permanent.kind(), ErrorKind::Storage);
    }
}
