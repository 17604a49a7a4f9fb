//! Error types for the index crate.

/// Errors that can occur while handling chart metadata or the index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The stored index could not be parsed. Never repaired automatically.
    #[error("malformed index: {0}")]
    Malformed(String),

    /// A chart version is not a semantic version.
    #[error("invalid version {version:?} for chart {name}: {reason}")]
    InvalidVersion {
        name: String,
        version: String,
        reason: String,
    },

    /// Chart metadata is missing a required field.
    #[error("invalid chart metadata: {0}")]
    InvalidChart(String),

    /// Serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
