//! Object metadata and payload types shared by all backends.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Media type attached to chart archives when the caller does not override it.
pub const DEFAULT_CONTENT_TYPE: &str = "application/gzip";

/// Metadata the store keeps for every object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Full object key, e.g. `charts/foo-1.2.3.tgz`.
    pub key: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Media type supplied by the writer, stored verbatim.
    pub content_type: String,
    /// Time of the last successful write of this key.
    pub last_modified: DateTime<Utc>,
}

/// An object payload together with its metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub meta: ObjectMeta,
    pub data: Bytes,
}

impl StoredObject {
    pub fn new(meta: ObjectMeta, data: Bytes) -> Self {
        Self { meta, data }
    }
}

/// Reject keys that are empty, absolute, or contain `.`/`..` segments.
///
/// Keys are slash-separated paths relative to the store root.
pub fn validate_key(key: &str) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("empty key"));
    }
    if key.starts_with('/') {
        return Err(invalid("key must be relative"));
    }
    if key.contains('\\') {
        return Err(invalid("backslash in key"));
    }
    for segment in key.split('/') {
        match segment {
            "" => return Err(invalid("empty path segment")),
            "." | ".." => return Err(invalid("relative path segment")),
            _ => {}
        }
    }
    Ok(())
}
