//! The lock token stored in the lock object.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LockError, LockResult};

/// Content of a lock object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockToken {
    /// Human-readable identity of the holder (process and host).
    pub owner: String,
    /// Unique id of this acquisition. Two acquisitions by the same process
    /// never share a lease id.
    pub lease_id: Uuid,
    pub acquired_at: DateTime<Utc>,
    pub ttl_ms: u64,
}

impl LockToken {
    pub fn new(owner: impl Into<String>, acquired_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            owner: owner.into(),
            lease_id: Uuid::now_v7(),
            acquired_at,
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    /// Instant after which the token is considered abandoned.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.acquired_at + chrono::Duration::milliseconds(self.ttl_ms as i64)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn to_bytes(&self) -> LockResult<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| LockError::Token(e.to_string()))
    }

    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        serde_json::from_slice(raw).ok()
    }
}

/// Identity of this process, used as the token owner.
pub fn default_owner() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("pid-{}@{host}", std::process::id())
}
