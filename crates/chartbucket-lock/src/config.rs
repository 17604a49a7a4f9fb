use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing parameters of a repository lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long a lock object stays valid before it may be taken over.
    pub ttl: Duration,
    /// Upper bound on the time spent waiting for a contended lock.
    pub max_wait: Duration,
    /// First backoff cap between acquisition attempts.
    pub initial_backoff: Duration,
    /// Largest backoff cap between acquisition attempts.
    pub max_backoff: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            max_wait: Duration::from_secs(120),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}
