//! [`RepositoryLock`] backed by a create-if-absent lock object.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chartbucket_store::{Backoff, ObjectStore};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::LockConfig;
use crate::error::{LockError, LockResult};
use crate::token::{default_owner, LockToken};
use crate::traits::{LockLease, RepositoryLock};

const TOKEN_CONTENT_TYPE: &str = "application/json";

/// What a contended acquisition found at the lock key.
enum Holder {
    /// The lock object disappeared between the write and the read.
    Gone,
    /// The object is ours: an earlier attempt landed despite reporting failure.
    Ours(LockToken),
    /// Past its ttl.
    Expired(String),
    Active(String),
}

/// Lock implemented as an object in an [`ObjectStore`].
pub struct StoreLock {
    store: Arc<dyn ObjectStore>,
    owner: String,
    config: LockConfig,
}

impl StoreLock {
    pub fn new(store: Arc<dyn ObjectStore>, config: LockConfig) -> Self {
        Self::with_owner(store, config, default_owner())
    }

    pub fn with_owner(
        store: Arc<dyn ObjectStore>,
        config: LockConfig,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            store,
            owner: owner.into(),
            config,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    async fn inspect(&self, key: &str, ours: &LockToken) -> LockResult<Holder> {
        let Some(object) = self.store.get(key).await? else {
            return Ok(Holder::Gone);
        };
        let now = Utc::now();
        match LockToken::from_bytes(&object.data) {
            Some(token) if token.lease_id == ours.lease_id => Ok(Holder::Ours(token)),
            Some(token) if token.is_expired(now) => Ok(Holder::Expired(token.owner)),
            Some(token) => Ok(Holder::Active(token.owner)),
            None => {
                // Unreadable token (torn write or foreign object): age it by
                // its modification time instead.
                let ttl = chrono::Duration::milliseconds(self.config.ttl.as_millis() as i64);
                if now >= object.meta.last_modified + ttl {
                    Ok(Holder::Expired("<unreadable token>".to_string()))
                } else {
                    Ok(Holder::Active("<unreadable token>".to_string()))
                }
            }
        }
    }
}

#[async_trait]
impl RepositoryLock for StoreLock {
    async fn acquire(&self, key: &str) -> LockResult<LockLease> {
        let started = Instant::now();
        let deadline = started + self.config.max_wait;
        let mut backoff = Backoff::new(self.config.initial_backoff, self.config.max_backoff);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let token = LockToken::new(self.owner.clone(), Utc::now(), self.config.ttl);
            let body = token.to_bytes()?;

            if self
                .store
                .put_if_absent(key, body, TOKEN_CONTENT_TYPE)
                .await?
                .is_some()
            {
                info!(key, owner = %self.owner, attempt, "repository lock acquired");
                return Ok(LockLease {
                    key: key.to_string(),
                    token,
                });
            }

            let holder = match self.inspect(key, &token).await? {
                Holder::Ours(token) => {
                    info!(key, owner = %self.owner, attempt, "repository lock acquired on retry");
                    return Ok(LockLease {
                        key: key.to_string(),
                        token,
                    });
                }
                Holder::Gone => {
                    debug!(key, attempt, "lock released while contending");
                    None
                }
                Holder::Expired(holder) => {
                    warn!(key, %holder, "taking over stale repository lock");
                    self.store.delete(key).await?;
                    None
                }
                Holder::Active(holder) => Some(holder),
            };

            // A free lock is always retried at once, even past the deadline.
            let Some(holder) = holder else {
                continue;
            };
            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Timeout {
                    key: key.to_string(),
                    waited: started.elapsed(),
                    holder,
                });
            }
            let delay = backoff.next_delay().min(deadline - now);
            debug!(key, %holder, attempt, ?delay, "repository lock busy, backing off");
            tokio::time::sleep(delay).await;
        }
    }

    async fn release(&self, lease: &LockLease) -> LockResult<()> {
        match self.store.get(&lease.key).await? {
            Some(object) => match LockToken::from_bytes(&object.data) {
                Some(current) if current.lease_id == lease.token.lease_id => {
                    self.store.delete(&lease.key).await?;
                    info!(key = %lease.key, owner = %self.owner, "repository lock released");
                }
                current => {
                    let holder = current.map(|t| t.owner).unwrap_or_default();
                    warn!(key = %lease.key, %holder, "repository lock was taken over before release");
                }
            },
            None => {
                warn!(key = %lease.key, "repository lock vanished before release");
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for StoreLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLock")
            .field("owner", &self.owner)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
