//! Upload of chart archives under an overwrite policy.

use std::sync::Arc;

use bytes::Bytes;
use chartbucket_store::ObjectStore;
use tracing::{debug, info};

use crate::error::{PublishError, PublishResult};
use crate::policy::{OverwritePolicy, PublishPolicy};

/// Result of publishing one artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The artifact was written, or would have been under dry-run.
    Uploaded { replaced: bool },
    /// The artifact already existed and was left untouched.
    Skipped,
}

/// Writes artifact objects. Needs no lock: concurrent publishers of the
/// same key are arbitrated by the overwrite policy.
pub struct ArtifactPublisher {
    store: Arc<dyn ObjectStore>,
}

impl ArtifactPublisher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub async fn publish(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        policy: &PublishPolicy,
    ) -> PublishResult<PublishOutcome> {
        let exists = self.store.stat(key).await?.is_some();
        debug!(key, exists, ?policy, "evaluating artifact policy");

        match (exists, policy.overwrite) {
            (true, OverwritePolicy::Strict) => {
                return Err(PublishError::AlreadyExists {
                    key: key.to_string(),
                })
            }
            (true, OverwritePolicy::IgnoreIfExists) => {
                info!(key, "artifact exists, skipping upload");
                return Ok(PublishOutcome::Skipped);
            }
            _ => {}
        }

        if policy.dry_run {
            info!(key, "dry run, artifact not written");
            return Ok(PublishOutcome::Uploaded { replaced: exists });
        }

        match policy.overwrite {
            OverwritePolicy::Force => {
                let meta = self.store.put(key, data, content_type).await?;
                info!(key, size = meta.size, replaced = exists, "artifact uploaded");
                Ok(PublishOutcome::Uploaded { replaced: exists })
            }
            // The artifact was absent at stat time; a create-if-absent write
            // closes the window against a concurrent publisher of the same key.
            OverwritePolicy::Strict | OverwritePolicy::IgnoreIfExists => {
                match self.store.put_if_absent(key, data.clone(), content_type).await? {
                    Some(meta) => {
                        info!(key, size = meta.size, "artifact uploaded");
                        Ok(PublishOutcome::Uploaded { replaced: false })
                    }
                    // A retried write whose first attempt landed finds our own bytes.
                    None if self.holds(key, &data).await? => {
                        info!(key, "artifact uploaded, earlier response was lost");
                        Ok(PublishOutcome::Uploaded { replaced: false })
                    }
                    None if policy.overwrite == OverwritePolicy::Strict => {
                        Err(PublishError::AlreadyExists {
                            key: key.to_string(),
                        })
                    }
                    None => {
                        info!(key, "artifact appeared concurrently, skipping upload");
                        Ok(PublishOutcome::Skipped)
                    }
                }
            }
        }
    }

    async fn holds(&self, key: &str, data: &Bytes) -> PublishResult<bool> {
        Ok(self
            .store
            .get(key)
            .await?
            .is_some_and(|object| object.data == *data))
    }
}
