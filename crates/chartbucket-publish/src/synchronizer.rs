//! Locked read-merge-write transactions on the repository index.

use std::sync::Arc;

use bytes::Bytes;
use chartbucket_index::{next_generated, ChartEntry, Clock, IndexFile, MergeOutcome, SystemClock};
use chartbucket_lock::{LockGuard, RepositoryLock};
use chartbucket_store::ObjectStore;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{PublishError, PublishResult};
use crate::repository::Repository;

const INDEX_CONTENT_TYPE: &str = "application/x-yaml";

/// The index after a synchronizer operation.
#[derive(Clone, Debug)]
pub struct IndexUpdate {
    pub index: IndexFile,
    /// Whether the index differs from the stored one. Under dry-run nothing
    /// is written even when this is `true`.
    pub changed: bool,
}

/// Performs index mutations under the repository lock.
///
/// Every mutation runs lock, fetch, parse, modify and write in that order.
/// A missing index is treated as an empty one; an unparseable one fails the
/// operation and is left as is. The lock is released on every exit path.
pub struct IndexSynchronizer {
    store: Arc<dyn ObjectStore>,
    lock: Arc<dyn RepositoryLock>,
    clock: Arc<dyn Clock>,
}

impl IndexSynchronizer {
    pub fn new(store: Arc<dyn ObjectStore>, lock: Arc<dyn RepositoryLock>) -> Self {
        Self::with_clock(store, lock, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn ObjectStore>,
        lock: Arc<dyn RepositoryLock>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, lock, clock }
    }

    /// Read the current index, if any. Takes no lock.
    pub async fn fetch(&self, repo: &Repository) -> PublishResult<Option<IndexFile>> {
        let key = repo.index_key();
        let Some(object) = self.store.get(&key).await? else {
            return Ok(None);
        };
        IndexFile::parse(&object.data)
            .map(Some)
            .map_err(|source| PublishError::MalformedIndex { key, source })
    }

    /// Merge `entry` into the stored index.
    pub async fn update(
        &self,
        repo: &Repository,
        entry: ChartEntry,
        allow_replace: bool,
    ) -> PublishResult<IndexUpdate> {
        self.mutate(repo, |index, _, now| {
            Ok(index.merge(entry, allow_replace, now).is_changed())
        })
        .await
    }

    /// What [`update`](Self::update) would produce, without locking or
    /// writing anything.
    pub async fn preview(
        &self,
        repo: &Repository,
        entry: ChartEntry,
        allow_replace: bool,
    ) -> PublishResult<IndexUpdate> {
        let mut index = self.fetch(repo).await?.unwrap_or_default();
        let outcome = index.merge(entry, allow_replace, self.clock.now());
        debug!(repository = repo.name(), ?outcome, "index preview");
        Ok(IndexUpdate {
            index,
            changed: outcome != MergeOutcome::Unchanged,
        })
    }

    /// Create an empty index if the repository has none.
    pub async fn init(&self, repo: &Repository) -> PublishResult<IndexUpdate> {
        self.mutate(repo, |index, existed, now| {
            if existed {
                return Ok(false);
            }
            index.generated = next_generated(index.generated, now);
            Ok(true)
        })
        .await
    }

    /// Remove one chart version from the index.
    pub async fn remove(
        &self,
        repo: &Repository,
        name: &str,
        version: &str,
    ) -> PublishResult<(ChartEntry, IndexUpdate)> {
        let mut removed = None;
        let update = self
            .mutate(repo, |index, _, now| {
                removed = index.remove(name, version, now);
                Ok(removed.is_some())
            })
            .await?;
        match removed {
            Some(entry) => Ok((entry, update)),
            None => Err(PublishError::NotFound {
                name: name.to_string(),
                version: version.to_string(),
            }),
        }
    }

    /// Replace every entry of the index with `entries`.
    ///
    /// Server info and annotations of the stored index are kept and
    /// `generated` still moves forward.
    pub async fn replace_all(
        &self,
        repo: &Repository,
        entries: Vec<ChartEntry>,
    ) -> PublishResult<IndexUpdate> {
        self.mutate(repo, |index, _, now| {
            rebuild(index, entries, now);
            Ok(true)
        })
        .await
    }

    /// Run `apply` on the stored index under the repository lock and write
    /// the result back if `apply` reports a change.
    ///
    /// `apply` receives the index (empty if none is stored), whether one was
    /// stored, and the current time.
    async fn mutate<F>(&self, repo: &Repository, apply: F) -> PublishResult<IndexUpdate>
    where
        F: FnOnce(&mut IndexFile, bool, DateTime<Utc>) -> PublishResult<bool> + Send,
    {
        let guard = LockGuard::acquire(Arc::clone(&self.lock), &repo.lock_key()).await?;
        let result = self.apply_locked(repo, apply).await;
        if let Err(err) = guard.release().await {
            warn!(repository = repo.name(), error = %err, "failed to release repository lock");
        }
        result
    }

    async fn apply_locked<F>(&self, repo: &Repository, apply: F) -> PublishResult<IndexUpdate>
    where
        F: FnOnce(&mut IndexFile, bool, DateTime<Utc>) -> PublishResult<bool> + Send,
    {
        let stored = self.fetch(repo).await?;
        let existed = stored.is_some();
        let mut index = stored.unwrap_or_default();

        let changed = apply(&mut index, existed, self.clock.now())?;
        if !changed {
            debug!(repository = repo.name(), "index unchanged, nothing written");
            return Ok(IndexUpdate { index, changed });
        }

        let body = index.to_yaml()?;
        self.store
            .put(&repo.index_key(), Bytes::from(body), INDEX_CONTENT_TYPE)
            .await?;
        info!(
            repository = repo.name(),
            charts = index.len(),
            generated = %index.generated,
            "index written"
        );
        Ok(IndexUpdate { index, changed })
    }
}

/// Replace the entries of `index` with `entries`, moving `generated`
/// forward even when `entries` is empty.
pub(crate) fn rebuild(index: &mut IndexFile, entries: Vec<ChartEntry>, now: DateTime<Utc>) {
    let prior = index.generated;
    index.entries.clear();
    for entry in entries {
        index.merge(entry, true, now);
    }
    index.generated = next_generated(prior, now).max(index.generated);
}
