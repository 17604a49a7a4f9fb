//! High-level repository operations: push, init, delete, reindex.

use std::path::Path;
use std::sync::Arc;

use chartbucket_index::{ChartEntry, Clock, IndexFile, SystemClock};
use chartbucket_lock::RepositoryLock;
use chartbucket_store::{ObjectStore, DEFAULT_CONTENT_TYPE};
use tracing::{debug, info, warn};

use crate::chart::ChartArchive;
use crate::error::{PublishError, PublishResult};
use crate::policy::PublishPolicy;
use crate::publisher::{ArtifactPublisher, PublishOutcome};
use crate::repository::{Repository, UrlStyle};
use crate::synchronizer::{rebuild, IndexSynchronizer};

/// Options of a single push, as given on the command line.
#[derive(Clone, Debug, Default)]
pub struct PushOptions {
    pub force: bool,
    pub ignore_if_exists: bool,
    pub dry_run: bool,
    pub url_style: UrlStyle,
    /// Media type of the artifact object; `application/gzip` when unset.
    pub content_type: Option<String>,
}

/// What a push did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushStatus {
    Uploaded,
    /// The chart already existed and `--ignore-if-exists` was given.
    Skipped,
}

#[derive(Clone, Debug)]
pub struct PushReport {
    pub name: String,
    pub version: String,
    /// Store key of the artifact.
    pub key: String,
    /// URL recorded in the index entry.
    pub url: String,
    pub status: PushStatus,
    pub dry_run: bool,
    pub index: IndexFile,
}

impl PushReport {
    pub fn message(&self) -> &'static str {
        match self.status {
            PushStatus::Uploaded => "Successfully uploaded the chart to the repository.",
            PushStatus::Skipped => {
                "The chart already exists in the repository, keep existing chart and ignore push."
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct InitReport {
    pub created: bool,
    pub index_url: String,
}

impl InitReport {
    pub fn message(&self) -> String {
        if self.created {
            format!("Initialized empty repository at {}", self.index_url)
        } else {
            format!("The repository at {} is already initialized.", self.index_url)
        }
    }
}

#[derive(Clone, Debug)]
pub struct DeleteReport {
    pub name: String,
    pub version: String,
    pub artifact_key: String,
    /// Whether the artifact object was present and deleted.
    pub artifact_deleted: bool,
    pub dry_run: bool,
}

impl DeleteReport {
    pub fn message(&self) -> String {
        format!(
            "Successfully deleted {} version {} from the repository.",
            self.name, self.version
        )
    }
}

#[derive(Clone, Debug)]
pub struct ReindexReport {
    pub charts: usize,
    /// Objects that looked like chart archives but could not be read.
    pub skipped: Vec<String>,
    pub dry_run: bool,
    pub index: IndexFile,
}

impl ReindexReport {
    pub fn message(&self) -> String {
        format!(
            "Repository index regenerated with {} chart version(s).",
            self.charts
        )
    }
}

/// Publishing and maintenance operations on one repository.
///
/// All shared state (store handle, lock, clock) is passed in explicitly.
pub struct RepositoryClient {
    store: Arc<dyn ObjectStore>,
    repo: Repository,
    publisher: ArtifactPublisher,
    sync: IndexSynchronizer,
    clock: Arc<dyn Clock>,
}

impl RepositoryClient {
    pub fn new(store: Arc<dyn ObjectStore>, lock: Arc<dyn RepositoryLock>, repo: Repository) -> Self {
        Self::with_clock(store, lock, repo, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn ObjectStore>,
        lock: Arc<dyn RepositoryLock>,
        repo: Repository,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            publisher: ArtifactPublisher::new(Arc::clone(&store)),
            sync: IndexSynchronizer::with_clock(Arc::clone(&store), lock, Arc::clone(&clock)),
            store,
            repo,
            clock,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Publish the chart archive at `path` and record it in the index.
    pub async fn push(&self, path: &Path, options: &PushOptions) -> PublishResult<PushReport> {
        let policy = PublishPolicy::from_flags(options.force, options.ignore_if_exists, options.dry_run)?;
        let archive = ChartArchive::load(path).await?;
        self.push_with_policy(archive, options, policy).await
    }

    /// Publish an archive already in memory.
    pub async fn push_archive(
        &self,
        archive: ChartArchive,
        options: &PushOptions,
    ) -> PublishResult<PushReport> {
        let policy = PublishPolicy::from_flags(options.force, options.ignore_if_exists, options.dry_run)?;
        self.push_with_policy(archive, options, policy).await
    }

    async fn push_with_policy(
        &self,
        archive: ChartArchive,
        options: &PushOptions,
        policy: PublishPolicy,
    ) -> PublishResult<PushReport> {
        let key = self.repo.artifact_key(&archive.file_name);
        let url = self.repo.chart_url(self.store.as_ref(), &archive.file_name, options.url_style);
        let entry = archive.entry(vec![url.clone()], self.clock.now())?;
        let content_type = options.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
        debug!(
            repository = self.repo.name(),
            chart = archive.name(),
            version = archive.version(),
            %key,
            "pushing chart"
        );

        let outcome = self
            .publisher
            .publish(&key, archive.data.clone(), content_type, &policy)
            .await?;

        let (status, update) = match outcome {
            PublishOutcome::Uploaded { .. } if policy.dry_run => {
                (PushStatus::Uploaded, self.sync.preview(&self.repo, entry, true).await?)
            }
            PublishOutcome::Uploaded { .. } => {
                (PushStatus::Uploaded, self.sync.update(&self.repo, entry, true).await?)
            }
            // The artifact is kept; the index only gains the entry if an
            // earlier push uploaded it but never got to the index.
            PublishOutcome::Skipped if policy.dry_run => {
                (PushStatus::Skipped, self.sync.preview(&self.repo, entry, false).await?)
            }
            PublishOutcome::Skipped => {
                (PushStatus::Skipped, self.sync.update(&self.repo, entry, false).await?)
            }
        };

        Ok(PushReport {
            name: archive.metadata.name,
            version: archive.metadata.version,
            key,
            url,
            status,
            dry_run: policy.dry_run,
            index: update.index,
        })
    }

    /// Create an empty index unless one exists.
    pub async fn init(&self) -> PublishResult<InitReport> {
        let update = self.sync.init(&self.repo).await?;
        Ok(InitReport {
            created: update.changed,
            index_url: self.store.url(&self.repo.index_key()),
        })
    }

    /// Remove a chart version from the index, then delete its artifact.
    pub async fn delete(&self, name: &str, version: &str, dry_run: bool) -> PublishResult<DeleteReport> {
        if dry_run {
            let entry = self
                .sync
                .fetch(&self.repo)
                .await?
                .and_then(|index| index.get(name, version).cloned())
                .ok_or_else(|| PublishError::NotFound {
                    name: name.to_string(),
                    version: version.to_string(),
                })?;
            let artifact_key = self.artifact_key_of(&entry);
            return Ok(DeleteReport {
                name: name.to_string(),
                version: version.to_string(),
                artifact_deleted: self.store.exists(&artifact_key).await?,
                artifact_key,
                dry_run,
            });
        }

        let (entry, _) = self.sync.remove(&self.repo, name, version).await?;
        let artifact_key = self.artifact_key_of(&entry);
        let artifact_deleted = self.store.delete(&artifact_key).await?;
        if !artifact_deleted {
            warn!(key = %artifact_key, "artifact was already gone");
        }
        info!(repository = self.repo.name(), chart = name, version, "chart deleted");
        Ok(DeleteReport {
            name: name.to_string(),
            version: version.to_string(),
            artifact_key,
            artifact_deleted,
            dry_run,
        })
    }

    /// Rebuild the index from the chart archives stored under the prefix.
    pub async fn reindex(&self, url_style: UrlStyle, dry_run: bool) -> PublishResult<ReindexReport> {
        let mut entries = Vec::new();
        let mut skipped = Vec::new();

        for meta in self.store.list(&self.repo.list_prefix()).await? {
            let Some(file_name) = self.repo.file_name_of(&meta.key) else {
                continue;
            };
            if !file_name.ends_with(".tgz") {
                continue;
            }
            let Some(object) = self.store.get(&meta.key).await? else {
                continue;
            };
            let archive = match ChartArchive::from_bytes(file_name, object.data) {
                Ok(archive) => archive,
                Err(err @ PublishError::InvalidChart { .. }) => {
                    warn!(key = %meta.key, error = %err, "skipping unreadable chart archive");
                    skipped.push(meta.key.clone());
                    continue;
                }
                Err(err) => return Err(err),
            };
            let url = self.repo.chart_url(self.store.as_ref(), file_name, url_style);
            entries.push(archive.entry(vec![url], object.meta.last_modified)?);
        }
        let charts = entries.len();

        let index = if dry_run {
            let mut index = self.sync.fetch(&self.repo).await?.unwrap_or_default();
            rebuild(&mut index, entries, self.clock.now());
            index
        } else {
            self.sync.replace_all(&self.repo, entries).await?.index
        };
        info!(repository = self.repo.name(), charts, skipped = skipped.len(), dry_run, "reindex finished");

        Ok(ReindexReport {
            charts,
            skipped,
            dry_run,
            index,
        })
    }

    fn artifact_key_of(&self, entry: &ChartEntry) -> String {
        let file_name = entry
            .urls
            .first()
            .and_then(|url| url.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}.tgz", entry.name(), entry.version()));
        self.repo.artifact_key(&file_name)
    }
}
