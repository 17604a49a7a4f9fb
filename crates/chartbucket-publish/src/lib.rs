//! Chart publishing protocol for chartbucket.
//!
//! A push is two steps with different concurrency rules:
//!
//! 1. [`ArtifactPublisher`] writes the chart archive under
//!    `<prefix>/<file name>`. No lock is taken; the [`OverwritePolicy`]
//!    decides what happens when the object already exists.
//! 2. [`IndexSynchronizer`] merges the chart's entry into
//!    `<prefix>/index.yaml` while holding the repository lock, so that
//!    concurrent publishers never lose each other's entries.
//!
//! [`RepositoryClient`] ties both together and adds the maintenance
//! operations `init`, `delete` and `reindex`.
//!
//! Policy flags are validated before any store I/O. A dry run reads but never
//! writes or locks.

pub mod chart;
pub mod client;
pub mod error;
pub mod policy;
pub mod publisher;
pub mod repository;
pub mod synchronizer;

pub use chart::ChartArchive;
pub use client::{
    DeleteReport, InitReport, PushOptions, PushReport, PushStatus, ReindexReport, RepositoryClient,
};
pub use error::{ErrorKind, PublishError, PublishResult};
pub use policy::{OverwritePolicy, PublishPolicy};
pub use publisher::{ArtifactPublisher, PublishOutcome};
pub use repository::{Repository, UrlStyle, INDEX_FILE_NAME, LOCK_SUFFIX};
pub use synchronizer::{IndexSynchronizer, IndexUpdate};
