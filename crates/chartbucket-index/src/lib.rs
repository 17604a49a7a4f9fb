//! Chart repository index model.
//!
//! The index (`index.yaml`) is the manifest of a chart repository: for every
//! chart name, the list of published versions, newest first, plus a single
//! `generated` timestamp. It is read, merged and rewritten in full on every
//! publish; it is never patched in place.
//!
//! # Key Types
//!
//! - [`IndexFile`] -- the whole manifest, with [`IndexFile::parse`],
//!   [`IndexFile::to_yaml`] and [`IndexFile::merge`]
//! - [`ChartEntry`] -- one published version of one chart
//! - [`ChartMetadata`] -- the chart's own `Chart.yaml` fields
//! - [`MergeOutcome`] -- whether a merge changed the index
//! - [`Clock`] -- source of wall-clock time for `generated`
//!
//! # Invariants
//!
//! - `(name, version)` is unique within an index.
//! - Each chart's versions are sorted by semantic version, descending.
//! - Every mutation strictly increases `generated`; a no-op merge leaves it
//!   untouched.

pub mod chart;
pub mod clock;
pub mod entry;
pub mod error;
pub mod index;
pub mod version;

pub use chart::{ChartDependency, ChartMaintainer, ChartMetadata};
pub use clock::{next_generated, Clock, FixedClock, SystemClock};
pub use entry::ChartEntry;
pub use error::{IndexError, IndexResult};
pub use index::{IndexFile, MergeOutcome, INDEX_API_VERSION};
pub use version::{compare_versions, parse_version};
