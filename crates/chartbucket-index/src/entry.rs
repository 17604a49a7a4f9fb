//! Index entry for one published chart version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chart::ChartMetadata;
use crate::error::IndexResult;

/// One published version of one chart.
///
/// Serialized the way chart repository indexes expect: the chart metadata
/// fields inline, followed by `urls`, `created` and `digest`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartEntry {
    #[serde(flatten)]
    pub metadata: ChartMetadata,
    /// Download locations, absolute URLs or file names relative to the index.
    #[serde(default)]
    pub urls: Vec<String>,
    pub created: DateTime<Utc>,
    /// Hex-encoded sha256 of the chart archive.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
}

impl ChartEntry {
    /// Build an entry, validating the chart metadata.
    pub fn new(
        metadata: ChartMetadata,
        urls: Vec<String>,
        digest: impl Into<String>,
        created: DateTime<Utc>,
    ) -> IndexResult<Self> {
        metadata.validate()?;
        Ok(Self {
            metadata,
            urls,
            created,
            digest: digest.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }
}
