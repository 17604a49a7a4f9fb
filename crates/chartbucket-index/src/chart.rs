//! Chart metadata as found in a chart's `Chart.yaml`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};
use crate::version::parse_version;

/// A chart maintainer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartMaintainer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A chart dependency declaration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartDependency {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// The metadata blob of a chart.
///
/// Well-known fields are typed; anything else is kept verbatim in `extra`
/// so that it survives a read/merge/write cycle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_version: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub chart_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub home: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<ChartMaintainer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ChartDependency>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ChartMetadata {
    /// Minimal metadata with just a name and a version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Parse the contents of a `Chart.yaml`.
    pub fn from_yaml(raw: &[u8]) -> IndexResult<Self> {
        let metadata: Self = serde_yaml::from_slice(raw)
            .map_err(|e| IndexError::InvalidChart(format!("Chart.yaml: {e}")))?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Check that name and version are present and the version is semver.
    pub fn validate(&self) -> IndexResult<()> {
        if self.name.trim().is_empty() {
            return Err(IndexError::InvalidChart("chart name is required".into()));
        }
        if self.name.contains('/') {
            return Err(IndexError::InvalidChart(format!(
                "chart name {:?} must not contain '/'",
                self.name
            )));
        }
        if self.version.trim().is_empty() {
            return Err(IndexError::InvalidChart(format!(
                "chart {} has no version",
                self.name
            )));
        }
        parse_version(&self.version).map_err(|e| IndexError::InvalidVersion {
            name: self.name.clone(),
            version: self.version.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}
