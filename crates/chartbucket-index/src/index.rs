//! The repository index file and its merge rules.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::next_generated;
use crate::entry::ChartEntry;
use crate::error::{IndexError, IndexResult};
use crate::version::compare_versions;

/// Schema version written into every index.
pub const INDEX_API_VERSION: &str = "v1";

/// Result of merging an entry into an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No entry with this name and version existed.
    Inserted,
    /// An existing entry was replaced.
    Replaced,
    /// An entry existed and replacement was not allowed; nothing changed.
    Unchanged,
}

impl MergeOutcome {
    pub fn is_changed(self) -> bool {
        !matches!(self, MergeOutcome::Unchanged)
    }
}

/// A chart repository index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile {
    #[serde(default)]
    pub api_version: String,
    /// Chart name to versions, newest first.
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<ChartEntry>>,
    /// Timestamp of the last mutation.
    #[serde(default)]
    pub generated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_info: Option<serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Default for IndexFile {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::default())
    }
}

impl IndexFile {
    /// An empty index with the current schema version.
    pub fn new(generated: DateTime<Utc>) -> Self {
        Self {
            api_version: INDEX_API_VERSION.to_string(),
            entries: BTreeMap::new(),
            generated,
            server_info: None,
            annotations: BTreeMap::new(),
        }
    }

    /// Parse a serialized index.
    ///
    /// Fails with [`IndexError::Malformed`] on invalid YAML, a missing
    /// `apiVersion`, entries without a name or version, or entries filed
    /// under another chart's name. Versions are re-sorted newest first.
    pub fn parse(raw: &[u8]) -> IndexResult<Self> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(IndexError::Malformed("index is empty".into()));
        }
        let mut index: IndexFile =
            serde_yaml::from_slice(raw).map_err(|e| IndexError::Malformed(e.to_string()))?;

        if index.api_version.is_empty() {
            return Err(IndexError::Malformed("no API version specified".into()));
        }
        for (name, versions) in &index.entries {
            for entry in versions {
                if entry.name().is_empty() || entry.version().is_empty() {
                    return Err(IndexError::Malformed(format!(
                        "entry under {name:?} is missing a name or version"
                    )));
                }
                if entry.name() != name {
                    return Err(IndexError::Malformed(format!(
                        "entry {:?} is filed under {name:?}",
                        entry.name()
                    )));
                }
            }
        }
        index.sort_entries();
        Ok(index)
    }

    /// Serialize the whole index to YAML.
    pub fn to_yaml(&self) -> IndexResult<Vec<u8>> {
        serde_yaml::to_string(self)
            .map(String::into_bytes)
            .map_err(|e| IndexError::Serialization(e.to_string()))
    }

    /// Total number of chart versions.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, name: &str, version: &str) -> Option<&ChartEntry> {
        self.entries
            .get(name)?
            .iter()
            .find(|entry| entry.version() == version)
    }

    pub fn contains(&self, name: &str, version: &str) -> bool {
        self.get(name, version).is_some()
    }

    /// Merge `entry` into the index.
    ///
    /// If `(name, version)` already exists and `allow_replace` is false the
    /// index is left exactly as it was, `generated` included. Otherwise the
    /// entry is inserted or replaces the existing one, the chart's versions
    /// are re-sorted and `generated` moves strictly forward from its prior
    /// value, using `now` when possible.
    pub fn merge(
        &mut self,
        entry: ChartEntry,
        allow_replace: bool,
        now: DateTime<Utc>,
    ) -> MergeOutcome {
        let name = entry.name().to_string();
        let version = entry.version().to_string();
        let versions = self.entries.entry(name.clone()).or_default();
        let existed = versions.iter().any(|e| e.version() == version);

        if existed && !allow_replace {
            debug!(chart = %name, %version, "entry exists, merge is a no-op");
            return MergeOutcome::Unchanged;
        }

        versions.retain(|e| e.version() != version);
        versions.push(entry);
        sort_versions(versions);
        self.generated = next_generated(self.generated, now);

        let outcome = if existed {
            MergeOutcome::Replaced
        } else {
            MergeOutcome::Inserted
        };
        debug!(chart = %name, %version, ?outcome, generated = %self.generated, "entry merged");
        outcome
    }

    /// Remove one chart version, bumping `generated` if it was present.
    pub fn remove(&mut self, name: &str, version: &str, now: DateTime<Utc>) -> Option<ChartEntry> {
        let versions = self.entries.get_mut(name)?;
        let position = versions.iter().position(|e| e.version() == version)?;
        let removed = versions.remove(position);
        if versions.is_empty() {
            self.entries.remove(name);
        }
        self.generated = next_generated(self.generated, now);
        Some(removed)
    }

    /// Sort every chart's versions newest first.
    pub fn sort_entries(&mut self) {
        for versions in self.entries.values_mut() {
            sort_versions(versions);
        }
    }
}

fn sort_versions(versions: &mut [ChartEntry]) {
    versions.sort_by(|a, b| compare_versions(b.version(), a.version()));
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;

    use super::*;
    use crate::chart::ChartMetadata;

    const HELM_INDEX: &str = r#"apiVersion: v1
entries:
  foo:
  - apiVersion: v2
    appVersion: 1.2.3
    created: "2024-03-01T10:00:00.123456789Z"
    description: A Helm chart for Kubernetes
    digest: 0f1e2d
    name: foo
    urls:
    - foo-1.2.3.tgz
    version: 1.2.3
  - created: "2024-02-01T10:00:00Z"
    name: foo
    urls:
    - s3://bucket/charts/foo-1.0.0.tgz
    version: 1.0.0
generated: "2024-03-01T10:00:00.5Z"
serverInfo:
  contextPath: /charts
"#;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn entry(name: &str, version: &str, digest: &str) -> ChartEntry {
        ChartEntry::new(
            ChartMetadata::new(name, version),
            vec![format!("{name}-{version}.tgz")],
            digest,
            t(0),
        )
        .unwrap()
    }

    // -----------------------------------------------------------------------
    // Parse / serialize
    // -----------------------------------------------------------------------

    #[test]
    fn parses_helm_index() {
        let index = IndexFile::parse(HELM_INDEX.as_bytes()).unwrap();
        assert_eq!(index.api_version, "v1");
        assert_eq!(index.len(), 2);
        let foo = index.get("foo", "1.2.3").unwrap();
        assert_eq!(foo.urls, vec!["foo-1.2.3.tgz"]);
        assert_eq!(foo.digest, "0f1e2d");
        assert_eq!(foo.created.timestamp_subsec_nanos(), 123_456_789);
        assert!(index.server_info.is_some());
    }

    #[test]
    fn serialize_then_parse_preserves_everything() {
        let index = IndexFile::parse(HELM_INDEX.as_bytes()).unwrap();
        let again = IndexFile::parse(&index.to_yaml().unwrap()).unwrap();
        assert_eq!(again, index);
    }

    #[test]
    fn nanosecond_generated_survives_serialization() {
        let mut index = IndexFile::new(t(0));
        index.merge(entry("foo", "1.0.0", "a"), false, t(0));
        assert_eq!(index.generated, t(0) + chrono::Duration::nanoseconds(1));
        let again = IndexFile::parse(&index.to_yaml().unwrap()).unwrap();
        assert_eq!(again.generated, index.generated);
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        let err = IndexFile::parse(b"apiVersion: v1\nentries: [not, a, map\n").unwrap_err();
        assert!(matches!(err, IndexError::Malformed(_)));
    }

    #[test]
    fn empty_index_is_rejected() {
        assert!(matches!(IndexFile::parse(b"  \n"), Err(IndexError::Malformed(_))));
    }

    #[test]
    fn missing_api_version_is_rejected() {
        let err = IndexFile::parse(b"entries: {}\ngenerated: 2024-01-01T00:00:00Z\n").unwrap_err();
        assert!(err.to_string().contains("no API version"));
    }

    #[test]
    fn entry_without_version_is_rejected() {
        let raw = b"apiVersion: v1\nentries:\n  foo:\n  - name: foo\n    created: 2024-01-01T00:00:00Z\n";
        assert!(matches!(IndexFile::parse(raw), Err(IndexError::Malformed(_))));
    }

    #[test]
    fn entry_under_foreign_name_is_rejected() {
        let raw = b"apiVersion: v1\nentries:\n  foo:\n  - name: bar\n    version: 1.0.0\n    created: 2024-01-01T00:00:00Z\n";
        let err = IndexFile::parse(raw).unwrap_err();
        assert!(err.to_string().contains("filed under"));
    }

    #[test]
    fn parse_sorts_versions_written_out_of_order() {
        let raw = b"apiVersion: v1
entries:
  foo:
  - name: foo
    version: 1.0.0
    created: 2024-01-01T00:00:00Z
  - name: foo
    version: 1.10.0
    created: 2024-01-02T00:00:00Z
  - name: foo
    version: 1.9.0
    created: 2024-01-03T00:00:00Z
";
        let index = IndexFile::parse(raw).unwrap();
        let versions: Vec<&str> = index.entries["foo"].iter().map(|e| e.version()).collect();
        assert_eq!(versions, vec!["1.10.0", "1.9.0", "1.0.0"]);
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    #[test]
    fn merge_into_empty_index_inserts() {
        let mut index = IndexFile::default();
        let outcome = index.merge(entry("foo", "1.2.3", "a"), false, t(10));
        assert_eq!(outcome, MergeOutcome::Inserted);
        assert!(outcome.is_changed());
        assert_eq!(index.generated, t(10));
        assert!(index.contains("foo", "1.2.3"));
    }

    #[test]
    fn existing_entry_without_replace_is_untouched() {
        let mut index = IndexFile::new(t(0));
        index.merge(entry("foo", "1.2.3", "old"), false, t(10));
        let before = index.clone();

        let outcome = index.merge(entry("foo", "1.2.3", "new"), false, t(20));
        assert_eq!(outcome, MergeOutcome::Unchanged);
        assert_eq!(index, before);
        assert_eq!(index.get("foo", "1.2.3").unwrap().digest, "old");
    }

    #[test]
    fn existing_entry_with_replace_is_replaced() {
        let mut index = IndexFile::new(t(0));
        index.merge(entry("foo", "1.2.3", "old"), false, t(10));

        let outcome = index.merge(entry("foo", "1.2.3", "new"), true, t(20));
        assert_eq!(outcome, MergeOutcome::Replaced);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("foo", "1.2.3").unwrap().digest, "new");
        assert_eq!(index.generated, t(20));
    }

    #[test]
    fn generated_strictly_increases_even_with_stale_clock() {
        let mut index = IndexFile::new(t(100));
        index.merge(entry("foo", "1.0.0", "a"), false, t(50));
        let first = index.generated;
        assert!(first > t(100));

        index.merge(entry("foo", "1.0.1", "b"), false, t(50));
        assert!(index.generated > first);
    }

    #[test]
    fn versions_are_sorted_descending_by_semver() {
        let mut index = IndexFile::default();
        for v in ["1.9.0", "1.10.0", "0.1.0", "1.10.0-rc.1"] {
            index.merge(entry("foo", v, v), false, t(1));
        }
        let versions: Vec<&str> = index.entries["foo"].iter().map(|e| e.version()).collect();
        assert_eq!(versions, vec!["1.10.0", "1.10.0-rc.1", "1.9.0", "0.1.0"]);
    }

    #[test]
    fn charts_are_kept_separate() {
        let mut index = IndexFile::default();
        index.merge(entry("foo", "1.0.0", "a"), false, t(1));
        index.merge(entry("bar", "1.0.0", "b"), false, t(2));
        assert_eq!(index.entries.len(), 2);
        assert_eq!(index.len(), 2);
    }

    // -----------------------------------------------------------------------
    // Remove
    // -----------------------------------------------------------------------

    #[test]
    fn remove_drops_entry_and_bumps_generated() {
        let mut index = IndexFile::default();
        index.merge(entry("foo", "1.0.0", "a"), false, t(1));
        index.merge(entry("foo", "2.0.0", "b"), false, t(2));

        let removed = index.remove("foo", "1.0.0", t(3)).unwrap();
        assert_eq!(removed.digest, "a");
        assert_eq!(index.generated, t(3));
        assert_eq!(index.len(), 1);

        index.remove("foo", "2.0.0", t(4)).unwrap();
        assert!(index.entries.is_empty());
    }

    #[test]
    fn remove_missing_leaves_index_untouched() {
        let mut index = IndexFile::default();
        index.merge(entry("foo", "1.0.0", "a"), false, t(1));
        let before = index.clone();
        assert!(index.remove("foo", "9.9.9", t(5)).is_none());
        assert!(index.remove("bar", "1.0.0", t(5)).is_none());
        assert_eq!(index, before);
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn merge_keeps_order_and_monotonic_generated(
            versions in proptest::collection::btree_set((0u64..20, 0u64..20, 0u64..20), 1..25),
            clock_offsets in proptest::collection::vec(-5i64..5, 25),
        ) {
            let mut index = IndexFile::new(t(0));
            let mut previous = index.generated;
            for (i, (major, minor, patch)) in versions.iter().enumerate() {
                let version = format!("{major}.{minor}.{patch}");
                let outcome = index.merge(entry("foo", &version, "d"), false, t(clock_offsets[i]));
                prop_assert_eq!(outcome, MergeOutcome::Inserted);
                prop_assert!(index.generated > previous);
                previous = index.generated;
            }

            prop_assert_eq!(index.len(), versions.len());
            let listed: Vec<semver::Version> = index.entries["foo"]
                .iter()
                .map(|e| semver::Version::parse(e.version()).unwrap())
                .collect();
            for pair in listed.windows(2) {
                prop_assert!(pair[0] > pair[1]);
            }
        }
    }
}
