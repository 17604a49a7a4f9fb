//! Loading packaged chart archives (`.tgz`).

use std::io::Read;
use std::path::{Component, Path};

use bytes::Bytes;
use chartbucket_index::{ChartEntry, ChartMetadata};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tar::Archive;

use crate::error::{PublishError, PublishResult};

const CHART_FILE: &str = "Chart.yaml";

/// A chart archive read into memory together with its metadata.
#[derive(Clone, Debug)]
pub struct ChartArchive {
    /// File name the archive is published under.
    pub file_name: String,
    pub data: Bytes,
    /// Hex sha256 of `data`.
    pub digest: String,
    pub metadata: ChartMetadata,
}

impl ChartArchive {
    /// Read and inspect the archive at `path`.
    pub async fn load(path: &Path) -> PublishResult<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| invalid(path.display(), "path has no file name"))?
            .to_string();
        let data = tokio::fs::read(path).await?;
        Self::from_bytes(file_name, Bytes::from(data))
    }

    /// Inspect an archive already in memory.
    ///
    /// The metadata is taken from `<chart>/Chart.yaml` at the top level of
    /// the archive; `Chart.yaml` files of bundled subcharts are ignored.
    pub fn from_bytes(file_name: impl Into<String>, data: Bytes) -> PublishResult<Self> {
        let file_name = file_name.into();
        let raw = read_chart_yaml(&data).map_err(|reason| invalid(&file_name, reason))?;
        let metadata =
            ChartMetadata::from_yaml(&raw).map_err(|e| invalid(&file_name, e.to_string()))?;
        let digest = hex::encode(Sha256::digest(&data));
        Ok(Self {
            file_name,
            data,
            digest,
            metadata,
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Index entry for this archive served from `urls`.
    pub fn entry(&self, urls: Vec<String>, created: DateTime<Utc>) -> PublishResult<ChartEntry> {
        Ok(ChartEntry::new(
            self.metadata.clone(),
            urls,
            self.digest.clone(),
            created,
        )?)
    }
}

fn read_chart_yaml(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut archive = Archive::new(GzDecoder::new(data));
    let entries = archive.entries().map_err(|e| format!("not a gzipped tar archive: {e}"))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| format!("corrupt archive: {e}"))?;
        let top_level = {
            let path = entry.path().map_err(|e| format!("corrupt archive: {e}"))?;
            let parts: Vec<Component<'_>> = path
                .components()
                .filter(|c| !matches!(c, Component::CurDir))
                .collect();
            matches!(
                parts.as_slice(),
                [Component::Normal(_), Component::Normal(file)] if *file == CHART_FILE
            )
        };
        if !top_level {
            continue;
        }
        let mut raw = Vec::new();
        entry
            .read_to_end(&mut raw)
            .map_err(|e| format!("reading {CHART_FILE}: {e}"))?;
        return Ok(raw);
    }
    Err(format!("archive has no {CHART_FILE}"))
}

fn invalid(path: impl std::fmt::Display, reason: impl Into<String>) -> PublishError {
    PublishError::InvalidChart {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Build a minimal chart archive in memory.
#[cfg(test)]
pub(crate) fn test_chart(name: &str, version: &str) -> Bytes {
    test_chart_described(name, version, "test chart")
}

#[cfg(test)]
pub(crate) fn test_chart_described(name: &str, version: &str, description: &str) -> Bytes {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let chart_yaml =
        format!("apiVersion: v2\nname: {name}\nversion: {version}\ndescription: {description}\n");
    let values = "replicaCount: 1\n";
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = tar::Builder::new(encoder);
    for (path, body) in [
        (format!("{name}/Chart.yaml"), chart_yaml.as_str()),
        (format!("{name}/values.yaml"), values),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_path(&path).unwrap();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append(&header, body.as_bytes()).unwrap();
    }
    let encoder = tar.into_inner().unwrap();
    Bytes::from(encoder.finish().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_metadata_and_digest() {
        let data = test_chart("foo", "1.2.3");
        let archive = ChartArchive::from_bytes("foo-1.2.3.tgz", data.clone()).unwrap();
        assert_eq!(archive.name(), "foo");
        assert_eq!(archive.version(), "1.2.3");
        assert_eq!(archive.file_name, "foo-1.2.3.tgz");
        assert_eq!(archive.digest.len(), 64);
        assert_eq!(archive.digest, hex::encode(Sha256::digest(&data)));
    }

    #[test]
    fn builds_entry() {
        let archive = ChartArchive::from_bytes("foo-1.2.3.tgz", test_chart("foo", "1.2.3")).unwrap();
        let entry = archive.entry(vec!["foo-1.2.3.tgz".into()], Utc::now()).unwrap();
        assert_eq!(entry.name(), "foo");
        assert_eq!(entry.digest, archive.digest);
        assert_eq!(entry.urls, vec!["foo-1.2.3.tgz"]);
    }

    #[test]
    fn rejects_garbage() {
        let err = ChartArchive::from_bytes("bad.tgz", Bytes::from_static(b"not a tarball")).unwrap_err();
        assert!(matches!(err, PublishError::InvalidChart { .. }));
    }

    #[test]
    fn rejects_invalid_version() {
        let err = ChartArchive::from_bytes("foo.tgz", test_chart("foo", "latest")).unwrap_err();
        assert!(err.to_string().contains("foo.tgz"));
    }

    #[tokio::test]
    async fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo-0.1.0.tgz");
        std::fs::write(&path, test_chart("foo", "0.1.0")).unwrap();
        let archive = ChartArchive::load(&path).await.unwrap();
        assert_eq!(archive.file_name, "foo-0.1.0.tgz");
        assert_eq!(archive.version(), "0.1.0");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = ChartArchive::load(Path::new("/nonexistent/foo.tgz")).await.unwrap_err();
        assert!(matches!(err, PublishError::Io(_)));
    }
}
