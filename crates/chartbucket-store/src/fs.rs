//! Local-directory object store.
//!
//! Objects live at `<root>/<key>`. Content types are kept in JSON sidecars
//! under `<root>/.meta/<key>.json`. Unconditional writes go through a
//! temporary file and a rename; `put_if_absent` opens the target with
//! `create_new`, which makes it a real create-if-absent on local filesystems.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::{validate_key, ObjectMeta, StoredObject};
use crate::traits::ObjectStore;

const META_DIR: &str = ".meta";
const TMP_PREFIX: &str = ".tmp-";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
}

/// Object store rooted at a local directory.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;
        Ok(Self { root })
    }

    /// Open a store from a `file:///absolute/path` URL.
    pub fn from_url(url: &str) -> StoreResult<Self> {
        let path = url
            .strip_prefix("file://")
            .filter(|p| p.starts_with('/'))
            .ok_or_else(|| StoreError::InvalidUrl(url.to_string()))?;
        Self::open(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.root.join(META_DIR).join(format!("{key}.json"))
    }

    async fn ensure_parent(path: &Path) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn write_sidecar(&self, key: &str, content_type: &str) -> StoreResult<()> {
        let path = self.sidecar_path(key);
        Self::ensure_parent(&path).await?;
        let sidecar = Sidecar {
            content_type: content_type.to_string(),
        };
        let json = serde_json::to_vec(&sidecar)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn read_content_type(&self, key: &str) -> StoreResult<String> {
        match tokio::fs::read(self.sidecar_path(key)).await {
            Ok(raw) => {
                let sidecar: Sidecar = serde_json::from_slice(&raw)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(sidecar.content_type)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Ok(FALLBACK_CONTENT_TYPE.to_string())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn meta_for(&self, key: &str, fs_meta: &std::fs::Metadata) -> StoreResult<ObjectMeta> {
        Ok(ObjectMeta {
            key: key.to_string(),
            size: fs_meta.len(),
            content_type: self.read_content_type(key).await?,
            last_modified: DateTime::<Utc>::from(fs_meta.modified()?),
        })
    }

    fn temp_path(target: &Path) -> PathBuf {
        let suffix: u64 = rand::thread_rng().gen();
        let name = format!("{TMP_PREFIX}{suffix:016x}");
        match target.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn stat(&self, key: &str) -> StoreResult<Option<ObjectMeta>> {
        validate_key(key)?;
        match tokio::fs::metadata(self.object_path(key)).await {
            Ok(fs_meta) if fs_meta.is_file() => Ok(Some(self.meta_for(key, &fs_meta).await?)),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        let Some(meta) = self.stat(key).await? else {
            return Ok(None);
        };
        match tokio::fs::read(self.object_path(key)).await {
            Ok(data) => {
                let meta = ObjectMeta {
                    size: data.len() as u64,
                    ..meta
                };
                Ok(Some(StoredObject::new(meta, Bytes::from(data))))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StoreResult<ObjectMeta> {
        validate_key(key)?;
        let target = self.object_path(key);
        Self::ensure_parent(&target).await?;

        let tmp = Self::temp_path(&target);
        tokio::fs::write(&tmp, &data).await?;
        self.write_sidecar(key, content_type).await?;
        if let Err(err) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        debug!(key, size = data.len(), "object written");

        let fs_meta = tokio::fs::metadata(&target).await?;
        self.meta_for(key, &fs_meta).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StoreResult<Option<ObjectMeta>> {
        validate_key(key)?;
        let target = self.object_path(key);
        Self::ensure_parent(&target).await?;

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);
        self.write_sidecar(key, content_type).await?;
        debug!(key, size = data.len(), "object created");

        let fs_meta = tokio::fs::metadata(&target).await?;
        Ok(Some(self.meta_for(key, &fs_meta).await?))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        let existed = match tokio::fs::remove_file(self.object_path(key)).await {
            Ok(()) => true,
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(err) => return Err(err.into()),
        };
        match tokio::fs::remove_file(self.sidecar_path(key)).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        Ok(existed)
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        let root = self.root.clone();
        let keys = tokio::task::spawn_blocking(move || -> StoreResult<Vec<String>> {
            let mut keys = Vec::new();
            let walker = walkdir::WalkDir::new(&root)
                .min_depth(1)
                .into_iter()
                .filter_entry(|entry| entry.file_name() != META_DIR);
            for entry in walker {
                let entry = entry.map_err(|e| {
                    StoreError::Io(e.into_io_error().unwrap_or_else(|| {
                        io::Error::new(io::ErrorKind::Other, "directory walk failed")
                    }))
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if entry.file_name().to_string_lossy().starts_with(TMP_PREFIX) {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                keys.push(key);
            }
            Ok(keys)
        })
        .await
        .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::Other, e)))??;

        let mut metas = Vec::new();
        for key in keys.into_iter().filter(|k| k.starts_with(prefix)) {
            // Objects deleted mid-walk are skipped.
            if let Some(meta) = self.stat(&key).await? {
                metas.push(meta);
            }
        }
        metas.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(metas)
    }

    fn url(&self, key: &str) -> String {
        format!("file://{}/{}", self.root.display(), key)
    }
}
