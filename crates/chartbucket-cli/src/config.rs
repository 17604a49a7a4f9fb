use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use chartbucket_lock::LockConfig;
use chartbucket_store::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "chartbucket.toml";

const DEFAULT_PREFIX: &str = "charts";

/// Contents of `chartbucket.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub repositories: BTreeMap<String, RepositoryConfig>,
    pub lock: LockSettings,
    pub retry: RetrySettings,
}

/// A named repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Store root, `file:///path`.
    pub url: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Base of absolute chart URLs written into the index.
    #[serde(default)]
    pub public_url: Option<String>,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    pub ttl_secs: u64,
    pub max_wait_secs: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            max_wait_secs: 120,
            initial_backoff_ms: 100,
            max_backoff_ms: 2000,
        }
    }
}

impl From<&LockSettings> for LockConfig {
    fn from(s: &LockSettings) -> Self {
        LockConfig {
            ttl: Duration::from_secs(s.ttl_secs),
            max_wait: Duration::from_secs(s.max_wait_secs),
            initial_backoff: Duration::from_millis(s.initial_backoff_ms),
            max_backoff: Duration::from_millis(s.max_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2000,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        RetryPolicy {
            max_attempts: s.max_attempts.max(1),
            base_delay: Duration::from_millis(s.base_delay_ms),
            max_delay: Duration::from_millis(s.max_delay_ms),
        }
    }
}

/// A repository argument resolved against the config.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRepository {
    pub name: String,
    pub url: String,
    pub prefix: String,
    pub public_url: Option<String>,
}

impl Config {
    /// Load config: explicit path (must exist) → `./chartbucket.toml` → default.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Resolve a repository argument: a configured name, or a `file://` URL
    /// whose directory is itself the repository.
    pub fn resolve(&self, repository: &str) -> anyhow::Result<ResolvedRepository> {
        if let Some(repo) = self.repositories.get(repository) {
            return Ok(ResolvedRepository {
                name: repository.to_string(),
                url: repo.url.clone(),
                prefix: repo.prefix.clone(),
                public_url: repo.public_url.clone(),
            });
        }
        if repository.starts_with("file://") {
            return Ok(ResolvedRepository {
                name: repository.to_string(),
                url: repository.to_string(),
                prefix: String::new(),
                public_url: None,
            });
        }
        bail!("repository {repository:?} is not configured")
    }
}
