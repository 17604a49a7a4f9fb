//! Repository addressing: where artifacts, the index and the lock live.

use chartbucket_store::ObjectStore;

/// Name of the index object under the repository prefix.
pub const INDEX_FILE_NAME: &str = "index.yaml";

/// Suffix appended to the index key to form the lock key.
pub const LOCK_SUFFIX: &str = ".lock";

/// How chart URLs are written into index entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UrlStyle {
    /// The fully qualified URL of the artifact.
    #[default]
    Absolute,
    /// Only the artifact file name, resolved by clients against the index URL.
    Relative,
}

/// A named collection of charts plus one index, rooted at a key prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Repository {
    name: String,
    prefix: String,
    public_url: Option<String>,
}

impl Repository {
    /// Create a repository rooted at `prefix`. Surrounding slashes are
    /// ignored; an empty prefix roots the repository at the store root.
    pub fn new(name: impl Into<String>, prefix: &str) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.trim_matches('/').to_string(),
            public_url: None,
        }
    }

    /// Use `url` instead of the store URL as the base of absolute chart URLs.
    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn public_url(&self) -> Option<&str> {
        self.public_url.as_deref()
    }

    pub fn artifact_key(&self, file_name: &str) -> String {
        self.key(file_name)
    }

    pub fn index_key(&self) -> String {
        self.key(INDEX_FILE_NAME)
    }

    pub fn lock_key(&self) -> String {
        format!("{}{LOCK_SUFFIX}", self.index_key())
    }

    /// Prefix that every object of this repository starts with.
    pub fn list_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        }
    }

    /// The file name of an artifact key that sits directly under the prefix.
    pub fn file_name_of<'a>(&self, key: &'a str) -> Option<&'a str> {
        let name = key.strip_prefix(&self.list_prefix())?;
        (!name.is_empty() && !name.contains('/')).then_some(name)
    }

    /// URL written into the index entry for the artifact `file_name`.
    pub fn chart_url(&self, store: &dyn ObjectStore, file_name: &str, style: UrlStyle) -> String {
        match (style, &self.public_url) {
            (UrlStyle::Relative, _) => file_name.to_string(),
            (UrlStyle::Absolute, Some(base)) => format!("{base}/{file_name}"),
            (UrlStyle::Absolute, None) => store.url(&self.artifact_key(file_name)),
        }
    }

    fn key(&self, file_name: &str) -> String {
        format!("{}{file_name}", self.list_prefix())
    }
}

#[cfg(test)]
mod tests {
    use chartbucket_store::InMemoryObjectStore;

    use super::*;

    #[test]
    fn keys_are_deterministic() {
        let repo = Repository::new("stable", "/charts/");
        assert_eq!(repo.prefix(), "charts");
        assert_eq!(repo.artifact_key("foo-1.2.3.tgz"), "charts/foo-1.2.3.tgz");
        assert_eq!(repo.index_key(), "charts/index.yaml");
        assert_eq!(repo.lock_key(), "charts/index.yaml.lock");
    }

    #[test]
    fn empty_prefix_uses_store_root() {
        let repo = Repository::new("root", "");
        assert_eq!(repo.index_key(), "index.yaml");
        assert_eq!(repo.artifact_key("a.tgz"), "a.tgz");
        assert_eq!(repo.file_name_of("a.tgz"), Some("a.tgz"));
    }

    #[test]
    fn file_name_of_only_direct_children() {
        let repo = Repository::new("stable", "charts");
        assert_eq!(repo.file_name_of("charts/foo-1.0.0.tgz"), Some("foo-1.0.0.tgz"));
        assert_eq!(repo.file_name_of("charts/nested/foo.tgz"), None);
        assert_eq!(repo.file_name_of("other/foo.tgz"), None);
    }

    #[test]
    fn chart_urls() {
        let store = InMemoryObjectStore::with_base_url("s3://bucket");
        let repo = Repository::new("stable", "charts");
        assert_eq!(
            repo.chart_url(&store, "foo-1.2.3.tgz", UrlStyle::Relative),
            "foo-1.2.3.tgz"
        );
        assert_eq!(
            repo.chart_url(&store, "foo-1.2.3.tgz", UrlStyle::Absolute),
            "s3://bucket/charts/foo-1.2.3.tgz"
        );

        let public = repo.with_public_url("https://charts.example.com/stable/");
        assert_eq!(
            public.chart_url(&store, "foo-1.2.3.tgz", UrlStyle::Absolute),
            "https://charts.example.com/stable/foo-1.2.3.tgz"
        );
    }
}
