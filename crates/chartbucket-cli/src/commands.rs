use std::sync::Arc;

use anyhow::Context;
use chartbucket_lock::{LockConfig, StoreLock};
use chartbucket_publish::{PushOptions, Repository, RepositoryClient, UrlStyle};
use chartbucket_store::{FsObjectStore, ObjectStore, RetryPolicy, RetryingStore};
use tracing::debug;

use crate::cli::*;
use crate::config::{Config, ResolvedRepository};

/// Run one command and return the line to print on success.
pub async fn run_command(cli: Cli) -> anyhow::Result<String> {
    let config = Config::load(cli.config.as_deref())?;
    match cli.command {
        Command::Push(args) => cmd_push(&config, args).await,
        Command::Init(args) => cmd_init(&config, args).await,
        Command::Delete(args) => cmd_delete(&config, args).await,
        Command::Reindex(args) => cmd_reindex(&config, args).await,
    }
}

/// The line printed on stderr for a failed command: the error message first,
/// then its causes, with no prefix or styling.
pub fn error_line(err: &anyhow::Error) -> String {
    format!("{err:#}")
}

async fn cmd_push(config: &Config, args: PushArgs) -> anyhow::Result<String> {
    let options = PushOptions {
        force: args.force,
        ignore_if_exists: args.ignore_if_exists,
        dry_run: args.dry_run,
        url_style: url_style(args.relative),
        content_type: args.content_type,
    };
    // Flag conflicts must be reported before the store is even opened.
    chartbucket_publish::PublishPolicy::from_flags(options.force, options.ignore_if_exists, options.dry_run)?;

    let client = open(config, &args.repository)?;
    let report = client.push(&args.chart, &options).await?;
    debug!(key = %report.key, url = %report.url, status = ?report.status, "push finished");
    Ok(report.message().to_string())
}

async fn cmd_init(config: &Config, args: InitArgs) -> anyhow::Result<String> {
    let client = open(config, &args.repository)?;
    Ok(client.init().await?.message())
}

async fn cmd_delete(config: &Config, args: DeleteArgs) -> anyhow::Result<String> {
    let client = open(config, &args.repository)?;
    let report = client.delete(&args.name, &args.version, args.dry_run).await?;
    Ok(report.message())
}

async fn cmd_reindex(config: &Config, args: ReindexArgs) -> anyhow::Result<String> {
    let client = open(config, &args.repository)?;
    let report = client.reindex(url_style(args.relative), args.dry_run).await?;
    Ok(report.message())
}

fn url_style(relative: bool) -> UrlStyle {
    if relative {
        UrlStyle::Relative
    } else {
        UrlStyle::Absolute
    }
}

/// Wire a client for `repository`: filesystem store, retries, store lock.
fn open(config: &Config, repository: &str) -> anyhow::Result<RepositoryClient> {
    let resolved = config.resolve(repository)?;
    let ResolvedRepository {
        name,
        url,
        prefix,
        public_url,
    } = resolved;

    let fs = FsObjectStore::from_url(&url).with_context(|| format!("opening repository {name}"))?;
    let store: Arc<dyn ObjectStore> = Arc::new(RetryingStore::new(
        Arc::new(fs),
        RetryPolicy::from(&config.retry),
    ));
    let lock = Arc::new(StoreLock::new(Arc::clone(&store), LockConfig::from(&config.lock)));

    let mut repo = Repository::new(name, &prefix);
    if let Some(public_url) = public_url {
        repo = repo.with_public_url(public_url);
    }
    debug!(repository = repo.name(), %url, prefix = repo.prefix(), "repository opened");
    Ok(RepositoryClient::new(store, lock, repo))
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use chartbucket_publish::{ErrorKind, PublishError};
    use clap::Parser;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    fn write_chart(dir: &Path, name: &str, version: &str) -> PathBuf {
        let chart_yaml = format!("apiVersion: v2\nname: {name}\nversion: {version}\n");
        let mut tar = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut header = tar::Header::new_gnu();
        header.set_path(format!("{name}/Chart.yaml")).unwrap();
        header.set_size(chart_yaml.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append(&header, chart_yaml.as_bytes()).unwrap();
        let data = tar.into_inner().unwrap().finish().unwrap();

        let path = dir.join(format!("{name}-{version}.tgz"));
        std::fs::write(&path, data).unwrap();
        path
    }

    struct Env {
        _dir: tempfile::TempDir,
        repo_root: PathBuf,
        config: PathBuf,
        chart: PathBuf,
    }

    fn env() -> Env {
        let dir = tempfile::tempdir().unwrap();
        let repo_root = dir.path().join("bucket");
        std::fs::create_dir_all(&repo_root).unwrap();
        let config = dir.path().join("chartbucket.toml");
        std::fs::write(
            &config,
            format!(
                "[repositories.stable]\nurl = \"file://{}\"\n\n[lock]\nmax_wait_secs = 5\ninitial_backoff_ms = 5\nmax_backoff_ms = 20\n",
                repo_root.display()
            ),
        )
        .unwrap();
        let chart = write_chart(dir.path(), "foo", "1.2.3");
        Env {
            _dir: dir,
            repo_root,
            config,
            chart,
        }
    }

    async fn run(env: &Env, args: &[&str]) -> anyhow::Result<String> {
        let config = env.config.to_str().unwrap();
        let mut argv = vec!["chartbucket", "--config", config];
        argv.extend_from_slice(args);
        run_command(Cli::try_parse_from(argv).unwrap()).await
    }

    fn publish_kind(err: &anyhow::Error) -> Option<ErrorKind> {
        err.downcast_ref::<PublishError>().map(PublishError::kind)
    }

    #[tokio::test]
    async fn push_then_strict_push_again() {
        let env = env();
        let chart = env.chart.to_str().unwrap();

        let out = run(&env, &["push", chart, "stable"]).await.unwrap();
        assert_eq!(out, "Successfully uploaded the chart to the repository.");
        assert!(env.repo_root.join("charts/foo-1.2.3.tgz").exists());
        let index = std::fs::read_to_string(env.repo_root.join("charts/index.yaml")).unwrap();
        assert!(index.contains("file://"));
        assert!(!env.repo_root.join("charts/index.yaml.lock").exists());

        let err = run(&env, &["push", chart, "stable"]).await.unwrap_err();
        assert_eq!(publish_kind(&err), Some(ErrorKind::AlreadyExists));
        assert_eq!(
            error_line(&err),
            "The chart already exists in the repository and cannot be overwritten without an explicit intent."
        );

        let out = run(&env, &["push", chart, "stable", "--ignore-if-exists"]).await.unwrap();
        assert!(out.contains("keep existing chart and ignore push"));
    }

    #[tokio::test]
    async fn relative_push_records_file_name() {
        let env = env();
        let chart = env.chart.to_str().unwrap();
        run(&env, &["push", "--relative", chart, "stable"]).await.unwrap();
        let index = std::fs::read_to_string(env.repo_root.join("charts/index.yaml")).unwrap();
        assert!(index.contains("- foo-1.2.3.tgz"));
        assert!(!index.contains("file://"));
    }

    #[tokio::test]
    async fn conflicting_flags_touch_nothing() {
        let env = env();
        let chart = env.chart.to_str().unwrap();
        let err = run(&env, &["push", chart, "stable", "--force", "--ignore-if-exists"])
            .await
            .unwrap_err();
        assert_eq!(publish_kind(&err), Some(ErrorKind::FlagConflict));
        assert_eq!(
            error_line(&err),
            "The --force and --ignore-if-exists flags are mutually exclusive and cannot be specified together."
        );
        assert_eq!(std::fs::read_dir(&env.repo_root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn dry_run_push_creates_nothing() {
        let env = env();
        let chart = env.chart.to_str().unwrap();
        let out = run(&env, &["push", chart, "stable", "--dry-run"]).await.unwrap();
        assert_eq!(out, "Successfully uploaded the chart to the repository.");
        assert!(!env.repo_root.join("charts/foo-1.2.3.tgz").exists());
        assert!(!env.repo_root.join("charts/index.yaml").exists());
    }

    #[tokio::test]
    async fn init_delete_reindex() {
        let env = env();
        let chart = env.chart.to_str().unwrap();

        let out = run(&env, &["init", "stable"]).await.unwrap();
        assert!(out.starts_with("Initialized empty repository"));
        run(&env, &["push", chart, "stable"]).await.unwrap();

        let out = run(&env, &["reindex", "stable", "--relative"]).await.unwrap();
        assert!(out.contains("1 chart version"));

        let out = run(&env, &["delete", "foo", "--version", "1.2.3", "stable"]).await.unwrap();
        assert!(out.contains("foo version 1.2.3"));
        assert!(!env.repo_root.join("charts/foo-1.2.3.tgz").exists());

        let err = run(&env, &["delete", "foo", "--version", "1.2.3", "stable"]).await.unwrap_err();
        assert_eq!(publish_kind(&err), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn direct_file_url_repository() {
        let env = env();
        let url = format!("file://{}", env.repo_root.join("direct").display());
        let out = run(&env, &["init", &url]).await.unwrap();
        assert!(out.contains("index.yaml"));
        assert!(env.repo_root.join("direct/index.yaml").exists());
    }

    #[tokio::test]
    async fn unknown_repository_fails() {
        let env = env();
        let err = run(&env, &["init", "nope"]).await.unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }
}
