use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "chartbucket",
    about = "Publish charts to an object-store backed chart repository",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: ./chartbucket.toml if present).
    #[arg(long, global = true, env = "CHARTBUCKET_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Upload a chart archive and add it to the repository index
    Push(PushArgs),
    /// Create an empty repository index
    Init(InitArgs),
    /// Remove a chart version from the index and the store
    Delete(DeleteArgs),
    /// Rebuild the index from the chart archives in the repository
    Reindex(ReindexArgs),
}

#[derive(Args)]
pub struct PushArgs {
    /// Path to the packaged chart (.tgz).
    pub chart: PathBuf,
    /// Configured repository name or file:// URL.
    pub repository: String,
    /// Media type of the uploaded object.
    #[arg(long)]
    pub content_type: Option<String>,
    /// Report what would happen without changing the repository.
    #[arg(long)]
    pub dry_run: bool,
    /// Replace the chart if it already exists.
    #[arg(long)]
    pub force: bool,
    /// Keep the existing chart and succeed if it already exists.
    #[arg(long)]
    pub ignore_if_exists: bool,
    /// Record the chart file name instead of its absolute URL.
    #[arg(long)]
    pub relative: bool,
}

#[derive(Args)]
pub struct InitArgs {
    pub repository: String,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Chart name.
    pub name: String,
    pub repository: String,
    #[arg(long)]
    pub version: String,
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct ReindexArgs {
    pub repository: String,
    #[arg(long)]
    pub relative: bool,
    #[arg(long)]
    pub dry_run: bool,
}
