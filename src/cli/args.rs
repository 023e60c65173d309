use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// Output format for `check`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Options shared by every command that reads a repository's workflows.
#[derive(Args, Clone, Debug)]
pub struct SourceArgs {
    /// Repository root holding the workflows directory (defaults to current directory)
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Restrict to one workflow file, relative to the workflows directory
    #[arg(long, short = 'w', value_name = "FILE")]
    pub workflow: Option<PathBuf>,
}

#[derive(Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Render findings as text or JSON
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct ManifestArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Args)]
pub struct PrepareArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Leave the instrumented workspace on disk after the command exits
    #[arg(long)]
    pub keep: bool,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Event that triggers the workflows (default: runner.event from detent.toml)
    #[arg(long, value_name = "EVENT")]
    pub event: Option<String>,

    /// Runner binary to launch (default: runner.binary from detent.toml)
    #[arg(long, value_name = "BIN")]
    pub runner: Option<PathBuf>,

    /// Echo runner output lines to stderr while the run is in progress
    #[arg(long)]
    pub stream: bool,

    /// Seconds between the terminate signal and the forced kill on Ctrl-C
    #[arg(long, value_name = "SECONDS")]
    pub grace_period: Option<u64>,
}
