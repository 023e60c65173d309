//! File sink: `<repo>/.detent/logs/detent.log` unless `log_dir` says otherwise.

use crate::logging::config::LoggingConfig;
use crate::Result;
use anyhow::Context;
use std::fs::{self, OpenOptions};
use std::path::{Component, Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::{self as tracing_fmt, format};
use tracing_subscriber::layer::Layered;
use tracing_subscriber::registry::LookupSpan;

pub const LOG_FILE_NAME: &str = "detent.log";

pub type FileFmtLayer<S> =
    tracing_fmt::Layer<S, format::DefaultFields, format::Format<format::Full>, NonBlocking>;

/// `None` when file logging is disabled.
pub type FileLayerStack<S> = Layered<Option<FileFmtLayer<S>>, S>;

/// Where the log file goes for a run against `workspace_root`.
///
/// A relative `log_dir` is taken relative to the repository; a leading `~`
/// expands to the home directory.
pub fn log_file_path(config: &LoggingConfig, workspace_root: &Path) -> PathBuf {
    let directory = match &config.log_dir {
        Some(dir) => {
            let dir = expand_home(dir);
            if dir.is_absolute() {
                dir
            } else {
                workspace_root.join(dir)
            }
        }
        None => workspace_root.join(".detent").join("logs"),
    };
    directory.join(LOG_FILE_NAME)
}

fn expand_home(dir: &Path) -> PathBuf {
    let mut components = dir.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => match dirs_next::home_dir() {
            Some(home) => home.join(components.as_path()),
            None => dir.to_path_buf(),
        },
        _ => dir.to_path_buf(),
    }
}

/// Open `log_file` for appending behind a non-blocking writer.
///
/// The guard must outlive the subscriber or buffered lines are lost.
pub fn file_layer<S>(log_file: &Path) -> Result<(FileFmtLayer<S>, WorkerGuard)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    if let Some(directory) = log_file.parent() {
        fs::create_dir_all(directory)
            .with_context(|| format!("failed to create log directory {}", directory.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(file);
    let layer = tracing_fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);
    Ok((layer, guard))
}
