#![allow(clippy::result_large_err)] // Launch and supervision failures surface as AppError at the CLI boundary.

//! Runner supervisor: launches the local CI runner against a materialized
//! workspace and controls its process group.

pub mod output;
pub mod process;

use crate::core::config::DetentConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use output::{tee_stream, CaptureBuffer, LiveSink, StreamKind};
use process::{supervise, ChildProcess};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

pub use output::LineSplitter;
pub use process::{ProcessError, ProcessExit, ProcessHandle, ShutdownPhase, Supervision};

/// Runner labels pinned to container images.
pub const PLATFORM_IMAGES: &[(&str, &str)] = &[
    ("ubuntu-latest", "catthehacker/ubuntu:act-latest"),
    ("ubuntu-24.04", "catthehacker/ubuntu:act-24.04"),
    ("ubuntu-22.04", "catthehacker/ubuntu:act-22.04"),
];

/// Linux capabilities removed from every job container.
pub const DROPPED_CAPABILITIES: &[&str] = &["SYS_ADMIN", "NET_ADMIN", "SYS_PTRACE", "MKNOD"];

/// Environment variables forwarded to the runner; everything else is dropped.
pub const ENV_ALLOW_LIST: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "TERM",
    "TZ",
    "TMPDIR",
    "DOCKER_HOST",
    "XDG_RUNTIME_DIR",
];

/// Time allowed for output readers to drain after the runner exits.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Parameters for one supervised run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory holding the instrumented workflows.
    pub workflows_path: PathBuf,
    /// Repository the runner executes in.
    pub working_dir: PathBuf,
    pub event: String,
    pub runner_binary: PathBuf,
    pub grace_period: Duration,
    pub max_line_bytes: usize,
    pub sink: LiveSink,
}

impl RunConfig {
    pub fn new(workflows_path: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self::from_config(workflows_path, working_dir, &DetentConfig::default())
    }

    pub fn from_config(
        workflows_path: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        config: &DetentConfig,
    ) -> Self {
        Self {
            workflows_path: workflows_path.into(),
            working_dir: working_dir.into(),
            event: config.runner.event.clone(),
            runner_binary: config.runner.binary.clone(),
            grace_period: Duration::from_secs(config.runner.grace_period_seconds),
            max_line_bytes: config.runner.max_line_bytes,
            sink: LiveSink::none(),
        }
    }

    pub fn with_sink(mut self, sink: LiveSink) -> Self {
        self.sink = sink;
        self
    }
}

/// Captured output and status of a completed run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub stdout: String,
    pub stderr: String,
    /// Runner exit code; non-zero means the workflow failed, not that the run did.
    pub exit_code: i32,
    pub duration: Duration,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Command-line surface of the local runner.
#[derive(Debug, Clone)]
pub struct RunnerArgs {
    workflows_path: PathBuf,
    event: String,
    directory: PathBuf,
}

impl RunnerArgs {
    pub fn new(workflows_path: &Path, event: &str, directory: &Path) -> Self {
        Self {
            workflows_path: workflows_path.to_path_buf(),
            event: event.to_string(),
            directory: directory.to_path_buf(),
        }
    }

    pub fn build(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            self.event.clone().into(),
            "-W".into(),
            self.workflows_path.clone().into_os_string(),
            "--directory".into(),
            self.directory.clone().into_os_string(),
            "-v".into(),
        ];
        for (label, image) in PLATFORM_IMAGES {
            args.push("-P".into());
            args.push(format!("{}={}", label, image).into());
        }
        args.push("--rm".into());
        args.push("--no-cache-server".into());
        for capability in DROPPED_CAPABILITIES {
            args.push("--container-cap-drop".into());
            args.push((*capability).into());
        }
        args
    }
}

/// Keep only allow-listed variables from `vars`.
pub fn filter_env<I>(vars: I) -> Vec<(OsString, OsString)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter(|(key, _)| {
            ENV_ALLOW_LIST
                .iter()
                .any(|allowed| key.as_os_str() == OsStr::new(allowed))
        })
        .collect()
}

fn runner_error(code: &str, message: String) -> AppError {
    AppError::new(ErrorCategory::RunnerError, message).with_code(code)
}

/// Launch the runner and supervise it until it exits or `cancel` fires.
///
/// A non-zero exit is returned as a normal [`RunResult`]. Cancellation
/// returns an error with [`ErrorCategory::Cancelled`].
pub async fn run(cancel: &CancellationToken, config: &RunConfig) -> Result<RunResult, AppError> {
    if cancel.is_cancelled() {
        return Err(AppError::cancelled("run cancelled before the runner started"));
    }

    let args = RunnerArgs::new(&config.workflows_path, &config.event, &config.working_dir).build();
    let mut command = Command::new(&config.runner_binary);
    command
        .args(&args)
        .current_dir(&config.working_dir)
        .env_clear()
        .envs(filter_env(std::env::vars_os()))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    tracing::info!(
        runner = %config.runner_binary.display(),
        event = %config.event,
        workflows = %config.workflows_path.display(),
        "starting runner"
    );
    let started = Instant::now();
    let mut child = command.spawn().map_err(|e| {
        let mut err = runner_error(
            "DET-RUN-001",
            format!(
                "failed to start runner {}: {}",
                config.runner_binary.display(),
                e
            ),
        )
        .with_suggestion("install act or set [runner] binary in detent.toml");
        err.add_context("binary", &config.runner_binary.display().to_string());
        err
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| runner_error("DET-RUN-002", "runner stdout was not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| runner_error("DET-RUN-002", "runner stderr was not captured".to_string()))?;

    let stdout_capture = CaptureBuffer::new();
    let stderr_capture = CaptureBuffer::new();
    let mut readers = tokio::task::JoinSet::new();
    readers.spawn(tee_stream(
        stdout,
        StreamKind::Stdout,
        stdout_capture.clone(),
        config.sink.clone(),
        config.max_line_bytes,
    ));
    readers.spawn(tee_stream(
        stderr,
        StreamKind::Stderr,
        stderr_capture.clone(),
        config.sink.clone(),
        config.max_line_bytes,
    ));

    let mut handle = ChildProcess::new(child)
        .map_err(|e| runner_error("DET-RUN-002", format!("failed to track runner: {}", e)))?;
    let supervision = supervise(&mut handle, cancel, config.grace_period)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorCategory::RunnerError, "runner supervision failed", e)
                .with_code("DET-RUN-003")
        })?;

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while let Some(joined) = readers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!(error = %err, "failed reading runner output"),
                Err(err) => tracing::warn!(error = %err, "runner output reader failed"),
            }
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!("runner output still open after exit; truncating capture");
        readers.abort_all();
    }

    let duration = started.elapsed();
    let exit_code = supervision.exit.exit_code();
    if supervision.cancelled {
        let mut err = AppError::cancelled(format!(
            "run cancelled after {:.1}s",
            duration.as_secs_f64()
        ));
        err.add_context("exit_code", &exit_code.to_string());
        err.add_context("phase", &supervision.final_phase().to_string());
        err.add_context("force_killed", &supervision.force_killed().to_string());
        return Err(err);
    }

    tracing::info!(exit_code, duration_ms = duration.as_millis() as u64, "runner finished");
    Ok(RunResult {
        stdout: stdout_capture.to_string_lossy(),
        stderr: stderr_capture.to_string_lossy(),
        exit_code,
        duration,
    })
}
