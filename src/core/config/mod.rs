use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;

/// Main Detent configuration loaded from detent.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DetentConfig {
    /// Runner supervisor configuration
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Workflow instrumentation configuration
    #[serde(default)]
    pub injection: InjectionConfig,

    /// Workspace materialization configuration
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

/// Runner supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunnerConfig {
    /// Local CI runner binary
    #[serde(default = "default_runner_binary")]
    pub binary: PathBuf,

    /// Seconds between SIGTERM and SIGKILL on cancellation
    #[serde(default = "default_grace_period_seconds")]
    pub grace_period_seconds: u64,

    /// Triggering event passed to the runner
    #[serde(default = "default_event")]
    pub event: String,

    /// Capacity of the live line channel
    #[serde(default = "default_stream_channel_capacity")]
    pub stream_channel_capacity: usize,

    /// Longest line forwarded to live sinks before it is split
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

/// Workflow instrumentation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InjectionConfig {
    #[serde(default = "default_job_timeout_minutes")]
    pub job_timeout_minutes: u64,

    #[serde(default = "default_step_timeout_minutes")]
    pub step_timeout_minutes: u64,
}

/// Workspace materialization configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceConfig {
    /// Upper bound on files instrumented at once
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,

    /// Workflow directory relative to the repository root
    #[serde(default = "default_workflows_dir")]
    pub workflows_dir: PathBuf,
}

// Default functions
fn default_runner_binary() -> PathBuf {
    PathBuf::from("act")
}

fn default_grace_period_seconds() -> u64 {
    5
}

fn default_event() -> String {
    "push".to_string()
}

fn default_stream_channel_capacity() -> usize {
    256
}

fn default_max_line_bytes() -> usize {
    64 * 1024
}

fn default_job_timeout_minutes() -> u64 {
    crate::core::workflow::injector::DEFAULT_JOB_TIMEOUT_MINUTES
}

fn default_step_timeout_minutes() -> u64 {
    crate::core::workflow::injector::DEFAULT_STEP_TIMEOUT_MINUTES
}

fn default_max_concurrent_files() -> usize {
    10
}

fn default_workflows_dir() -> PathBuf {
    PathBuf::from(".github/workflows")
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            binary: default_runner_binary(),
            grace_period_seconds: default_grace_period_seconds(),
            event: default_event(),
            stream_channel_capacity: default_stream_channel_capacity(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl Default for InjectionConfig {
    fn default() -> Self {
        InjectionConfig {
            job_timeout_minutes: default_job_timeout_minutes(),
            step_timeout_minutes: default_step_timeout_minutes(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        WorkspaceConfig {
            max_concurrent_files: default_max_concurrent_files(),
            workflows_dir: default_workflows_dir(),
        }
    }
}
