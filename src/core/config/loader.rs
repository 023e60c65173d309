#![allow(clippy::result_large_err)]

use super::{ConfigValidator, DetentConfig};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "detent.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from workspace root (workspace/detent.toml)
    /// Environment variables override config file values
    pub fn load_from_workspace(workspace_path: &Path) -> Result<DetentConfig, AppError> {
        let config_path = workspace_path.join(CONFIG_FILE_NAME);
        let config_file = Self::load_from_file(&config_path)?;

        let mut config = config_file.unwrap_or_default();
        Self::apply_env_overrides(&mut config);
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load config from specific file path
    /// Returns Ok(None) if file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<DetentConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
            .with_code("DET-CFG-001")
        })?;

        let config: DetentConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("DET-CFG-002")
        })?;

        Ok(Some(config))
    }

    /// Apply environment variable overrides to the configuration
    /// Values that fail to parse are ignored
    fn apply_env_overrides(config: &mut DetentConfig) {
        if let Ok(binary) = env::var("DETENT_RUNNER_BINARY") {
            config.runner.binary = PathBuf::from(binary);
        }

        if let Some(grace) = parsed_var("DETENT_RUNNER_GRACE_PERIOD_SECONDS") {
            config.runner.grace_period_seconds = grace;
        }

        if let Ok(event) = env::var("DETENT_RUNNER_EVENT") {
            config.runner.event = event;
        }

        if let Some(capacity) = parsed_var("DETENT_RUNNER_STREAM_CHANNEL_CAPACITY") {
            config.runner.stream_channel_capacity = capacity;
        }

        if let Some(max_line) = parsed_var("DETENT_RUNNER_MAX_LINE_BYTES") {
            config.runner.max_line_bytes = max_line;
        }

        if let Some(minutes) = parsed_var("DETENT_INJECTION_JOB_TIMEOUT_MINUTES") {
            config.injection.job_timeout_minutes = minutes;
        }

        if let Some(minutes) = parsed_var("DETENT_INJECTION_STEP_TIMEOUT_MINUTES") {
            config.injection.step_timeout_minutes = minutes;
        }

        if let Some(files) = parsed_var("DETENT_WORKSPACE_MAX_CONCURRENT_FILES") {
            config.workspace.max_concurrent_files = files;
        }

        if let Ok(dir) = env::var("DETENT_WORKSPACE_WORKFLOWS_DIR") {
            config.workspace.workflows_dir = PathBuf::from(dir);
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "DETENT_RUNNER_BINARY - Override the local CI runner binary (default: act)",
            "DETENT_RUNNER_GRACE_PERIOD_SECONDS - Override the shutdown grace period (default: 5)",
            "DETENT_RUNNER_EVENT - Override the triggering event (default: push)",
            "DETENT_RUNNER_STREAM_CHANNEL_CAPACITY - Override the live line channel capacity (default: 256)",
            "DETENT_RUNNER_MAX_LINE_BYTES - Override the live line length limit (default: 65536)",
            "DETENT_INJECTION_JOB_TIMEOUT_MINUTES - Override the default job timeout (default: 30)",
            "DETENT_INJECTION_STEP_TIMEOUT_MINUTES - Override the default step timeout (default: 15)",
            "DETENT_WORKSPACE_MAX_CONCURRENT_FILES - Override the instrumentation worker limit (default: 10)",
            "DETENT_WORKSPACE_WORKFLOWS_DIR - Override the workflow directory (default: .github/workflows)",
        ]
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}
