#![allow(clippy::result_large_err)]

use super::DetentConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration rules
    pub fn validate(config: &DetentConfig) -> Result<(), AppError> {
        let positive = [
            ("runner.grace_period_seconds", config.runner.grace_period_seconds),
            (
                "runner.stream_channel_capacity",
                config.runner.stream_channel_capacity as u64,
            ),
            ("runner.max_line_bytes", config.runner.max_line_bytes as u64),
            (
                "injection.job_timeout_minutes",
                config.injection.job_timeout_minutes,
            ),
            (
                "injection.step_timeout_minutes",
                config.injection.step_timeout_minutes,
            ),
            (
                "workspace.max_concurrent_files",
                config.workspace.max_concurrent_files as u64,
            ),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(invalid(format!("{} must be greater than zero", key)));
            }
        }

        if config.runner.binary.as_os_str().is_empty() {
            return Err(invalid("runner.binary cannot be empty".to_string()));
        }

        if config.runner.event.trim().is_empty() {
            return Err(invalid("runner.event cannot be empty".to_string()));
        }

        if config.workspace.workflows_dir.is_absolute() {
            return Err(invalid(
                "workspace.workflows_dir must be relative to the repository".to_string(),
            ));
        }

        Ok(())
    }
}

fn invalid(message: String) -> AppError {
    AppError::new(ErrorCategory::ConfigError, message).with_code("DET-CFG-003")
}
