use detent::core::config::{ConfigLoader, DetentConfig};
use detent::core::ErrorCategory;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_detent_env() {
    for v in &[
        "DETENT_RUNNER_BINARY",
        "DETENT_RUNNER_GRACE_PERIOD_SECONDS",
        "DETENT_RUNNER_EVENT",
        "DETENT_RUNNER_STREAM_CHANNEL_CAPACITY",
        "DETENT_RUNNER_MAX_LINE_BYTES",
        "DETENT_INJECTION_JOB_TIMEOUT_MINUTES",
        "DETENT_INJECTION_STEP_TIMEOUT_MINUTES",
        "DETENT_WORKSPACE_MAX_CONCURRENT_FILES",
        "DETENT_WORKSPACE_WORKFLOWS_DIR",
    ] {
        env::remove_var(v);
    }
}

/// File values apply, env values win over them
#[test]
#[serial]
fn test_config_loading_integration() {
    clear_detent_env();
    let temp_dir = TempDir::new().unwrap();
    let workspace_path = temp_dir.path();

    let config_content = r#"
[runner]
binary = "/opt/act/bin/act"
grace_period_seconds = 12
event = "pull_request"

[injection]
job_timeout_minutes = 45

[workspace]
max_concurrent_files = 4
workflows_dir = "ci/workflows"
"#;
    fs::write(workspace_path.join("detent.toml"), config_content).unwrap();

    let config = ConfigLoader::load_from_workspace(workspace_path).unwrap();
    assert_eq!(config.runner.binary, PathBuf::from("/opt/act/bin/act"));
    assert_eq!(config.runner.grace_period_seconds, 12);
    assert_eq!(config.runner.event, "pull_request");
    assert_eq!(config.runner.max_line_bytes, 64 * 1024);
    assert_eq!(config.injection.job_timeout_minutes, 45);
    assert_eq!(config.injection.step_timeout_minutes, 15);
    assert_eq!(config.workspace.max_concurrent_files, 4);
    assert_eq!(config.workspace.workflows_dir, PathBuf::from("ci/workflows"));

    env::set_var("DETENT_RUNNER_EVENT", "workflow_dispatch");
    env::set_var("DETENT_INJECTION_STEP_TIMEOUT_MINUTES", "5");
    let config = ConfigLoader::load_from_workspace(workspace_path).unwrap();
    assert_eq!(config.runner.event, "workflow_dispatch");
    assert_eq!(config.injection.step_timeout_minutes, 5);
    assert_eq!(config.runner.grace_period_seconds, 12);
    clear_detent_env();
}

#[test]
#[serial]
fn test_missing_file_yields_defaults() {
    clear_detent_env();
    let temp_dir = TempDir::new().unwrap();
    let config = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap();
    assert_eq!(config, DetentConfig::default());
    assert_eq!(config.workspace.workflows_dir, PathBuf::from(".github/workflows"));
}

#[test]
#[serial]
fn test_env_override_is_validated() {
    clear_detent_env();
    let temp_dir = TempDir::new().unwrap();
    env::set_var("DETENT_WORKSPACE_MAX_CONCURRENT_FILES", "0");
    let err = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap_err();
    clear_detent_env();

    assert_eq!(err.category, ErrorCategory::ConfigError);
    assert_eq!(err.code, "DET-CFG-003");
    assert!(err.message.contains("workspace.max_concurrent_files"));
}

#[test]
#[serial]
fn test_unparseable_file_is_a_config_error() {
    clear_detent_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("detent.toml"), "[runner\nbinary = 3").unwrap();
    let err = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap_err();
    assert_eq!(err.code, "DET-CFG-002");
}
