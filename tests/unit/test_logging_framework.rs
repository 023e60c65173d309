use clap::Parser;
use detent::cli::Args;
use detent::logging::{config::LoggingConfig, detect_context, layers, ConsoleOutput, ExecutionContext};
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::tempdir;

#[test]
#[serial]
fn context_mapping_follows_quiet_flag() {
    env::remove_var("DETENT_QUIET");
    let cases = vec![
        (vec!["detent", "check", "."], ExecutionContext::LocalDev),
        (vec!["detent", "--quiet", "run", "."], ExecutionContext::Quiet),
        (vec!["detent", "prepare", ".", "-q"], ExecutionContext::Quiet),
        (vec!["detent", "--verbose", "manifest"], ExecutionContext::LocalDev),
    ];

    for (args, expected) in cases {
        let parsed = Args::parse_from(args);
        assert_eq!(detect_context(&parsed), expected);
    }
}

#[test]
#[serial]
fn quiet_env_override_applies_to_every_command() {
    env::set_var("DETENT_QUIET", "1");
    for command in ["check", "manifest", "prepare", "run"] {
        let parsed = Args::parse_from(["detent", command]);
        assert_eq!(detect_context(&parsed), ExecutionContext::Quiet);
    }
    env::remove_var("DETENT_QUIET");
}

#[test]
fn verbose_and_quiet_conflict() {
    assert!(Args::try_parse_from(["detent", "--verbose", "--quiet", "check"]).is_err());
}

#[test]
#[serial]
fn config_default_level_honors_workspace_file() {
    env::remove_var("DETENT_LOG_CONSOLE");
    let workspace = tempdir().unwrap();
    let config_dir = workspace.path().join(".detent/config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("logging.toml"),
        r#"[logging]
default_level = "warn"
console_output = "stdout"
"#,
    )
    .unwrap();

    let config = LoggingConfig::load(Some(workspace.path())).unwrap();
    assert_eq!(config.default_level, "warn");
    assert_eq!(config.console_output, Some(ConsoleOutput::Stdout));
    assert_eq!(config.verbose().default_level, "debug");
}

#[test]
#[serial]
fn console_env_override_wins_over_file() {
    let workspace = tempdir().unwrap();
    let config_dir = workspace.path().join(".detent/config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("logging.toml"),
        "[logging]\nconsole_output = \"stdout\"\n",
    )
    .unwrap();

    env::set_var("DETENT_LOG_CONSOLE", "none");
    let config = LoggingConfig::load(Some(workspace.path())).unwrap();
    env::remove_var("DETENT_LOG_CONSOLE");
    assert_eq!(config.console_output, Some(ConsoleOutput::None));

    env::set_var("DETENT_LOG_CONSOLE", "syslog");
    assert!(LoggingConfig::load(Some(workspace.path())).is_err());
    env::remove_var("DETENT_LOG_CONSOLE");
}

#[test]
#[serial]
fn invalid_level_is_rejected() {
    let workspace = tempdir().unwrap();
    let config_dir = workspace.path().join(".detent/config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("logging.toml"),
        "[logging]\ndefault_level = \"very=loud=please\"\n",
    )
    .unwrap();
    assert!(LoggingConfig::load(Some(workspace.path())).is_err());
}

#[test]
fn file_path_defaults_under_the_repository() {
    let workspace = tempdir().unwrap();
    let log_path = layers::file::log_file_path(&LoggingConfig::default(), workspace.path());
    assert!(log_path.starts_with(workspace.path()));
    assert!(log_path.ends_with(".detent/logs/detent.log"));
}

#[test]
#[serial]
fn env_log_dir_redirects_the_file() {
    let workspace = tempdir().unwrap();
    let elsewhere = tempdir().unwrap();
    env::set_var("DETENT_LOG_DIR", elsewhere.path());
    let config = LoggingConfig::load(Some(workspace.path()));
    env::remove_var("DETENT_LOG_DIR");

    let log_path = layers::file::log_file_path(&config.unwrap(), workspace.path());
    assert_eq!(log_path, elsewhere.path().join("detent.log"));
}
