#![cfg(unix)]

use detent::core::runner::{output::LiveSink, run, RunConfig};
use detent::core::ErrorCategory;
use serial_test::serial;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn fake_runner(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-act");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn config(dir: &TempDir, body: &str) -> RunConfig {
    let mut config = RunConfig::new(dir.path().join("workflows"), dir.path());
    config.runner_binary = fake_runner(dir.path(), body);
    config.grace_period = Duration::from_millis(300);
    config
}

#[tokio::test]
#[serial]
async fn captures_both_streams_and_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(
        &dir,
        "echo \"::detent::job-start::build\"\necho \"event=$1 flag=$2\"\necho 'docker pull failed' >&2\nexit 3",
    );

    let result = run(&CancellationToken::new(), &config).await.unwrap();

    assert_eq!(result.exit_code, 3);
    assert!(!result.success());
    assert_eq!(result.stdout, "::detent::job-start::build\nevent=push flag=-W\n");
    assert_eq!(result.stderr, "docker pull failed\n");
}

#[tokio::test]
#[serial]
async fn runner_sees_only_allow_listed_environment() {
    std::env::set_var("DETENT_TEST_SECRET", "hunter2");
    let dir = tempfile::tempdir().unwrap();
    let config = config(
        &dir,
        "echo \"secret=${DETENT_TEST_SECRET:-unset}\"\necho \"path=${PATH:+set}\"",
    );

    let result = run(&CancellationToken::new(), &config).await.unwrap();
    std::env::remove_var("DETENT_TEST_SECRET");

    assert!(result.success());
    assert!(result.stdout.contains("secret=unset"));
    assert!(result.stdout.contains("path=set"));
}

#[tokio::test]
#[serial]
async fn live_lines_reach_the_channel() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = mpsc::channel(16);
    let config = config(&dir, "printf 'one\\ntwo\\n'\nprintf 'partial'").with_sink(LiveSink::none().with_channel(tx));

    let result = run(&CancellationToken::new(), &config).await.unwrap();
    drop(config);

    let mut lines = Vec::new();
    while let Some(line) = rx.recv().await {
        lines.push(line);
    }
    assert_eq!(lines, vec!["one", "two", "partial"]);
    assert_eq!(result.stdout, "one\ntwo\npartial");
}

#[tokio::test]
#[serial]
async fn cancellation_terminates_the_process_group() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, "sleep 30 &\nwait");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = run(&cancel, &config).await.unwrap_err();

    assert_eq!(err.category, ErrorCategory::Cancelled);
    assert_eq!(err.context.get("force_killed").map(String::as_str), Some("false"));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
#[serial]
async fn ignored_terminate_escalates_to_kill() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, "trap '' TERM\nsleep 30 &\nwait");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = run(&cancel, &config).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.context.get("force_killed").map(String::as_str), Some("true"));
    assert!(started.elapsed() < Duration::from_secs(10));
}
