use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CI: &str = r#"
on: push
jobs:
  lint:
    runs-on: ubuntu-latest
    steps:
      - run: golangci-lint run
  test:
    runs-on: ubuntu-latest
    needs: lint
    steps:
      - run: go test ./...
"#;

fn repo(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let workflows = dir.path().join(".github/workflows");
    fs::create_dir_all(&workflows).unwrap();
    for (name, content) in files {
        fs::write(workflows.join(name), content).unwrap();
    }
    dir
}

fn detent(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("detent").unwrap();
    cmd.arg("--quiet").current_dir(dir);
    cmd
}

#[test]
fn help_lists_workflow_commands() {
    let mut cmd = Command::cargo_bin("detent").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("WORKFLOW COMMANDS"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("manifest"))
        .stdout(predicate::str::contains("prepare"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn run_help_shows_example() {
    let mut cmd = Command::cargo_bin("detent").unwrap();
    cmd.arg("run").arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("detent run . --event pull_request --stream"));
}

#[test]
fn version_matches_package() {
    let mut cmd = Command::cargo_bin("detent").unwrap();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn check_passes_clean_workflows() {
    let repo = repo(&[("ci.yml", CI)]);
    detent(repo.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Checked 1 workflow file(s): 0 error(s)"));
}

#[test]
fn check_fails_on_blocking_findings_as_json() {
    let repo = repo(&[
        ("ci.yml", CI),
        (
            "mac.yml",
            "on: push\njobs:\n  build:\n    runs-on: windows-latest\n    steps:\n      - run: msbuild\n",
        ),
    ]);
    let output = detent(repo.path())
        .args(["check", "--format", "json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(report["errors"].as_u64().unwrap() >= 1);
    assert!(report["findings"]
        .as_array()
        .unwrap()
        .iter()
        .any(|f| f["severity"] == "error" && f["job"] == "build"));
}

#[test]
fn check_without_workflows_reports_an_error() {
    let repo = repo(&[]);
    detent(repo.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DET-WS-001"));
}

#[test]
fn manifest_prints_dependency_order() {
    let repo = repo(&[("ci.yml", CI)]);
    let output = detent(repo.path()).arg("manifest").output().unwrap();
    assert!(output.status.success());

    let manifest: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let ids: Vec<_> = manifest["jobs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|job| job["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["lint", "test"]);
}

#[test]
fn prepare_keep_leaves_instrumented_files() {
    let repo = repo(&[("ci.yml", CI)]);
    let output = detent(repo.path()).args(["prepare", "--keep"]).output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let kept = Path::new(stdout.lines().last().unwrap().trim());
    let written = fs::read_to_string(kept.join("ci.yml")).unwrap();
    assert!(written.contains("::detent::job-start::lint"));
    fs::remove_dir_all(kept).unwrap();
}

#[test]
fn prepare_honours_workflows_dir_from_config() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("ci/flows")).unwrap();
    fs::write(dir.path().join("ci/flows/ci.yml"), CI).unwrap();
    fs::write(
        dir.path().join("detent.toml"),
        "[workspace]\nworkflows_dir = \"ci/flows\"\n",
    )
    .unwrap();

    detent(dir.path())
        .arg("prepare")
        .assert()
        .success()
        .stdout(predicate::str::contains("Instrumented 1 workflow file(s)"));
}

#[cfg(unix)]
#[test]
#[serial]
fn run_exits_with_the_runner_exit_code() {
    use std::os::unix::fs::PermissionsExt;

    let repo = repo(&[("ci.yml", CI)]);
    let runner = repo.path().join("fake-act");
    fs::write(
        &runner,
        "#!/bin/sh\necho '::detent::job-start::lint'\necho \"ran $1\"\nexit 2\n",
    )
    .unwrap();
    fs::set_permissions(&runner, fs::Permissions::from_mode(0o755)).unwrap();

    detent(repo.path())
        .arg("run")
        .arg("--runner")
        .arg(&runner)
        .args(["--event", "workflow_dispatch"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("ran workflow_dispatch"))
        .stderr(predicate::str::contains("failed with exit code 2"))
        .stderr(predicate::str::contains("1 job(s) started"));
}
