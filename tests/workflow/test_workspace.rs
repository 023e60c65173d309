use detent::core::workflow::markers::MANIFEST_STEP_NAME;
use detent::core::workflow::workspace::{prepare, PrepareOptions};
use detent::core::workflow::Workflow;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CI: &str = r#"
on: push
jobs:
  test:
    runs-on: ubuntu-latest
    needs: lint
    steps:
      - run: cargo test
  lint:
    runs-on: ubuntu-latest
    steps:
      - run: cargo clippy -- -D warnings
"#;

const RELEASE: &str = r#"
on:
  push:
    tags: ["v*"]
jobs:
  release:
    runs-on: ubuntu-latest
    steps:
      - run: cargo publish
"#;

fn repo() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ci.yml"), CI).unwrap();
    fs::write(dir.path().join("release.yml"), RELEASE).unwrap();
    dir
}

fn read_workflow(path: &Path) -> Workflow {
    serde_yaml::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn combined_manifest_spans_all_files() {
    let source = repo();
    let prepared = prepare(source.path(), &PrepareOptions::default()).await.unwrap();

    insta::assert_debug_snapshot!(prepared.manifest.job_ids(), @r###"
    [
        "lint",
        "release",
        "test",
    ]
    "###);
    let (file, job) = prepared.manifest_job.clone().unwrap();
    assert!(file.ends_with("ci.yml"));
    assert_eq!(job, "lint");
    prepared.cleanup().unwrap();
}

#[tokio::test]
async fn every_file_is_written_with_markers() {
    let source = repo();
    let prepared = prepare(source.path(), &PrepareOptions::default()).await.unwrap();

    let names: Vec<String> = prepared
        .files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["ci.yml", "release.yml"]);
    for file in &prepared.files {
        assert!(file.starts_with(prepared.path()));
    }

    let ci = read_workflow(&prepared.path().join("ci.yml"));
    let lint_steps: Vec<_> = ci.jobs["lint"]
        .steps
        .iter()
        .filter_map(|s| s.name.clone())
        .collect();
    assert_eq!(lint_steps[0], MANIFEST_STEP_NAME);
    assert!(ci.jobs["test"]
        .steps
        .iter()
        .all(|s| s.name.as_deref() != Some(MANIFEST_STEP_NAME)));

    let release = read_workflow(&prepared.path().join("release.yml"));
    assert!(release.jobs["release"]
        .steps
        .iter()
        .all(|s| s.name.as_deref() != Some(MANIFEST_STEP_NAME)));

    // Sources are never modified.
    assert_eq!(fs::read_to_string(source.path().join("ci.yml")).unwrap(), CI);
    prepared.cleanup().unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn workspace_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let source = repo();
    let prepared = prepare(source.path(), &PrepareOptions::default()).await.unwrap();
    let dir_mode = fs::metadata(prepared.path()).unwrap().permissions().mode() & 0o777;
    assert_eq!(dir_mode, 0o700);
    for file in &prepared.files {
        let mode = fs::metadata(file).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
    prepared.cleanup().unwrap();
}

#[tokio::test]
async fn cleanup_and_drop_remove_the_directory() {
    let source = repo();

    let prepared = prepare(source.path(), &PrepareOptions::default()).await.unwrap();
    let path = prepared.path().to_path_buf();
    prepared.cleanup().unwrap();
    assert!(!path.exists());

    let prepared = prepare(source.path(), &PrepareOptions::default()).await.unwrap();
    let path = prepared.path().to_path_buf();
    drop(prepared);
    assert!(!path.exists());
}

#[tokio::test]
async fn keep_leaves_the_directory_behind() {
    let source = repo();
    let prepared = prepare(source.path(), &PrepareOptions::default()).await.unwrap();
    let kept: PathBuf = prepared.keep();
    assert!(kept.join("ci.yml").exists());
    fs::remove_dir_all(kept).unwrap();
}

#[tokio::test]
async fn single_worker_still_writes_everything() {
    let source = repo();
    let options = PrepareOptions {
        max_concurrent_files: 1,
        ..PrepareOptions::default()
    };
    let prepared = prepare(source.path(), &options).await.unwrap();
    assert_eq!(prepared.files.len(), 2);
    prepared.cleanup().unwrap();
}

#[tokio::test]
async fn blocking_findings_write_nothing() {
    let source = repo();
    fs::write(
        source.path().join("mac.yml"),
        "on: push\njobs:\n  build:\n    runs-on: macos-14\n    steps:\n      - run: make\n",
    )
    .unwrap();

    let err = prepare(source.path(), &PrepareOptions::default()).await.unwrap_err();
    assert_eq!(err.code, "DET-VAL-001");
}

#[tokio::test]
async fn explicit_workflow_limits_the_workspace() {
    let source = repo();
    let options = PrepareOptions::default().with_workflow(Some(PathBuf::from("release.yml")));
    let prepared = prepare(source.path(), &options).await.unwrap();

    assert_eq!(prepared.files.len(), 1);
    assert_eq!(prepared.manifest.job_ids(), vec!["release"]);
    prepared.cleanup().unwrap();
}
