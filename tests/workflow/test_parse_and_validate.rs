use detent::core::workflow::discovery::{discover, parse_file, resolve_workflow_file};
use detent::core::workflow::validation::{ToolRegistry, ValidationSeverity, Validator};
use detent::core::workflow::workspace::load_workflows;
use detent::core::ErrorCategory;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn workflows_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        fs::write(dir.path().join(name), content).unwrap();
    }
    dir
}

const CI: &str = r#"
name: CI
on: [push, pull_request]
jobs:
  lint:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - run: golangci-lint run ./...
  test:
    runs-on: ubuntu-22.04
    needs: lint
    steps:
      - run: go test ./...
"#;

#[test]
fn discovery_lists_only_workflow_files_in_order() {
    let dir = workflows_dir(&[
        ("b.yaml", CI),
        ("a.yml", CI),
        ("notes.md", "# not a workflow"),
    ]);
    fs::create_dir(dir.path().join("nested.yml")).unwrap();

    let found = discover(dir.path()).unwrap();
    let names: Vec<_> = found
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.yml", "b.yaml"]);
}

#[test]
fn explicit_file_rejects_traversal_and_absolute_paths() {
    let dir = workflows_dir(&[("ci.yml", CI)]);

    assert!(resolve_workflow_file(dir.path(), Path::new("ci.yml")).is_ok());
    for bad in ["../ci.yml", "/etc/passwd", ".hidden.yml"] {
        let err = resolve_workflow_file(dir.path(), Path::new(bad)).unwrap_err();
        assert_eq!(err.category, ErrorCategory::InputError, "{}", bad);
    }
}

#[test]
fn malformed_yaml_is_an_input_error_naming_the_file() {
    let dir = workflows_dir(&[("broken.yml", "jobs: [unclosed\n")]);
    let err = parse_file(&dir.path().join("broken.yml")).unwrap_err();
    assert_eq!(err.category, ErrorCategory::InputError);
    assert!(err.to_string().contains("broken.yml"));
}

#[test]
fn clean_workflow_has_no_blocking_findings() {
    let dir = workflows_dir(&[("ci.yml", CI)]);
    let loaded = load_workflows(dir.path(), None, ToolRegistry::with_defaults()).unwrap();
    assert_eq!(loaded.workflows.len(), 1);
    assert!(!loaded.findings.has_errors());
}

#[test]
fn blocking_findings_from_every_file_are_reported_together() {
    let dir = workflows_dir(&[
        (
            "mac.yml",
            "on: push\njobs:\n  build:\n    runs-on: macos-latest\n    steps:\n      - run: make\n",
        ),
        (
            "reuse.yml",
            "on: push\njobs:\n  call:\n    uses: octo/repo/.github/workflows/build.yml@main\n",
        ),
    ]);

    let err = load_workflows(dir.path(), None, ToolRegistry::with_defaults()).unwrap_err();
    assert_eq!(err.code, "DET-VAL-001");
    assert!(err.message.contains("macos-latest"));
    assert!(err.message.contains("reusable workflow"));
}

#[test]
fn unsupported_tools_only_warn() {
    let yaml = "on: push\njobs:\n  py:\n    runs-on: ubuntu-latest\n    steps:\n      - run: pytest -q\n";
    let workflow: detent::core::workflow::Workflow = serde_yaml::from_str(yaml).unwrap();
    let findings = Validator::new(ToolRegistry::with_defaults()).validate(&workflow);

    assert!(!findings.has_errors());
    let warning = findings
        .iter()
        .find(|f| f.feature == "tool:pytest")
        .expect("pytest warning");
    assert_eq!(warning.severity, ValidationSeverity::Warning);
    assert_eq!(warning.job.as_deref(), Some("py"));
    assert!(warning.suggestion.contains("golangci-lint"));
}

#[test]
fn single_workflow_selection_limits_validation() {
    let dir = workflows_dir(&[
        ("ci.yml", CI),
        (
            "mac.yml",
            "on: push\njobs:\n  build:\n    runs-on: macos-latest\n    steps:\n      - run: make\n",
        ),
    ]);
    let loaded = load_workflows(
        dir.path(),
        Some(Path::new("ci.yml")),
        ToolRegistry::with_defaults(),
    )
    .unwrap();
    let files: Vec<&PathBuf> = loaded.workflows.keys().collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("ci.yml"));
}
