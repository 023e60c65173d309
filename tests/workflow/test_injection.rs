use base64::Engine;
use detent::core::workflow::injector::{Injector, ManifestPlacement};
use detent::core::workflow::manifest::{build_manifest, CycleWarnings};
use detent::core::workflow::markers::{is_marker_step, MARKER_PREFIX};
use detent::core::workflow::schema::{Condition, ContinueOnError, TimeoutMinutes, Workflow};

const PIPELINE: &str = r#"
name: Pipeline
on: push
env:
  GOFLAGS: -mod=mod
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - name: Compile
        run: go build ./...
        timeout-minutes: 3
  test:
    runs-on: ubuntu-latest
    needs: build
    if: github.event_name == 'push'
    steps:
      - run: go test ./...
  deploy:
    runs-on: ubuntu-latest
    needs: [build, test]
    steps:
      - run: npm publish
  docs:
    uses: octo/docs/.github/workflows/site.yml@v1
    needs: build
"#;

fn instrumented() -> Workflow {
    let mut workflow: Workflow = serde_yaml::from_str(PIPELINE).unwrap();
    let manifest = build_manifest(&workflow, &CycleWarnings::new());
    let json = manifest.to_json().unwrap();
    Injector::default().instrument(
        &mut workflow,
        Some(&ManifestPlacement {
            job_id: "build",
            manifest_json: &json,
        }),
    );
    workflow
}

fn step_runs(workflow: &Workflow, job: &str) -> Vec<String> {
    workflow.jobs[job]
        .steps
        .iter()
        .map(|step| step.run.clone().or_else(|| step.uses.clone()).unwrap_or_default())
        .collect()
}

#[test]
fn markers_wrap_every_original_step() {
    let workflow = instrumented();
    let runs = step_runs(&workflow, "build");

    assert!(runs[0].starts_with("echo '::detent::manifest::v2::b64::"));
    assert_eq!(runs[1], "echo '::detent::job-start::build'");
    assert_eq!(runs[2], "echo '::detent::step-start::build::0::checkout'");
    assert_eq!(runs[3], "actions/checkout@v4");
    assert_eq!(runs[4], "echo '::detent::step-start::build::1::Compile'");
    assert_eq!(runs[5], "go build ./...");
    assert_eq!(runs[6], "echo '::detent::job-end::build::${{ job.status }}'");
    assert_eq!(runs.len(), 7);

    let end = workflow.jobs["build"].steps.last().unwrap();
    assert_eq!(end.condition, Some(Condition::Expr("always()".to_string())));
}

#[test]
fn manifest_marker_decodes_to_ordered_jobs() {
    let workflow = instrumented();
    let run = workflow.jobs["build"].steps[0].run.clone().unwrap();
    let encoded = run
        .trim_start_matches("echo '::detent::manifest::v2::b64::")
        .trim_end_matches('\'');
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .unwrap();
    let manifest: serde_json::Value = serde_json::from_slice(&decoded).unwrap();

    assert_eq!(manifest["v"], 2);
    let ids: Vec<_> = manifest["jobs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|job| job["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["build", "docs", "test", "deploy"]);
    assert_eq!(manifest["jobs"][1]["uses"], "octo/docs/.github/workflows/site.yml@v1");
    assert!(manifest["jobs"][1].get("steps").is_none());
}

#[test]
fn only_the_designated_job_emits_the_manifest() {
    let workflow = instrumented();
    let manifest_steps = workflow
        .jobs
        .values()
        .flat_map(|job| &job.steps)
        .filter(|step| {
            step.run
                .as_deref()
                .is_some_and(|run| run.contains(&format!("{MARKER_PREFIX}manifest::")))
        })
        .count();
    assert_eq!(manifest_steps, 1);
}

#[test]
fn failures_are_contained_and_timeouts_filled() {
    let workflow = instrumented();
    for (id, job) in &workflow.jobs {
        assert_eq!(
            job.continue_on_error,
            Some(ContinueOnError::Bool(true)),
            "job {}",
            id
        );
        assert!(job.timeout_minutes.is_some());
    }

    let build = &workflow.jobs["build"];
    assert_eq!(build.timeout_minutes, Some(TimeoutMinutes::Minutes(30)));
    let compile = build
        .steps
        .iter()
        .find(|step| step.name.as_deref() == Some("Compile"))
        .unwrap();
    assert_eq!(compile.timeout_minutes, Some(TimeoutMinutes::Minutes(3)));
    assert!(compile.continue_on_error.is_none());
    assert!(build
        .steps
        .iter()
        .filter(|step| is_marker_step(step))
        .all(|step| step.timeout_minutes == Some(TimeoutMinutes::Minutes(15))));
}

#[test]
fn dependents_are_guarded_unless_sensitive() {
    let workflow = instrumented();

    assert_eq!(
        workflow.jobs["test"].condition,
        Some(Condition::Expr(
            "always() && (github.event_name == 'push')".to_string()
        ))
    );
    assert_eq!(workflow.jobs["deploy"].condition, None);
    assert_eq!(workflow.jobs["build"].condition, None);
    assert_eq!(workflow.jobs["docs"].condition, None);
}

#[test]
fn reusable_jobs_keep_their_shape() {
    let workflow = instrumented();
    let docs = &workflow.jobs["docs"];
    assert!(docs.steps.is_empty());
    assert_eq!(docs.uses.as_deref(), Some("octo/docs/.github/workflows/site.yml@v1"));
}

#[test]
fn rewritten_yaml_keeps_unmodelled_keys() {
    let workflow = instrumented();
    let yaml = serde_yaml::to_string(&workflow).unwrap();
    let reparsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

    assert_eq!(reparsed["name"], "Pipeline");
    assert_eq!(reparsed["env"]["GOFLAGS"], "-mod=mod");
    assert_eq!(reparsed["jobs"]["test"]["needs"], "build");
    assert_eq!(reparsed["jobs"]["build"]["continue-on-error"], true);
}
