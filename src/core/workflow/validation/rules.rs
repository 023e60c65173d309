use super::{ToolRegistry, ValidationError, ValidationRule};
use crate::core::workflow::schema::{Container, Job, RunsOn, Step, Workflow};
use regex::Regex;
use serde_yaml::Value;
use std::sync::OnceLock;

/// Runner labels that map onto a local Linux container image.
pub const SUPPORTED_RUNNER_LABELS: &[&str] = &[
    "ubuntu-latest",
    "ubuntu-24.04",
    "ubuntu-22.04",
    "ubuntu-20.04",
];

const OIDC_VARIABLES: &[&str] = &[
    "ACTIONS_ID_TOKEN_REQUEST_TOKEN",
    "ACTIONS_ID_TOKEN_REQUEST_URL",
];

const REUSABLE_WORKFLOW_PATH: &str = ".github/workflows/";

pub fn built_in_rules(tools: ToolRegistry) -> Vec<Box<dyn ValidationRule>> {
    vec![
        Box::new(CallableTriggerRule),
        Box::new(RunnerLabelRule),
        Box::new(ReusableWorkflowRule),
        Box::new(ServicesRule),
        Box::new(EnvironmentRule),
        Box::new(ContainerRule),
        Box::new(DynamicMatrixRule),
        Box::new(OidcTokenRule),
        Box::new(ToolSupportRule { tools }),
    ]
}

fn value_mentions(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(text) => text.contains(needle),
        Value::Sequence(items) => items.iter().any(|item| value_mentions(item, needle)),
        Value::Mapping(map) => map
            .iter()
            .any(|(key, value)| value_mentions(key, needle) || value_mentions(value, needle)),
        Value::Tagged(tagged) => value_mentions(&tagged.value, needle),
        _ => false,
    }
}

struct CallableTriggerRule;

impl ValidationRule for CallableTriggerRule {
    fn check_workflow(&self, workflow: &Workflow) -> Vec<ValidationError> {
        let callable = match &workflow.on {
            Some(Value::String(event)) => event == "workflow_call",
            Some(Value::Sequence(events)) => events
                .iter()
                .any(|event| event.as_str() == Some("workflow_call")),
            Some(Value::Mapping(events)) => events.contains_key("workflow_call"),
            _ => false,
        };
        if !callable {
            return Vec::new();
        }
        vec![ValidationError::error(
            "workflow_call",
            "workflow is triggered by workflow_call and can only run when called by another workflow",
            "run the calling workflow instead, or add a push trigger for local runs",
        )]
    }
}

fn large_runner_suffix() -> &'static Regex {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    SUFFIX.get_or_init(|| {
        Regex::new(r"(?i)-(\d+-?cores?|xl|xlarge|large|gpu|arm(64)?)$").expect("valid regex")
    })
}

struct RunnerLabelRule;

impl RunnerLabelRule {
    fn check_label(label: &str) -> Option<ValidationError> {
        let trimmed = label.trim();
        if SUPPORTED_RUNNER_LABELS.contains(&trimmed) {
            return None;
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.contains("${{") {
            return Some(ValidationError::warning(
                "runs-on",
                format!("runner label '{}' is an expression and cannot be checked", trimmed),
                "make sure it resolves to ubuntu-latest, ubuntu-24.04 or ubuntu-22.04",
            ));
        }
        let blocking = if lower.starts_with("macos") {
            Some("macOS runners cannot run in a local Linux container")
        } else if lower.starts_with("windows") {
            Some("Windows runners cannot run in a local Linux container")
        } else if lower == "self-hosted" {
            Some("self-hosted runners are not available locally")
        } else if large_runner_suffix().is_match(&lower) {
            Some("larger GitHub-hosted runner sizes have no local equivalent")
        } else {
            None
        };
        match blocking {
            Some(reason) => Some(ValidationError::error(
                "runs-on",
                format!("runner label '{}' is unsupported: {}", trimmed, reason),
                "use runs-on: ubuntu-latest for local execution",
            )),
            None => Some(ValidationError::warning(
                "runs-on",
                format!(
                    "runner label '{}' is not a known Linux label and will fall back to the default image",
                    trimmed
                ),
                "use ubuntu-latest, ubuntu-24.04 or ubuntu-22.04",
            )),
        }
    }
}

impl ValidationRule for RunnerLabelRule {
    fn check_job(&self, _job_id: &str, job: &Job) -> Vec<ValidationError> {
        if job.is_reusable() {
            return Vec::new();
        }
        let Some(runs_on) = &job.runs_on else {
            return vec![ValidationError::warning(
                "runs-on",
                "job does not declare runs-on",
                "add runs-on: ubuntu-latest",
            )];
        };

        let mut out = Vec::new();
        if let RunsOn::Group(_) = runs_on {
            let group = runs_on.group().unwrap_or("<unnamed>");
            out.push(ValidationError::error(
                "runs-on",
                format!("runner group '{}' is not available locally", group),
                "replace the runner group with runs-on: ubuntu-latest",
            ));
        }
        out.extend(runs_on.labels().iter().filter_map(|label| Self::check_label(label)));
        out
    }
}

fn is_reusable_reference(uses: &str) -> bool {
    uses.contains(REUSABLE_WORKFLOW_PATH)
}

struct ReusableWorkflowRule;

impl ValidationRule for ReusableWorkflowRule {
    fn check_job(&self, _job_id: &str, job: &Job) -> Vec<ValidationError> {
        let mut out = Vec::new();
        if let Some(uses) = job.uses.as_deref().filter(|uses| is_reusable_reference(uses)) {
            out.push(ValidationError::error(
                "reusable-workflow",
                format!("job calls reusable workflow '{}'", uses),
                "inline the called workflow's jobs to run them locally",
            ));
        }
        for (index, step) in job.steps.iter().enumerate() {
            if let Some(uses) = step.uses.as_deref().filter(|uses| is_reusable_reference(uses)) {
                out.push(
                    ValidationError::error(
                        "reusable-workflow",
                        format!("step references reusable workflow '{}'", uses),
                        "reusable workflows are called from jobs, not steps; inline the steps",
                    )
                    .at_step(index),
                );
            }
        }
        out
    }
}

struct ServicesRule;

impl ValidationRule for ServicesRule {
    fn check_job(&self, _job_id: &str, job: &Job) -> Vec<ValidationError> {
        match &job.services {
            Some(services) if !services.is_empty() => {
                let names: Vec<&str> = services.keys().map(String::as_str).collect();
                vec![ValidationError::warning(
                    "services",
                    format!(
                        "service containers ({}) run with reduced fidelity locally",
                        names.join(", ")
                    ),
                    "expect networking and health-check differences from GitHub-hosted runs",
                )]
            }
            _ => Vec::new(),
        }
    }
}

struct EnvironmentRule;

impl ValidationRule for EnvironmentRule {
    fn check_job(&self, _job_id: &str, job: &Job) -> Vec<ValidationError> {
        let name = match &job.environment {
            None | Some(Value::Null) => return Vec::new(),
            Some(Value::String(name)) => name.clone(),
            Some(Value::Mapping(map)) => map
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("<unnamed>")
                .to_string(),
            Some(_) => "<unnamed>".to_string(),
        };
        vec![ValidationError::warning(
            "environment",
            format!(
                "deployment environment '{}' is referenced; its secrets and protection rules are unavailable locally",
                name
            ),
            "provide required secrets through the runner's secret file",
        )]
    }
}

fn requests_host_network(options: &str) -> bool {
    let tokens: Vec<&str> = options.split_whitespace().collect();
    tokens.iter().enumerate().any(|(index, token)| {
        matches!(*token, "--network=host" | "--net=host")
            || (matches!(*token, "--network" | "--net")
                && tokens.get(index + 1).is_some_and(|next| *next == "host"))
    })
}

struct ContainerRule;

impl ValidationRule for ContainerRule {
    fn check_job(&self, _job_id: &str, job: &Job) -> Vec<ValidationError> {
        let Some(Container::Spec(spec)) = &job.container else {
            return Vec::new();
        };
        let mut out = Vec::new();
        if spec.credentials.is_some() {
            out.push(ValidationError::warning(
                "container.credentials",
                "container registry credentials depend on secrets that may be missing locally",
                "log in to the registry with docker login before running",
            ));
        }
        if spec.volumes.as_ref().is_some_and(|volumes| !volumes.is_empty()) {
            out.push(ValidationError::warning(
                "container.volumes",
                "container volumes are mounted from the local Docker host",
                "check that the mounted paths exist on this machine",
            ));
        }
        if let Some(options) = spec.options.as_deref() {
            if requests_host_network(options) {
                out.push(ValidationError::error(
                    "container.options",
                    "container requests host networking, which would expose the local host network",
                    "remove --network host from container options",
                ));
            }
            if options.split_whitespace().any(|token| token == "--privileged") {
                out.push(ValidationError::warning(
                    "container.options",
                    "container runs in privileged mode",
                    "drop --privileged unless the job genuinely needs it",
                ));
            }
        }
        out
    }
}

struct DynamicMatrixRule;

impl ValidationRule for DynamicMatrixRule {
    fn check_job(&self, _job_id: &str, job: &Job) -> Vec<ValidationError> {
        let dynamic = job
            .strategy
            .as_ref()
            .and_then(|strategy| strategy.matrix.as_ref())
            .is_some_and(|matrix| {
                value_mentions(matrix, "fromJSON")
                    || value_mentions(matrix, "fromJson")
                    || value_mentions(matrix, "fromjson")
            });
        if !dynamic {
            return Vec::new();
        }
        vec![ValidationError::warning(
            "strategy.matrix",
            "matrix is computed with fromJSON and cannot be verified before the run",
            "ensure the upstream job producing the matrix runs locally too",
        )]
    }
}

struct OidcTokenRule;

impl OidcTokenRule {
    fn mentions_oidc(step: &Step) -> bool {
        OIDC_VARIABLES.iter().any(|variable| {
            step.run.as_deref().is_some_and(|run| run.contains(variable))
                || step
                    .env
                    .as_ref()
                    .is_some_and(|env| env.values().any(|value| value_mentions(value, variable)))
                || step
                    .with
                    .as_ref()
                    .is_some_and(|with| with.values().any(|value| value_mentions(value, variable)))
        })
    }
}

impl ValidationRule for OidcTokenRule {
    fn check_job(&self, _job_id: &str, job: &Job) -> Vec<ValidationError> {
        job.steps
            .iter()
            .enumerate()
            .filter(|(_, step)| Self::mentions_oidc(step))
            .map(|(index, _)| {
                ValidationError::error(
                    "oidc",
                    "step requests a GitHub OIDC token, which is not available locally",
                    "use static cloud credentials for local runs",
                )
                .at_step(index)
            })
            .collect()
    }
}

struct ToolSupportRule {
    tools: ToolRegistry,
}

impl ValidationRule for ToolSupportRule {
    fn check_job(&self, _job_id: &str, job: &Job) -> Vec<ValidationError> {
        let mut out = Vec::new();
        for (index, step) in job.steps.iter().enumerate() {
            let Some(run) = step.run.as_deref() else {
                continue;
            };
            for tool in self.tools.detect(run) {
                if tool.supported {
                    continue;
                }
                out.push(
                    ValidationError::warning(
                        format!("tool:{}", tool.id),
                        format!(
                            "{} output is not parsed into structured errors",
                            tool.display_name
                        ),
                        format!(
                            "supported tools: {}",
                            self.tools.supported_tools().join(", ")
                        ),
                    )
                    .at_step(index),
                );
            }
        }
        out
    }
}
