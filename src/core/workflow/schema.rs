//! In-memory model of a GitHub Actions workflow file.
//!
//! Only the keys the engine inspects or rewrites are modelled explicitly. Every
//! other key is carried through `extra` so a rewritten file keeps the original
//! schema.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Root document for a workflow file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Workflow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "on", default, skip_serializing_if = "Option::is_none")]
    pub on: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<IndexMap<String, Value>>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
    #[serde(default)]
    pub jobs: IndexMap<String, Job>,
}

impl Workflow {
    /// Job IDs in lexicographic order.
    pub fn sorted_job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.jobs.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// One entry of the `jobs` mapping.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Job {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "runs-on", default, skip_serializing_if = "Option::is_none")]
    pub runs_on: Option<RunsOn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs: Option<Needs>,
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<IndexMap<String, Value>>,
    /// Reusable-workflow reference. Jobs carrying one have no steps of their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,
    #[serde(
        rename = "continue-on-error",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub continue_on_error: Option<ContinueOnError>,
    #[serde(
        rename = "timeout-minutes",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_minutes: Option<TimeoutMinutes>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
}

impl Job {
    /// Normalized `needs` list, empty when absent.
    pub fn needs(&self) -> Vec<String> {
        self.needs.as_ref().map(Needs::ids).unwrap_or_default()
    }

    pub fn is_reusable(&self) -> bool {
        self.uses.is_some()
    }

    pub fn display_name(&self, id: &str) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => id.to_string(),
        }
    }
}

/// One entry of a job's `steps` sequence.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<IndexMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<IndexMap<String, Value>>,
    #[serde(
        rename = "continue-on-error",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub continue_on_error: Option<ContinueOnError>,
    #[serde(
        rename = "timeout-minutes",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_minutes: Option<TimeoutMinutes>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl Step {
    /// Shell step with a name and a `run` body.
    pub fn shell(name: impl Into<String>, run: impl Into<String>) -> Self {
        Step {
            name: Some(name.into()),
            run: Some(run.into()),
            ..Step::default()
        }
    }
}

/// `runs-on`: a single label, a label list, or a runner-group object.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RunsOn {
    Label(String),
    Labels(Vec<String>),
    Group(RunnerGroup),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunnerGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<LabelSet>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LabelSet {
    One(String),
    Many(Vec<String>),
}

impl LabelSet {
    fn to_vec(&self) -> Vec<String> {
        match self {
            LabelSet::One(label) => vec![label.clone()],
            LabelSet::Many(labels) => labels.clone(),
        }
    }
}

impl RunsOn {
    /// Every label requested, regardless of the declared shape.
    pub fn labels(&self) -> Vec<String> {
        match self {
            RunsOn::Label(label) => vec![label.clone()],
            RunsOn::Labels(labels) => labels.clone(),
            RunsOn::Group(group) => group.labels.as_ref().map(LabelSet::to_vec).unwrap_or_default(),
        }
    }

    pub fn group(&self) -> Option<&str> {
        match self {
            RunsOn::Group(group) => group.group.as_deref(),
            _ => None,
        }
    }
}

/// `needs`: a bare job ID or a list of job IDs.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Needs {
    One(String),
    Many(Vec<String>),
}

impl Needs {
    pub fn ids(&self) -> Vec<String> {
        match self {
            Needs::One(id) => vec![id.clone()],
            Needs::Many(ids) => ids.clone(),
        }
    }
}

/// `if`: a literal boolean or an expression string.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Condition {
    Bool(bool),
    Expr(String),
}

impl Condition {
    /// Expression text suitable for embedding in a larger expression.
    pub fn expression(&self) -> String {
        match self {
            Condition::Bool(value) => value.to_string(),
            Condition::Expr(expr) => strip_expression_delimiters(expr).to_string(),
        }
    }
}

/// Remove a surrounding `${{ ... }}` wrapper, if present.
pub fn strip_expression_delimiters(expr: &str) -> &str {
    let trimmed = expr.trim();
    trimmed
        .strip_prefix("${{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// `continue-on-error`: boolean or expression. Absence is the third state.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ContinueOnError {
    Bool(bool),
    Expr(String),
}

impl ContinueOnError {
    pub fn is_true(&self) -> bool {
        matches!(self, ContinueOnError::Bool(true))
    }
}

/// `timeout-minutes`: whole minutes, fractional minutes, or an expression.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TimeoutMinutes {
    Minutes(u64),
    Fractional(f64),
    Expr(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Strategy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<Value>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// `container`: a bare image reference or a full specification.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Container {
    Image(String),
    Spec(ContainerSpec),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContainerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}
