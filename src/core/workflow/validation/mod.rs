#![allow(clippy::result_large_err)] // Blocking findings convert into AppError to keep one error type at the CLI boundary.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::schema::{Job, Workflow};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub mod rules;
pub mod tools;

pub use rules::built_in_rules;
pub use tools::{DetectedTool, ToolDetector, ToolRegistry};

/// Whether a finding stops materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSeverity {
    Error,
    Warning,
}

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationSeverity::Error => write!(f, "error"),
            ValidationSeverity::Warning => write!(f, "warning"),
        }
    }
}

/// One finding about a feature that local execution cannot honour faithfully.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub feature: String,
    pub description: String,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    /// Zero-based index into the job's original steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    pub severity: ValidationSeverity,
}

impl ValidationError {
    pub fn error(
        feature: impl Into<String>,
        description: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            feature: feature.into(),
            description: description.into(),
            suggestion: suggestion.into(),
            file: None,
            job: None,
            step: None,
            severity: ValidationSeverity::Error,
        }
    }

    pub fn warning(
        feature: impl Into<String>,
        description: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            severity: ValidationSeverity::Warning,
            ..Self::error(feature, description, suggestion)
        }
    }

    pub fn in_job(mut self, job: &str) -> Self {
        self.job = Some(job.to_string());
        self
    }

    pub fn at_step(mut self, index: usize) -> Self {
        self.step = Some(index);
        self
    }

    pub fn in_file(mut self, file: &Path) -> Self {
        self.file = Some(file.to_path_buf());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == ValidationSeverity::Error
    }

    fn location(&self) -> String {
        let mut parts = Vec::new();
        if let Some(file) = &self.file {
            parts.push(file.display().to_string());
        }
        if let Some(job) = &self.job {
            parts.push(format!("job '{}'", job));
        }
        if let Some(step) = self.step {
            parts.push(format!("step {}", step));
        }
        parts.join(", ")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = self.location();
        if location.is_empty() {
            write!(f, "[{}] {}: {}", self.severity, self.feature, self.description)?;
        } else {
            write!(
                f,
                "[{}] {} ({}): {}",
                self.severity, self.feature, location, self.description
            )?;
        }
        if !self.suggestion.is_empty() {
            write!(f, " -> {}", self.suggestion)?;
        }
        Ok(())
    }
}

/// Accumulated findings in detection order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    findings: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, finding: ValidationError) {
        self.findings.push(finding);
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.findings.extend(other.findings);
    }

    /// Gate on this, not on `is_empty`: warnings never block.
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(ValidationError::is_error)
    }

    pub fn errors(&self) -> Vec<&ValidationError> {
        self.findings.iter().filter(|f| f.is_error()).collect()
    }

    pub fn warnings(&self) -> Vec<&ValidationError> {
        self.findings.iter().filter(|f| !f.is_error()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.findings.iter()
    }

    /// Collapse the blocking findings into one error listing each of them.
    pub fn to_app_error(&self) -> AppError {
        let errors = self.errors();
        let mut message = format!(
            "workflow validation failed with {} blocking issue(s):",
            errors.len()
        );
        for finding in &errors {
            message.push_str("\n  - ");
            message.push_str(&finding.to_string());
        }

        let mut err = AppError::new(ErrorCategory::ValidationError, message)
            .with_code("DET-VAL-001");
        err.add_context("errors", &errors.len().to_string());
        err.add_context("warnings", &self.warnings().len().to_string());
        for finding in errors {
            if !finding.suggestion.is_empty()
                && !err.recovery_suggestions.contains(&finding.suggestion)
            {
                err.recovery_suggestions.push(finding.suggestion.clone());
            }
        }
        err
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, finding) in self.findings.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", finding)?;
        }
        Ok(())
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.findings.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.findings.iter()
    }
}

/// A check applied to workflows. Job-level checks see jobs in sorted ID order.
pub trait ValidationRule: Send + Sync {
    fn check_workflow(&self, _workflow: &Workflow) -> Vec<ValidationError> {
        Vec::new()
    }

    fn check_job(&self, _job_id: &str, _job: &Job) -> Vec<ValidationError> {
        Vec::new()
    }
}

/// Runs every rule and accumulates findings instead of stopping at the first.
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            rules: built_in_rules(tools),
        }
    }

    pub fn with_rules(rules: Vec<Box<dyn ValidationRule>>) -> Self {
        Self { rules }
    }

    pub fn validate(&self, workflow: &Workflow) -> ValidationErrors {
        let mut findings = ValidationErrors::new();
        for rule in &self.rules {
            for finding in rule.check_workflow(workflow) {
                findings.push(finding);
            }
        }
        for job_id in workflow.sorted_job_ids() {
            let job = &workflow.jobs[job_id.as_str()];
            for rule in &self.rules {
                for finding in rule.check_job(&job_id, job) {
                    findings.push(finding.in_job(&job_id));
                }
            }
        }
        findings
    }

    /// Findings of every workflow, in path order, each tagged with its file.
    pub fn validate_all(&self, workflows: &BTreeMap<PathBuf, Workflow>) -> ValidationErrors {
        let mut findings = ValidationErrors::new();
        for (path, workflow) in workflows {
            for finding in self.validate(workflow) {
                findings.push(finding.in_file(path));
            }
        }
        for finding in findings.warnings() {
            tracing::warn!(finding = %finding, "workflow validation warning");
        }
        findings
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ToolRegistry::with_defaults())
    }
}
