//! In-place instrumentation of a parsed workflow.

use crate::core::workflow::manifest::step_display_name;
use crate::core::workflow::markers::{
    self, is_valid_job_id, JOB_END_STEP_NAME, JOB_START_STEP_NAME, MANIFEST_STEP_NAME,
};
use crate::core::workflow::schema::{
    Condition, ContinueOnError, Job, Step, TimeoutMinutes, Workflow,
};
use crate::core::workflow::sensitive::SensitivityClassifier;

pub const DEFAULT_JOB_TIMEOUT_MINUTES: u64 = 30;
pub const DEFAULT_STEP_TIMEOUT_MINUTES: u64 = 15;

/// Condition attached to the job-end marker and to guarded dependent jobs.
const ALWAYS: &str = "always()";

/// Designates the job that carries the manifest step, with the encoded payload.
#[derive(Debug, Clone)]
pub struct ManifestPlacement<'a> {
    pub job_id: &'a str,
    pub manifest_json: &'a str,
}

/// Applies failure containment, markers, guards and timeouts to workflows.
pub struct Injector {
    job_timeout_minutes: u64,
    step_timeout_minutes: u64,
    classifier: SensitivityClassifier,
}

impl Injector {
    pub fn new(job_timeout_minutes: u64, step_timeout_minutes: u64) -> Self {
        Self {
            job_timeout_minutes,
            step_timeout_minutes,
            classifier: SensitivityClassifier::new(),
        }
    }

    /// Run every pass in the order the materializer relies on.
    ///
    /// Timeouts come last so injected marker steps receive the step default.
    pub fn instrument(&self, workflow: &mut Workflow, manifest: Option<&ManifestPlacement<'_>>) {
        self.contain_failures(workflow);
        self.inject_markers(workflow, manifest);
        self.guard_dependents(workflow);
        self.apply_timeouts(workflow);
    }

    /// Force job-level `continue-on-error: true`. Steps are left alone so
    /// their failures stay visible.
    pub fn contain_failures(&self, workflow: &mut Workflow) {
        for job in workflow.jobs.values_mut() {
            if !job.continue_on_error.as_ref().is_some_and(ContinueOnError::is_true) {
                job.continue_on_error = Some(ContinueOnError::Bool(true));
            }
        }
    }

    /// Fill in missing job and step timeouts; explicit values are kept.
    pub fn apply_timeouts(&self, workflow: &mut Workflow) {
        for job in workflow.jobs.values_mut() {
            job.timeout_minutes
                .get_or_insert(TimeoutMinutes::Minutes(self.job_timeout_minutes));
            if job.is_reusable() {
                continue;
            }
            for step in &mut job.steps {
                step.timeout_minutes
                    .get_or_insert(TimeoutMinutes::Minutes(self.step_timeout_minutes));
            }
        }
    }

    /// Rewrite the steps of every instrumentable job with lifecycle markers.
    ///
    /// Jobs with an unsafe ID or a reusable-workflow reference are untouched.
    pub fn inject_markers(&self, workflow: &mut Workflow, manifest: Option<&ManifestPlacement<'_>>) {
        for (job_id, job) in workflow.jobs.iter_mut() {
            if job.is_reusable() {
                continue;
            }
            if !is_valid_job_id(job_id) {
                tracing::warn!(job = %job_id, "job id is not a safe identifier; skipping instrumentation");
                continue;
            }

            let original = std::mem::take(&mut job.steps);
            let mut steps = Vec::with_capacity(original.len() * 2 + 3);

            if let Some(placement) = manifest.filter(|p| p.job_id == job_id.as_str()) {
                steps.push(Step::shell(
                    MANIFEST_STEP_NAME,
                    markers::manifest_command(placement.manifest_json),
                ));
            }
            steps.push(Step::shell(
                JOB_START_STEP_NAME,
                markers::job_start_command(job_id),
            ));
            for (index, step) in original.into_iter().enumerate() {
                let display = step_display_name(&step);
                steps.push(Step::shell(
                    markers::step_start_step_name(index),
                    markers::step_start_command(job_id, index, &display),
                ));
                steps.push(step);
            }
            steps.push(Step {
                condition: Some(Condition::Expr(ALWAYS.to_string())),
                ..Step::shell(JOB_END_STEP_NAME, markers::job_end_command(job_id))
            });

            tracing::debug!(job = %job_id, steps = steps.len(), "injected lifecycle markers");
            job.steps = steps;
        }
    }

    /// Give non-sensitive dependent jobs an `always()` guard so they still run
    /// after an upstream failure.
    pub fn guard_dependents(&self, workflow: &mut Workflow) {
        for (job_id, job) in workflow.jobs.iter_mut() {
            if job.needs().is_empty() || job.is_reusable() {
                continue;
            }
            if self.classifier.is_sensitive(job_id, job) {
                tracing::debug!(job = %job_id, "sensitive job keeps its original condition");
                continue;
            }
            job.condition = Some(Condition::Expr(guarded_condition(job.condition.as_ref())));
        }
    }

    pub fn is_sensitive(&self, job_id: &str, job: &Job) -> bool {
        self.classifier.is_sensitive(job_id, job)
    }
}

impl Default for Injector {
    fn default() -> Self {
        Self::new(DEFAULT_JOB_TIMEOUT_MINUTES, DEFAULT_STEP_TIMEOUT_MINUTES)
    }
}

fn guarded_condition(existing: Option<&Condition>) -> String {
    let Some(existing) = existing else {
        return ALWAYS.to_string();
    };
    let expr = existing.expression();
    if expr.is_empty() {
        return ALWAYS.to_string();
    }
    if expr == ALWAYS || expr.starts_with("always() && (") {
        return expr;
    }
    format!("{ALWAYS} && ({expr})")
}
