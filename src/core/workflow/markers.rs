//! Lifecycle marker protocol emitted into instrumented workflows.
//!
//! Every marker is a single `echo` line of the form `::detent::<kind>::...`.
//! [`shell_quote`] is the only place that turns free text into shell text, and
//! free text passes through [`neutralize_expressions`] first: the runner expands
//! `${{ }}` in `run:` before the shell sees it.

use crate::core::workflow::schema::Step;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::OnceLock;

pub const MARKER_PREFIX: &str = "::detent::";
pub const MANIFEST_VERSION_TAG: &str = "v2";

pub const MANIFEST_STEP_NAME: &str = "[detent] manifest";
pub const JOB_START_STEP_NAME: &str = "[detent] job start";
pub const JOB_END_STEP_NAME: &str = "[detent] job end";

/// Replacement for a literal `'` inside a single-quoted shell string.
pub const QUOTE_ESCAPE: &str = r#"'\''"#;

/// Opening delimiter of a runner expression.
const EXPRESSION_OPEN: &str = "${{";

/// Expression the runner substitutes with the job's terminal status.
const JOB_STATUS_EXPR: &str = "${{ job.status }}";

fn job_id_pattern() -> &'static regex::Regex {
    static JOB_ID: OnceLock<regex::Regex> = OnceLock::new();
    JOB_ID.get_or_init(|| regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("valid regex"))
}

/// Whether a job ID is safe to embed in marker text.
pub fn is_valid_job_id(id: &str) -> bool {
    job_id_pattern().is_match(id)
}

/// Break every `${{` so the runner never evaluates text taken from the workflow.
pub fn neutralize_expressions(text: &str) -> String {
    text.replace(EXPRESSION_OPEN, "$ {{")
}

/// Escape single quotes for embedding inside a single-quoted shell string.
pub fn escape_single_quotes(text: &str) -> String {
    text.replace('\'', QUOTE_ESCAPE)
}

/// Wrap `text` in single quotes, escaping any quote it contains.
pub fn shell_quote(text: &str) -> String {
    format!("'{}'", escape_single_quotes(text))
}

fn echo(marker: &str) -> String {
    format!("echo {}", shell_quote(marker))
}

pub fn manifest_marker(manifest_json: &str) -> String {
    format!(
        "{MARKER_PREFIX}manifest::{MANIFEST_VERSION_TAG}::b64::{}",
        STANDARD.encode(manifest_json.as_bytes())
    )
}

pub fn job_start_marker(job_id: &str) -> String {
    format!("{MARKER_PREFIX}job-start::{job_id}")
}

pub fn step_start_marker(job_id: &str, index: usize, display_name: &str) -> String {
    format!(
        "{MARKER_PREFIX}step-start::{job_id}::{index}::{}",
        neutralize_expressions(display_name)
    )
}

pub fn job_end_marker(job_id: &str) -> String {
    format!("{MARKER_PREFIX}job-end::{job_id}::{JOB_STATUS_EXPR}")
}

pub fn manifest_command(manifest_json: &str) -> String {
    echo(&manifest_marker(manifest_json))
}

pub fn job_start_command(job_id: &str) -> String {
    echo(&job_start_marker(job_id))
}

pub fn step_start_command(job_id: &str, index: usize, display_name: &str) -> String {
    echo(&step_start_marker(job_id, index, display_name))
}

pub fn job_end_command(job_id: &str) -> String {
    echo(&job_end_marker(job_id))
}

pub fn step_start_step_name(index: usize) -> String {
    format!("[detent] step {index} start")
}

/// Whether a step was authored by the injector rather than the workflow.
pub fn is_marker_step(step: &Step) -> bool {
    step.name.as_deref().is_some_and(|name| name.starts_with("[detent] "))
        && step
            .run
            .as_deref()
            .is_some_and(|run| run.starts_with(&format!("echo '{MARKER_PREFIX}")))
}
