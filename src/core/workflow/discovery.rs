#![allow(clippy::result_large_err)] // Discovery returns AppError so callers keep file/path context on fatal input errors.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::schema::Workflow;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Workflow files larger than this are rejected before parsing.
pub const MAX_WORKFLOW_BYTES: u64 = 1_048_576;

/// Non-whitespace control characters tolerated before a file is treated as binary.
pub const MAX_CONTROL_CHARS: usize = 8;

fn input_error(code: &str, message: String, path: &Path) -> AppError {
    let mut err = AppError::new(ErrorCategory::InputError, message).with_code(code);
    err.add_context("path", &path.display().to_string());
    err
}

fn has_workflow_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yml") | Some("yaml")
    )
}

fn canonical_dir(dir: &Path) -> Result<PathBuf, AppError> {
    let canonical = dir.canonicalize().map_err(|err| {
        input_error(
            "DET-INPUT-006",
            format!("failed to resolve workflow directory {}: {}", dir.display(), err),
            dir,
        )
    })?;
    if !canonical.is_dir() {
        return Err(input_error(
            "DET-INPUT-006",
            format!("{} is not a directory", dir.display()),
            dir,
        ));
    }
    Ok(canonical)
}

/// List the workflow files directly inside `dir`, sorted by path.
///
/// Symbolic links, non-regular files and entries that resolve outside `dir`
/// are skipped.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let root = canonical_dir(dir)?;
    let entries = fs::read_dir(&root).map_err(|err| {
        input_error(
            "DET-INPUT-006",
            format!("failed to list {}: {}", root.display(), err),
            &root,
        )
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| {
            input_error(
                "DET-INPUT-006",
                format!("failed to read entry in {}: {}", root.display(), err),
                &root,
            )
        })?;
        let path = entry.path();
        let Ok(metadata) = fs::symlink_metadata(&path) else {
            continue;
        };
        if metadata.file_type().is_symlink() {
            tracing::debug!(path = %path.display(), "skipping symlinked workflow entry");
            continue;
        }
        if !metadata.is_file() || !has_workflow_extension(&path) {
            continue;
        }
        match path.canonicalize() {
            Ok(resolved) if resolved.starts_with(&root) => files.push(resolved),
            _ => {
                tracing::warn!(path = %path.display(), "skipping workflow outside source directory");
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Resolve an explicitly requested workflow file relative to `dir`.
///
/// Any violation is fatal: absolute or dot-prefixed paths, parent traversal,
/// symlinks, resolution outside `dir`, or a non-workflow extension.
pub fn resolve_workflow_file(dir: &Path, requested: &Path) -> Result<PathBuf, AppError> {
    let invalid = |reason: &str| {
        input_error(
            "DET-INPUT-005",
            format!("invalid workflow path '{}': {}", requested.display(), reason),
            requested,
        )
        .with_suggestion("pass a file name relative to the workflows directory, e.g. ci.yml")
    };

    let text = requested.to_string_lossy();
    if text.trim().is_empty() {
        return Err(invalid("path is empty"));
    }
    if requested.is_absolute() {
        return Err(invalid("path must be relative"));
    }
    if text.starts_with('.') {
        return Err(invalid("path must not start with '.'"));
    }
    if requested
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(invalid("path must not contain traversal components"));
    }
    if !has_workflow_extension(requested) {
        return Err(invalid("extension must be .yml or .yaml"));
    }

    let root = canonical_dir(dir)?;
    let candidate = root.join(requested);
    let metadata = fs::symlink_metadata(&candidate).map_err(|err| {
        input_error(
            "DET-INPUT-001",
            format!("workflow file {} is not readable: {}", candidate.display(), err),
            &candidate,
        )
    })?;
    if metadata.file_type().is_symlink() {
        return Err(invalid("symbolic links are not allowed"));
    }
    if !metadata.is_file() {
        return Err(invalid("not a regular file"));
    }
    let resolved = candidate.canonicalize().map_err(|err| {
        input_error(
            "DET-INPUT-001",
            format!("failed to resolve {}: {}", candidate.display(), err),
            &candidate,
        )
    })?;
    if !resolved.starts_with(&root) {
        return Err(invalid("path resolves outside the workflows directory"));
    }
    Ok(resolved)
}

/// Reject content that is clearly not a workflow definition.
fn check_content(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    if bytes.len() as u64 > MAX_WORKFLOW_BYTES {
        return Err(input_error(
            "DET-INPUT-002",
            format!(
                "workflow file {} is {} bytes, limit is {}",
                path.display(),
                bytes.len(),
                MAX_WORKFLOW_BYTES
            ),
            path,
        ));
    }
    if bytes.contains(&0) {
        return Err(input_error(
            "DET-INPUT-003",
            format!("workflow file {} contains NUL bytes", path.display()),
            path,
        ));
    }
    let control_chars = bytes
        .iter()
        .filter(|byte| byte.is_ascii_control() && !byte.is_ascii_whitespace())
        .count();
    if control_chars > MAX_CONTROL_CHARS {
        return Err(input_error(
            "DET-INPUT-003",
            format!(
                "workflow file {} looks binary ({} control characters)",
                path.display(),
                control_chars
            ),
            path,
        ));
    }
    Ok(())
}

/// Read, sanity-check and deserialize one workflow file.
pub fn parse_file(path: &Path) -> Result<Workflow, AppError> {
    let metadata = fs::metadata(path).map_err(|err| {
        input_error(
            "DET-INPUT-001",
            format!("failed to read {}: {}", path.display(), err),
            path,
        )
    })?;
    if metadata.len() > MAX_WORKFLOW_BYTES {
        return Err(input_error(
            "DET-INPUT-002",
            format!(
                "workflow file {} is {} bytes, limit is {}",
                path.display(),
                metadata.len(),
                MAX_WORKFLOW_BYTES
            ),
            path,
        ));
    }

    let bytes = fs::read(path).map_err(|err| {
        input_error(
            "DET-INPUT-001",
            format!("failed to read {}: {}", path.display(), err),
            path,
        )
    })?;
    check_content(path, &bytes)?;
    let text = String::from_utf8(bytes).map_err(|_| {
        input_error(
            "DET-INPUT-003",
            format!("workflow file {} is not valid UTF-8", path.display()),
            path,
        )
    })?;

    let workflow: Workflow = serde_yaml::from_str(&text).map_err(|err| {
        let mut app = input_error(
            "DET-INPUT-004",
            format!("failed to parse {}: {}", path.display(), err),
            path,
        );
        if let Some(location) = err.location() {
            app.add_context("line", &location.line().to_string());
            app.add_context("column", &location.column().to_string());
        }
        app
    })?;
    tracing::debug!(path = %path.display(), jobs = workflow.jobs.len(), "parsed workflow");
    Ok(workflow)
}
