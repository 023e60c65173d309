#![allow(clippy::result_large_err)] // Materialization failures carry file context through AppError.

//! Materializes instrumented workflows into an isolated temporary directory.

use crate::core::config::DetentConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::discovery::{discover, parse_file, resolve_workflow_file};
use crate::core::workflow::injector::{Injector, ManifestPlacement};
use crate::core::workflow::manifest::{
    build_combined_manifest, CycleWarning, CycleWarnings, Manifest,
};
use crate::core::workflow::markers::is_valid_job_id;
use crate::core::workflow::schema::Workflow;
use crate::core::workflow::validation::{ToolRegistry, ValidationErrors, Validator};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 10;

#[cfg(unix)]
const FILE_MODE: u32 = 0o600;
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// Knobs for one materialization pass.
#[derive(Debug, Clone)]
pub struct PrepareOptions {
    /// Single workflow file relative to the source directory.
    pub workflow: Option<PathBuf>,
    pub max_concurrent_files: usize,
    pub job_timeout_minutes: u64,
    pub step_timeout_minutes: u64,
    /// Parent of the workspace directory; the system temp dir when `None`.
    pub temp_root: Option<PathBuf>,
}

impl PrepareOptions {
    pub fn from_config(config: &DetentConfig) -> Self {
        Self {
            workflow: None,
            max_concurrent_files: config.workspace.max_concurrent_files,
            job_timeout_minutes: config.injection.job_timeout_minutes,
            step_timeout_minutes: config.injection.step_timeout_minutes,
            temp_root: None,
        }
    }

    pub fn with_workflow(mut self, workflow: Option<PathBuf>) -> Self {
        self.workflow = workflow;
        self
    }
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self::from_config(&DetentConfig::default())
    }
}

/// Workflows that passed discovery, parsing and validation.
#[derive(Debug)]
pub struct LoadedWorkflows {
    pub workflows: BTreeMap<PathBuf, Workflow>,
    pub findings: ValidationErrors,
}

/// A temporary directory holding the instrumented workflows.
///
/// The directory is removed on [`cleanup`](Self::cleanup) or drop unless
/// [`keep`](Self::keep) is called.
#[derive(Debug)]
pub struct PreparedWorkspace {
    dir: Option<TempDir>,
    path: PathBuf,
    /// Written files, sorted by path.
    pub files: Vec<PathBuf>,
    pub manifest: Manifest,
    /// Job carrying the manifest step, as `(source file, job ID)`.
    pub manifest_job: Option<(PathBuf, String)>,
    /// Non-blocking validation findings.
    pub warnings: ValidationErrors,
    pub cycle_warnings: Vec<CycleWarning>,
}

impl PreparedWorkspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory now, reporting any failure.
    pub fn cleanup(mut self) -> Result<(), AppError> {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            dir.close().map_err(|e| {
                AppError::new(
                    ErrorCategory::WorkspaceError,
                    format!("failed to remove workspace {}: {}", path.display(), e),
                )
                .with_code("DET-WS-005")
            })?;
            tracing::debug!(path = %path.display(), "removed workspace");
        }
        Ok(())
    }

    /// Persist the directory past this handle and return its path.
    pub fn keep(mut self) -> PathBuf {
        if let Some(dir) = self.dir.take() {
            // Disarm the TempDir destructor.
            let _ = dir.keep();
        }
        self.path.clone()
    }
}

/// Discover and parse the candidate workflows, keyed by path.
pub fn parse_workflows(
    source_dir: &Path,
    workflow: Option<&Path>,
) -> Result<BTreeMap<PathBuf, Workflow>, AppError> {
    let candidates = match workflow {
        Some(requested) => vec![resolve_workflow_file(source_dir, requested)?],
        None => discover(source_dir)?,
    };
    if candidates.is_empty() {
        return Err(AppError::new(
            ErrorCategory::WorkspaceError,
            format!("no workflow files found in {}", source_dir.display()),
        )
        .with_code("DET-WS-001")
        .with_suggestion("add .yml or .yaml files under .github/workflows"));
    }

    let mut workflows = BTreeMap::new();
    for path in candidates {
        let parsed = parse_file(&path)?;
        workflows.insert(path, parsed);
    }
    tracing::debug!(count = workflows.len(), "parsed workflows");
    Ok(workflows)
}

/// Discover, parse and validate the candidate workflows without touching disk.
///
/// Every file is parsed before validation runs; a blocking finding aborts
/// with one error listing all of them.
pub fn load_workflows(
    source_dir: &Path,
    workflow: Option<&Path>,
    tools: ToolRegistry,
) -> Result<LoadedWorkflows, AppError> {
    let workflows = parse_workflows(source_dir, workflow)?;
    let findings = Validator::new(tools).validate_all(&workflows);
    if findings.has_errors() {
        return Err(findings.to_app_error());
    }
    Ok(LoadedWorkflows {
        workflows,
        findings,
    })
}

/// The job that emits the manifest: the first dependency-free job with a safe
/// ID, walking files by path and jobs by ID.
pub fn select_manifest_job(workflows: &BTreeMap<PathBuf, Workflow>) -> Option<(PathBuf, String)> {
    let instrumentable = || {
        workflows.iter().flat_map(|(path, workflow)| {
            workflow.sorted_job_ids().into_iter().filter_map(move |id| {
                let job = &workflow.jobs[id.as_str()];
                (is_valid_job_id(&id) && !job.is_reusable()).then(|| (path, id, job.needs()))
            })
        })
    };

    instrumentable()
        .find(|(_, _, needs)| needs.is_empty())
        .or_else(|| instrumentable().next())
        .map(|(path, id, _)| (path.clone(), id))
}

/// Build the instrumented workspace for `source_dir`.
pub async fn prepare(source_dir: &Path, options: &PrepareOptions) -> Result<PreparedWorkspace, AppError> {
    let loaded = load_workflows(
        source_dir,
        options.workflow.as_deref(),
        ToolRegistry::with_defaults(),
    )?;
    materialize(loaded, options).await
}

/// Instrument and write already-loaded workflows.
pub async fn materialize(
    loaded: LoadedWorkflows,
    options: &PrepareOptions,
) -> Result<PreparedWorkspace, AppError> {
    let LoadedWorkflows {
        workflows,
        findings,
    } = loaded;

    let cycles = CycleWarnings::new();
    let manifest = build_combined_manifest(&workflows, &cycles);
    let manifest_json = manifest.to_json().map_err(|e| {
        AppError::with_source(
            ErrorCategory::SerializationError,
            "failed to encode workflow manifest",
            e,
        )
        .with_code("DET-WS-002")
    })?;
    let manifest_job = select_manifest_job(&workflows);
    if manifest_job.is_none() {
        tracing::warn!("no instrumentable job found; manifest step omitted");
    }

    let dir = create_workspace_dir(options.temp_root.as_deref())?;
    let root = dir.path().to_path_buf();
    tracing::info!(
        path = %root.display(),
        files = workflows.len(),
        jobs = manifest.jobs.len(),
        "materializing workspace"
    );

    let written = match write_instrumented(
        workflows,
        &root,
        Arc::new(manifest_json),
        manifest_job.clone(),
        options,
    )
    .await
    {
        Ok(written) => written,
        Err(err) => {
            if let Err(cleanup_err) = dir.close() {
                tracing::warn!(error = %cleanup_err, "failed to remove partial workspace");
            }
            return Err(err);
        }
    };

    Ok(PreparedWorkspace {
        dir: Some(dir),
        path: root,
        files: written,
        manifest,
        manifest_job,
        warnings: findings,
        cycle_warnings: cycles.snapshot(),
    })
}

fn create_workspace_dir(parent: Option<&Path>) -> Result<TempDir, AppError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("detent-");
    let created = match parent {
        Some(parent) => builder.tempdir_in(parent),
        None => builder.tempdir(),
    };
    let dir = created
        .map_err(|e| {
            AppError::new(
                ErrorCategory::WorkspaceError,
                format!("failed to create workspace directory: {}", e),
            )
            .with_code("DET-WS-003")
        })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(DIR_MODE)).map_err(
            |e| {
                AppError::new(
                    ErrorCategory::WorkspaceError,
                    format!("failed to restrict workspace permissions: {}", e),
                )
                .with_code("DET-WS-003")
            },
        )?;
    }
    Ok(dir)
}

async fn write_instrumented(
    workflows: BTreeMap<PathBuf, Workflow>,
    root: &Path,
    manifest_json: Arc<String>,
    manifest_job: Option<(PathBuf, String)>,
    options: &PrepareOptions,
) -> Result<Vec<PathBuf>, AppError> {
    let injector = Arc::new(Injector::new(
        options.job_timeout_minutes,
        options.step_timeout_minutes,
    ));
    let semaphore = Arc::new(Semaphore::new(options.max_concurrent_files.max(1)));
    let destination = Arc::new(Mutex::new(root.to_path_buf()));
    let mut tasks: JoinSet<Result<PathBuf, AppError>> = JoinSet::new();

    for (source, mut workflow) in workflows {
        let injector = Arc::clone(&injector);
        let semaphore = Arc::clone(&semaphore);
        let destination = Arc::clone(&destination);
        let manifest_json = Arc::clone(&manifest_json);
        let manifest_target = manifest_job
            .as_ref()
            .filter(|(path, _)| *path == source)
            .map(|(_, job_id)| job_id.clone());

        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.map_err(|e| {
                AppError::new(
                    ErrorCategory::InternalError,
                    format!("instrumentation pool closed: {}", e),
                )
            })?;

            let placement = manifest_target.as_deref().map(|job_id| ManifestPlacement {
                job_id,
                manifest_json: manifest_json.as_str(),
            });
            injector.instrument(&mut workflow, placement.as_ref());

            let yaml = serde_yaml::to_string(&workflow).map_err(|e| {
                AppError::with_source(
                    ErrorCategory::SerializationError,
                    format!("failed to serialize {}", source.display()),
                    e,
                )
                .with_code("DET-WS-002")
            })?;

            let file_name = source.file_name().ok_or_else(|| {
                AppError::new(
                    ErrorCategory::WorkspaceError,
                    format!("workflow path {} has no file name", source.display()),
                )
                .with_code("DET-WS-004")
            })?;

            let dir = destination.lock().await;
            let target = dir.join(file_name);
            write_restricted(&target, yaml.as_bytes()).await?;
            tracing::debug!(source = %source.display(), target = %target.display(), "wrote instrumented workflow");
            Ok(target)
        });
    }

    let mut written = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.map_err(|e| {
            AppError::new(
                ErrorCategory::InternalError,
                format!("instrumentation task failed: {}", e),
            )
            .with_code("DET-WS-004")
        });
        match outcome.and_then(|result| result) {
            Ok(path) => written.push(path),
            Err(err) => {
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                return Err(err);
            }
        }
    }
    written.sort();
    Ok(written)
}

async fn write_restricted(path: &Path, contents: &[u8]) -> Result<(), AppError> {
    let io_error = |e: std::io::Error| {
        AppError::new(
            ErrorCategory::WorkspaceError,
            format!("failed to write {}: {}", path.display(), e),
        )
        .with_code("DET-WS-004")
    };

    let mut open = tokio::fs::OpenOptions::new();
    open.write(true).create_new(true);
    #[cfg(unix)]
    open.mode(FILE_MODE);
    let mut file = open.open(path).await.map_err(io_error)?;
    file.write_all(contents).await.map_err(io_error)?;
    file.flush().await.map_err(io_error)?;
    Ok(())
}
