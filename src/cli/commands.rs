use crate::{
    cli::args::{CheckArgs, ManifestArgs, OutputFormat, PrepareArgs, RunArgs, SourceArgs},
    core::{
        runner::{self, output::LiveSink, RunConfig, RunResult},
        workflow::{
            build_combined_manifest, load_workflows, parse_workflows, prepare as prepare_workspace,
            CycleWarnings, PrepareOptions, ToolRegistry, ValidationErrors, Validator,
        },
        AppError, ConfigLoader, DetentConfig,
    },
    Result,
};
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Exit code reported when the user interrupts a run.
pub const CANCELLED_EXIT_CODE: i32 = 130;

const JOB_START_MARKER: &str = "::detent::job-start::";

/// Repository root, configuration and workflows directory for one command.
struct Source {
    root: PathBuf,
    config: DetentConfig,
    workflows_dir: PathBuf,
    workflow: Option<PathBuf>,
}

impl Source {
    fn resolve(args: &SourceArgs) -> Result<Self> {
        let root = match &args.path {
            Some(path) => path.clone(),
            None => env::current_dir()?,
        };
        let config = ConfigLoader::load_from_workspace(&root)?;
        let workflows_dir = root.join(&config.workspace.workflows_dir);
        tracing::debug!(
            root = %root.display(),
            workflows = %workflows_dir.display(),
            "resolved repository"
        );
        Ok(Self {
            root,
            config,
            workflows_dir,
            workflow: args.workflow.clone(),
        })
    }

    fn prepare_options(&self) -> PrepareOptions {
        PrepareOptions::from_config(&self.config).with_workflow(self.workflow.clone())
    }
}

pub async fn check(args: CheckArgs) -> Result<i32> {
    let source = Source::resolve(&args.source)?;
    let workflows = parse_workflows(&source.workflows_dir, source.workflow.as_deref())?;
    let findings = Validator::new(ToolRegistry::with_defaults()).validate_all(&workflows);

    match args.format {
        OutputFormat::Text => print_findings_text(workflows.len(), &findings, &source.root),
        OutputFormat::Json => {
            let report = serde_json::json!({
                "files": workflows.keys().collect::<Vec<_>>(),
                "errors": findings.errors().len(),
                "warnings": findings.warnings().len(),
                "findings": &findings,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(if findings.has_errors() { 1 } else { 0 })
}

fn print_findings_text(files: usize, findings: &ValidationErrors, root: &Path) {
    for finding in findings {
        match finding.file.as_deref().map(|file| file.strip_prefix(root).unwrap_or(file)) {
            Some(file) => println!("{}: {}", file.display(), finding),
            None => println!("{}", finding),
        }
    }
    println!(
        "Checked {} workflow file(s): {} error(s), {} warning(s)",
        files,
        findings.errors().len(),
        findings.warnings().len()
    );
}

pub async fn manifest(args: ManifestArgs) -> Result<i32> {
    let source = Source::resolve(&args.source)?;
    let loaded = load_workflows(
        &source.workflows_dir,
        source.workflow.as_deref(),
        ToolRegistry::with_defaults(),
    )?;
    let cycles = CycleWarnings::new();
    let manifest = build_combined_manifest(&loaded.workflows, &cycles);
    for warning in cycles.snapshot() {
        tracing::warn!("{}", warning);
    }
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(0)
}

pub async fn prepare(args: PrepareArgs) -> Result<i32> {
    let source = Source::resolve(&args.source)?;
    let prepared = prepare_workspace(&source.workflows_dir, &source.prepare_options()).await?;

    println!(
        "Instrumented {} workflow file(s), {} job(s) in manifest",
        prepared.files.len(),
        prepared.manifest.jobs.len()
    );
    if let Some((file, job)) = &prepared.manifest_job {
        println!("Manifest emitted by job '{}' in {}", job, file.display());
    }

    if args.keep {
        let path = prepared.keep();
        println!("{}", path.display());
    } else {
        let path = prepared.path().to_path_buf();
        prepared.cleanup()?;
        println!(
            "{} (removed; pass --keep to retain it)",
            path.display()
        );
    }
    Ok(0)
}

pub async fn run(args: RunArgs) -> Result<i32> {
    let mut source = Source::resolve(&args.source)?;
    if let Some(event) = &args.event {
        source.config.runner.event = event.clone();
    }
    if let Some(binary) = &args.runner {
        source.config.runner.binary = binary.clone();
    }
    if let Some(grace) = args.grace_period {
        source.config.runner.grace_period_seconds = grace;
    }
    crate::core::ConfigValidator::validate(&source.config)?;

    let prepared = prepare_workspace(&source.workflows_dir, &source.prepare_options()).await?;
    for warning in &prepared.cycle_warnings {
        tracing::warn!("{}", warning);
    }

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let mut run_config = RunConfig::from_config(prepared.path(), &source.root, &source.config);
    let printer = if args.stream {
        let (tx, rx) = mpsc::channel(source.config.runner.stream_channel_capacity);
        run_config = run_config.with_sink(LiveSink::none().with_channel(tx));
        Some(tokio::spawn(print_live_lines(rx)))
    } else {
        None
    };

    let outcome = runner::run(&cancel, &run_config).await;
    // Dropping the config closes the live channel so the printer can finish.
    drop(run_config);
    interrupt.abort();
    if let Some(printer) = printer {
        if let Err(err) = printer.await {
            tracing::warn!(error = %err, "live output printer failed");
        }
    }
    if let Err(err) = prepared.cleanup() {
        tracing::warn!(error = %err, "failed to remove instrumented workspace");
    }

    match outcome {
        Ok(result) => {
            if !args.stream {
                replay_captured(&result)?;
            }
            eprintln!("{}", summary_line(&result));
            Ok(result.exit_code)
        }
        Err(err) if err.is_cancelled() => {
            eprintln!("{}", cancelled_line(&err));
            Ok(CANCELLED_EXIT_CODE)
        }
        Err(err) => Err(err.into()),
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("interrupt received; stopping runner");
            cancel.cancel();
        }
        Err(err) => tracing::warn!(error = %err, "failed to listen for Ctrl-C"),
    }
}

async fn print_live_lines(mut rx: mpsc::Receiver<String>) {
    while let Some(line) = rx.recv().await {
        eprintln!("{}", line);
    }
}

fn replay_captured(result: &RunResult) -> Result<()> {
    std::io::stdout().write_all(result.stdout.as_bytes())?;
    std::io::stderr().write_all(result.stderr.as_bytes())?;
    Ok(())
}

/// Number of jobs that reported a start marker in the captured output.
///
/// Only step output counts: a line whose payload, after the runner's
/// `[workflow/job] |` prefix, begins with the marker. Echoed script text
/// that merely mentions it is ignored.
fn started_jobs(result: &RunResult) -> usize {
    result
        .stdout
        .lines()
        .chain(result.stderr.lines())
        .filter(|line| output_payload(line).starts_with(JOB_START_MARKER))
        .count()
}

fn output_payload(line: &str) -> &str {
    let mut rest = line.trim_start();
    if rest.starts_with('[') {
        if let Some(end) = rest.find(']') {
            rest = rest[end + 1..].trim_start();
        }
    }
    rest.strip_prefix('|').map(str::trim_start).unwrap_or(rest)
}

fn summary_line(result: &RunResult) -> String {
    format!(
        "detent: runner {} with exit code {} after {:.1}s ({} job(s) started)",
        if result.success() { "succeeded" } else { "failed" },
        result.exit_code,
        result.duration.as_secs_f64(),
        started_jobs(result)
    )
}

fn cancelled_line(err: &AppError) -> String {
    let phase = err.context.get("phase").map(String::as_str).unwrap_or("unknown");
    format!("detent: {} (final phase: {})", err.message, phase)
}
