pub mod args;
pub mod commands;

pub use args::{CheckArgs, ManifestArgs, OutputFormat, PrepareArgs, RunArgs, SourceArgs};
use clap::{Parser, Subcommand};

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
WORKFLOW COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "detent")]
#[command(version = crate::VERSION)]
#[command(about = "Run GitHub Actions workflows locally with lifecycle markers")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: check the workflows, inspect the manifest, then run them through the local runner."
)]
pub struct Args {
    /// Log debug detail to the console
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress console logging
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Validate workflows against the local runner",
        long_about = "Check discovers, parses and validates every workflow file, prints all findings, and fails when any of them blocks a local run.",
        after_help = "Example:\n    detent check . --format json"
    )]
    Check(CheckArgs),
    #[command(
        about = "Print the combined job manifest",
        long_about = "Manifest prints the dependency-ordered job and step summary that instrumented runs emit as their first marker.",
        after_help = "Example:\n    detent manifest . --workflow ci.yml"
    )]
    Manifest(ManifestArgs),
    #[command(
        about = "Write instrumented workflows to a temporary directory",
        long_about = "Prepare validates and instruments the workflows, writes them to a private temporary directory, and prints its path.",
        after_help = "Example:\n    detent prepare . --keep"
    )]
    Prepare(PrepareArgs),
    #[command(
        about = "Instrument the workflows and run them locally",
        long_about = "Run prepares an instrumented workspace, launches the local runner against it, and exits with the runner's exit code. Ctrl-C stops the runner's whole process group.",
        after_help = "Example:\n    detent run . --event pull_request --stream"
    )]
    Run(RunArgs),
}

impl Command {
    /// Repository root the command operates on, when one was given.
    pub fn source(&self) -> &SourceArgs {
        match self {
            Command::Check(args) => &args.source,
            Command::Manifest(args) => &args.source,
            Command::Prepare(args) => &args.source,
            Command::Run(args) => &args.source,
        }
    }
}

/// Dispatch a parsed command. Returns the process exit code.
pub async fn run(args: Args) -> crate::Result<i32> {
    match args.command {
        Command::Check(check_args) => commands::check(check_args).await,
        Command::Manifest(manifest_args) => commands::manifest(manifest_args).await,
        Command::Prepare(prepare_args) => commands::prepare(prepare_args).await,
        Command::Run(run_args) => commands::run(run_args).await,
    }
}
