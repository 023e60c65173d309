use crate::logging::context::ExecutionContext;
use serde::Deserialize;
use std::io::{self, IsTerminal};
use std::str::FromStr;
use tracing::Subscriber;
use tracing_subscriber::fmt::{self as tracing_fmt, format, writer::BoxMakeWriter};
use tracing_subscriber::registry::LookupSpan;

/// Compact, timestamp-free lines; the file sink keeps the full record.
pub type ConsoleFmtLayer<S> = tracing_fmt::Layer<
    S,
    format::DefaultFields,
    format::Format<format::Compact, ()>,
    BoxMakeWriter,
>;

/// Where diagnostics go. Runner output is never routed through here.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleOutput {
    Stdout,
    #[default]
    Stderr,
    None,
}

impl FromStr for ConsoleOutput {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(ConsoleOutput::Stdout),
            "stderr" => Ok(ConsoleOutput::Stderr),
            "none" => Ok(ConsoleOutput::None),
            other => Err(format!(
                "DETENT_LOG_CONSOLE must be stdout, stderr or none (got '{other}')"
            )),
        }
    }
}

/// `--quiet` and `DETENT_QUIET` win over any configured sink.
pub fn select_console_output(
    context: ExecutionContext,
    configured: Option<ConsoleOutput>,
) -> ConsoleOutput {
    if context.disables_console() {
        return ConsoleOutput::None;
    }
    configured.unwrap_or_default()
}

pub fn console_layer<S>(output: ConsoleOutput) -> ConsoleFmtLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let (writer, ansi) = match output {
        ConsoleOutput::Stdout => (BoxMakeWriter::new(io::stdout), io::stdout().is_terminal()),
        ConsoleOutput::Stderr => (BoxMakeWriter::new(io::stderr), io::stderr().is_terminal()),
        ConsoleOutput::None => (BoxMakeWriter::new(io::sink), false),
    };
    layer_with_writer(writer, ansi)
}

fn layer_with_writer<S>(writer: BoxMakeWriter, ansi: bool) -> ConsoleFmtLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_fmt::layer()
        .compact()
        .without_time()
        .with_target(false)
        .with_ansi(ansi)
        .with_writer(writer)
}
