use crate::cli::Args;
use std::env;

/// Execution contexts that influence how logging is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Interactive use from a terminal.
    LocalDev,
    /// Console logging suppressed by `--quiet` or `DETENT_QUIET=1`.
    Quiet,
}

impl ExecutionContext {
    /// Returns `true` when console sinks should be disabled.
    pub fn disables_console(self) -> bool {
        matches!(self, ExecutionContext::Quiet)
    }
}

/// Derive the active execution context from parsed CLI arguments plus overrides.
pub fn detect_context(args: &Args) -> ExecutionContext {
    if args.quiet || quiet_override_enabled() {
        ExecutionContext::Quiet
    } else {
        ExecutionContext::LocalDev
    }
}

fn quiet_override_enabled() -> bool {
    env::var("DETENT_QUIET")
        .map(|value| value.trim() == "1")
        .unwrap_or(false)
}
