use serde::{Deserialize, Serialize};

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Missing, unreadable, oversized, binary or malformed workflow input.
    InputError,
    /// Blocking validation findings.
    ValidationError,
    /// Failure while materializing the instrumented workspace.
    WorkspaceError,
    /// Runner launch or supervision fault.
    RunnerError,
    ConfigError,
    IoError,
    SerializationError,
    /// The caller cancelled the operation.
    Cancelled,
    InternalError,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
}
