//! Process-group control and the cancellation state machine.
//!
//! [`supervise`] is written once against [`ProcessHandle`]; [`ChildProcess`]
//! backs it with a real process group.

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::fmt;
use std::time::Duration;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("process exited before its id could be read")]
    MissingPid,
    #[error("process id {0} does not fit a process group id")]
    InvalidPid(u32),
    #[error("failed to send {signal} to process group {pgid}: {source}")]
    Signal {
        pgid: i32,
        signal: Signal,
        #[source]
        source: Errno,
    },
    #[error("failed to kill process: {0}")]
    Kill(#[source] std::io::Error),
    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ProcessExit {
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signaled(signal: Signal) -> Self {
        Self {
            code: None,
            signal: Some(signal as i32),
        }
    }

    /// Shell-style numeric status: the exit code, or 128 + signal number.
    pub fn exit_code(&self) -> i32 {
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => -1,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        Self {
            code: status.code(),
            signal: status.signal(),
        }
    }
}

/// Control surface over a spawned process and its group.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Deliver `signal` to every process in the group.
    fn signal_group(&mut self, signal: Signal) -> Result<(), ProcessError>;

    fn kill_group(&mut self) -> Result<(), ProcessError> {
        self.signal_group(Signal::SIGKILL)
    }

    /// Kill the tracked process directly.
    fn kill(&mut self) -> Result<(), ProcessError>;

    /// Wait for the tracked process to exit. Must be cancel safe.
    async fn wait(&mut self) -> Result<ProcessExit, ProcessError>;
}

/// A `tokio` child spawned as the leader of its own process group.
pub struct ChildProcess {
    child: Child,
    pgid: Pid,
}

impl ChildProcess {
    /// Wrap a child spawned with `process_group(0)`.
    pub fn new(child: Child) -> Result<Self, ProcessError> {
        let pid = child.id().ok_or(ProcessError::MissingPid)?;
        let raw = i32::try_from(pid)
            .ok()
            .filter(|raw| *raw > 0)
            .ok_or(ProcessError::InvalidPid(pid))?;
        Ok(Self {
            child,
            pgid: Pid::from_raw(raw),
        })
    }

    pub fn pgid(&self) -> Pid {
        self.pgid
    }
}

#[async_trait]
impl ProcessHandle for ChildProcess {
    fn signal_group(&mut self, signal: Signal) -> Result<(), ProcessError> {
        match killpg(self.pgid, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(source) => Err(ProcessError::Signal {
                pgid: self.pgid.as_raw(),
                signal,
                source,
            }),
        }
    }

    fn kill(&mut self) -> Result<(), ProcessError> {
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(err) => Err(ProcessError::Kill(err)),
        }
    }

    async fn wait(&mut self) -> Result<ProcessExit, ProcessError> {
        self.child
            .wait()
            .await
            .map(ProcessExit::from)
            .map_err(ProcessError::Wait)
    }
}

/// Stages of a supervised process's shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    TerminateRequested,
    GracePeriod,
    ForceKilled,
    Exited,
}

impl ShutdownPhase {
    pub fn can_advance_to(self, next: ShutdownPhase) -> bool {
        use ShutdownPhase::*;
        matches!(
            (self, next),
            (Running, TerminateRequested)
                | (Running, Exited)
                | (TerminateRequested, GracePeriod)
                | (GracePeriod, ForceKilled)
                | (GracePeriod, Exited)
                | (ForceKilled, Exited)
        )
    }
}

impl fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShutdownPhase::Running => "running",
            ShutdownPhase::TerminateRequested => "terminate-requested",
            ShutdownPhase::GracePeriod => "grace-period",
            ShutdownPhase::ForceKilled => "force-killed",
            ShutdownPhase::Exited => "exited",
        };
        f.write_str(name)
    }
}

/// Outcome of [`supervise`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supervision {
    pub exit: ProcessExit,
    pub cancelled: bool,
    /// Every phase visited, starting with `Running` and ending with `Exited`.
    pub phases: Vec<ShutdownPhase>,
}

impl Supervision {
    pub fn final_phase(&self) -> ShutdownPhase {
        self.phases.last().copied().unwrap_or(ShutdownPhase::Running)
    }

    pub fn force_killed(&self) -> bool {
        self.phases.contains(&ShutdownPhase::ForceKilled)
    }
}

struct PhaseLog {
    phases: Vec<ShutdownPhase>,
}

impl PhaseLog {
    fn new() -> Self {
        Self {
            phases: vec![ShutdownPhase::Running],
        }
    }

    fn advance(&mut self, next: ShutdownPhase) {
        let current = self.phases.last().copied().unwrap_or(ShutdownPhase::Running);
        debug_assert!(current.can_advance_to(next), "{current} -> {next}");
        tracing::debug!(from = %current, to = %next, "runner shutdown phase");
        self.phases.push(next);
    }
}

/// Wait for `handle` to exit, or shut it down once `cancel` fires.
///
/// Shutdown sends SIGTERM to the group, waits up to `grace`, then sends
/// SIGKILL to the group and kills the tracked process directly. Signal
/// failures are logged and the sequence continues; only wait failures are
/// returned.
pub async fn supervise<H>(
    handle: &mut H,
    cancel: &CancellationToken,
    grace: Duration,
) -> Result<Supervision, ProcessError>
where
    H: ProcessHandle + ?Sized,
{
    let mut log = PhaseLog::new();

    tokio::select! {
        biased;
        exit = handle.wait() => {
            let exit = exit?;
            log.advance(ShutdownPhase::Exited);
            return Ok(Supervision { exit, cancelled: false, phases: log.phases });
        }
        _ = cancel.cancelled() => {}
    }

    log.advance(ShutdownPhase::TerminateRequested);
    if let Err(err) = handle.signal_group(Signal::SIGTERM) {
        tracing::warn!(error = %err, "failed to request runner termination");
    }

    log.advance(ShutdownPhase::GracePeriod);
    if let Ok(exit) = tokio::time::timeout(grace, handle.wait()).await {
        let exit = exit?;
        log.advance(ShutdownPhase::Exited);
        return Ok(Supervision {
            exit,
            cancelled: true,
            phases: log.phases,
        });
    }

    log.advance(ShutdownPhase::ForceKilled);
    tracing::warn!(grace_ms = grace.as_millis() as u64, "runner ignored SIGTERM; killing process group");
    if let Err(err) = handle.kill_group() {
        tracing::warn!(error = %err, "failed to kill runner process group");
    }
    if let Err(err) = handle.kill() {
        tracing::warn!(error = %err, "failed to kill runner process");
    }

    let exit = handle.wait().await?;
    log.advance(ShutdownPhase::Exited);
    Ok(Supervision {
        exit,
        cancelled: true,
        phases: log.phases,
    })
}
