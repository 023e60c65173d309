//! Output capture for the supervised runner.
//!
//! Each stream is read in fixed-size chunks, appended to a capture buffer and
//! split into lines for the live sink. A line never occupies more than
//! `max_line_bytes` of memory in the splitter.

use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Incremental newline splitter with a hard per-line ceiling.
///
/// Overlong lines are emitted in `max_line_bytes` pieces. A trailing `\r` is
/// stripped and invalid UTF-8 is replaced.
#[derive(Debug)]
pub struct LineSplitter {
    pending: Vec<u8>,
    max_line_bytes: usize,
    /// Last emission was a forced split, so a directly following newline
    /// terminates nothing.
    just_split: bool,
}

impl LineSplitter {
    pub fn new(max_line_bytes: usize) -> Self {
        let max_line_bytes = max_line_bytes.max(1);
        Self {
            pending: Vec::with_capacity(max_line_bytes.min(READ_CHUNK_BYTES)),
            max_line_bytes,
            just_split: false,
        }
    }

    /// Feed a chunk and return the lines it completed.
    pub fn push(&mut self, mut chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        while !chunk.is_empty() {
            let room = self.max_line_bytes - self.pending.len();
            let window = &chunk[..chunk.len().min(room)];
            match window.iter().position(|byte| *byte == b'\n') {
                Some(newline) => {
                    let swallow = newline == 0 && self.pending.is_empty() && self.just_split;
                    self.pending.extend_from_slice(&window[..newline]);
                    if !swallow {
                        lines.push(self.take_line());
                    }
                    self.just_split = false;
                    chunk = &chunk[newline + 1..];
                }
                None => {
                    self.pending.extend_from_slice(window);
                    chunk = &chunk[window.len()..];
                    self.just_split = false;
                    if self.pending.len() == self.max_line_bytes {
                        lines.push(self.take_line());
                        self.just_split = true;
                    }
                }
            }
        }
        lines
    }

    /// Flush an unterminated final line.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn take_line(&mut self) -> String {
        if self.pending.last() == Some(&b'\r') {
            self.pending.pop();
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}

/// Which runner stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

/// Where live lines go while the runner is executing.
///
/// The channel is bounded; when it is full the line is dropped rather than
/// blocking the reader.
#[derive(Debug, Clone, Default)]
pub struct LiveSink {
    pub echo_stderr: bool,
    pub lines: Option<mpsc::Sender<String>>,
}

impl LiveSink {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn stderr() -> Self {
        Self {
            echo_stderr: true,
            lines: None,
        }
    }

    pub fn with_channel(mut self, sender: mpsc::Sender<String>) -> Self {
        self.lines = Some(sender);
        self
    }

    pub fn is_active(&self) -> bool {
        self.echo_stderr || self.lines.is_some()
    }

    pub fn emit(&self, line: &str) {
        if self.echo_stderr {
            eprintln!("{}", line);
        }
        if let Some(sender) = &self.lines {
            match sender.try_send(line.to_string()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!("live output channel full; dropping line");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }
}

/// Raw bytes read from one stream, shared with the reader task.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn append(&self, chunk: &[u8]) {
        self.bytes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(chunk);
    }

    pub fn to_string_lossy(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Copy `reader` into `capture`, forwarding complete lines to `sink`.
pub async fn tee_stream<R>(
    mut reader: R,
    kind: StreamKind,
    capture: CaptureBuffer,
    sink: LiveSink,
    max_line_bytes: usize,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::new(max_line_bytes);
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        capture.append(&chunk[..read]);
        if sink.is_active() {
            for line in splitter.push(&chunk[..read]) {
                sink.emit(&line);
            }
        }
    }
    if let Some(line) = splitter.finish().filter(|_| sink.is_active()) {
        sink.emit(&line);
    }
    tracing::debug!(stream = kind.as_str(), "runner stream closed");
    Ok(())
}
