//! Lifecycle of one capture program invocation.
//!
//! The runner spawns the configured interpreter with the capture script,
//! streams its stdout through a [`StreamExtractor`], keeps a bounded copy of
//! stdout and stderr for diagnostics, and resolves a single outcome once the
//! process exits.

use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use super::extractor::StreamExtractor;
use crate::config::CaptureConfig;

const READ_CHUNK: usize = 8 * 1024;

/// Errors from a capture invocation.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The program could not be started (missing binary, permissions).
    #[error("failed to start capture program '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program exited with a non-zero status. Signal termination is reported as `-1`.
    #[error("capture program failed with code {code}. Stderr: {stderr}")]
    ProcessExit {
        code: i32,
        stderr: String,
        stdout: String,
    },

    /// Exit status was zero but no marker line was seen.
    #[error("no payload received from capture program")]
    NoPayload {
        stdout: String,
        stderr: String,
        overflowed: bool,
    },

    /// The program outlived the configured capture timeout and was killed.
    #[error("capture program did not finish within {seconds}s")]
    Timeout { seconds: u64, stderr: String },
}

/// A payload extracted from a process that exited with status zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub payload: String,
    pub duration_ms: u64,
}

/// States of a single invocation.
///
/// `Idle → Starting → Running → Succeeded | Failed`, with `Starting → Failed`
/// when the spawn itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Starting,
    Running,
    Succeeded,
    Failed,
}

impl RunnerState {
    fn can_enter(self, next: RunnerState) -> bool {
        matches!(
            (self, next),
            (RunnerState::Idle, RunnerState::Starting)
                | (RunnerState::Starting, RunnerState::Running)
                | (RunnerState::Starting, RunnerState::Failed)
                | (RunnerState::Running, RunnerState::Succeeded)
                | (RunnerState::Running, RunnerState::Failed)
        )
    }
}

/// Runs the external capture program. One spawn attempt per [`CaptureRunner::run`].
#[derive(Debug, Clone)]
pub struct CaptureRunner {
    config: CaptureConfig,
}

impl CaptureRunner {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Human-readable command line, used for startup logging.
    pub fn command_line(&self) -> String {
        if self.config.script.is_empty() {
            self.config.interpreter.clone()
        } else {
            format!("{} {}", self.config.interpreter, self.config.script)
        }
    }

    pub async fn run(&self) -> Result<CaptureResult, CaptureError> {
        let mut invocation = Invocation::new(&self.config);
        invocation.drive().await
    }
}

struct Invocation<'a> {
    config: &'a CaptureConfig,
    state: RunnerState,
    started: Instant,
}

impl<'a> Invocation<'a> {
    fn new(config: &'a CaptureConfig) -> Self {
        Self {
            config,
            state: RunnerState::Idle,
            started: Instant::now(),
        }
    }

    fn enter(&mut self, next: RunnerState) {
        debug_assert!(
            self.state.can_enter(next),
            "illegal runner transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(from = ?self.state, to = ?next, "Capture runner transition");
        self.state = next;
    }

    async fn drive(&mut self) -> Result<CaptureResult, CaptureError> {
        self.enter(RunnerState::Starting);

        let mut child = match self.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("{e}");
                self.enter(RunnerState::Failed);
                return Err(e);
            }
        };
        self.enter(RunnerState::Running);

        let result = self.consume(&mut child).await;
        match &result {
            Ok(capture) => {
                tracing::info!(
                    bytes = capture.payload.len(),
                    duration_ms = capture.duration_ms,
                    "Capture completed"
                );
                self.enter(RunnerState::Succeeded);
            }
            Err(e) => {
                tracing::error!("Capture failed: {e}");
                self.enter(RunnerState::Failed);
            }
        }
        result
    }

    fn spawn(&self) -> Result<Child, CaptureError> {
        let mut cmd = Command::new(&self.config.interpreter);
        if !self.config.script.is_empty() {
            cmd.arg(&self.config.script);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(
            "Starting capture program: '{}' {:?}",
            self.config.interpreter,
            self.config.script
        );

        cmd.spawn().map_err(|source| CaptureError::Spawn {
            program: self.config.interpreter.clone(),
            source,
        })
    }

    async fn consume(&self, child: &mut Child) -> Result<CaptureResult, CaptureError> {
        let limit = self.config.diagnostic_bytes;
        let stderr_task = tokio::spawn(read_capped(child.stderr.take(), limit));
        let mut stdout = child.stdout.take();

        let mut extractor =
            StreamExtractor::new(self.config.marker.clone(), self.config.max_line_bytes);
        let mut stdout_log = CappedBuffer::new(limit);

        let streamed = async {
            if let Some(out) = stdout.as_mut() {
                let mut chunk = vec![0u8; READ_CHUNK];
                loop {
                    match out.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => {
                            stdout_log.push(&chunk[..n]);
                            extractor.feed(&chunk[..n]);
                        }
                        Err(e) => {
                            tracing::warn!("Reading capture stdout failed: {e}");
                            break;
                        }
                    }
                }
            }
            extractor.finish();
            child.wait().await
        };

        let waited = match self.config.timeout() {
            Some(limit) => tokio::time::timeout(limit, streamed).await.ok(),
            None => Some(streamed.await),
        };

        let Some(waited) = waited else {
            if let Err(e) = child.start_kill() {
                tracing::warn!("Failed to kill timed out capture program: {e}");
            }
            if let Err(e) = child.wait().await {
                tracing::warn!("Failed to reap timed out capture program: {e}");
            }
            let stderr = collect_stderr(stderr_task).await;
            return Err(CaptureError::Timeout {
                seconds: self.config.timeout_secs,
                stderr,
            });
        };

        let stderr = collect_stderr(stderr_task).await;
        let stdout = stdout_log.into_string();

        let status = match waited {
            Ok(status) => status,
            Err(e) => {
                return Err(CaptureError::ProcessExit {
                    code: -1,
                    stderr: format!("{stderr}\nfailed to wait for capture program: {e}"),
                    stdout,
                });
            }
        };

        if !status.success() {
            return Err(CaptureError::ProcessExit {
                code: status.code().unwrap_or(-1),
                stderr,
                stdout,
            });
        }

        let overflowed = extractor.overflowed();
        match extractor.into_payload() {
            Some(payload) => Ok(CaptureResult {
                payload,
                duration_ms: self.started.elapsed().as_millis() as u64,
            }),
            None => Err(CaptureError::NoPayload {
                stdout,
                stderr,
                overflowed,
            }),
        }
    }
}

async fn collect_stderr(task: tokio::task::JoinHandle<String>) -> String {
    match tokio::time::timeout(Duration::from_secs(2), task).await {
        Ok(Ok(stderr)) => stderr,
        Ok(Err(e)) => format!("<stderr reader failed: {e}>"),
        Err(_) => String::from("<stderr still open after exit>"),
    }
}

async fn read_capped<R>(reader: Option<R>, limit: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut log = CappedBuffer::new(limit);
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => log.push(&chunk[..n]),
            Err(e) => {
                tracing::warn!("Reading capture stderr failed: {e}");
                break;
            }
        }
    }
    log.into_string()
}

/// Keeps the first `limit` bytes of a stream and counts the rest.
struct CappedBuffer {
    bytes: Vec<u8>,
    limit: usize,
    dropped: usize,
}

impl CappedBuffer {
    fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.bytes.len());
        let take = room.min(chunk.len());
        self.bytes.extend_from_slice(&chunk[..take]);
        self.dropped += chunk.len() - take;
    }

    fn into_string(self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.dropped > 0 {
            text.push_str(&format!("\n[... {} more bytes truncated]", self.dropped));
        }
        text
    }
}
