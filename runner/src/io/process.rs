//! Helpers for running child processes with timeouts, cancellation and bounded output.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

/// How long to keep draining pipes after the child is gone. A grandchild that
/// inherited stdout can otherwise hold the pipe open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// How the child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(ExitStatus),
    /// Killed after exceeding the timeout.
    TimedOut,
    /// Killed because the run was cancelled.
    Cancelled,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub termination: Termination,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        matches!(self.termination, Termination::Exited(status) if status.success())
    }

    pub fn stdout_truncated_notice(&self, label: &str) -> String {
        if self.stdout_truncated > 0 {
            format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            )
        } else {
            String::new()
        }
    }

    pub fn stderr_truncated_notice(&self, label: &str) -> String {
        if self.stderr_truncated > 0 {
            format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            )
        } else {
            String::new()
        }
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// `stdin` is written and the pipe closed while the child runs, so a child that reads
/// a confirmation answer never blocks on a terminal. Output is read concurrently; `output_limit_bytes` bounds what is kept in
/// memory (bytes beyond it are discarded while still draining the pipe).
///
/// The child is killed when `timeout` elapses or `cancel` fires.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub async fn run_command(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
    cancel: &CancellationToken,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = tokio::spawn(read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = tokio::spawn(read_stream_limited(stderr, output_limit_bytes));

    // The write runs beside the wait so a child that never reads stdin is still
    // bound by the timeout and cancellation.
    let stdin_handle = match stdin {
        Some(input) => {
            let child_stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            Some(tokio::spawn(write_stdin(child_stdin, input.to_vec())))
        }
        None => None,
    };

    enum Waited {
        Exited(std::io::Result<ExitStatus>),
        TimedOut,
        Cancelled,
    }

    let waited = tokio::select! {
        status = child.wait() => Waited::Exited(status),
        _ = tokio::time::sleep(timeout) => Waited::TimedOut,
        _ = cancel.cancelled() => Waited::Cancelled,
    };

    let termination = match waited {
        Waited::Exited(status) => Termination::Exited(status.context("wait for command")?),
        Waited::TimedOut => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            child.kill().await.context("kill command")?;
            Termination::TimedOut
        }
        Waited::Cancelled => {
            warn!("run cancelled, killing command");
            child.kill().await.context("kill command")?;
            Termination::Cancelled
        }
    };

    if let Some(handle) = stdin_handle {
        handle.abort();
    }

    let (stdout, stdout_truncated) = join_output(stdout_handle).await.context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).await.context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(?termination, "command finished");
    Ok(CommandOutput {
        termination,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
    })
}

async fn join_output(handle: JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    let abort = handle.abort_handle();
    match tokio::time::timeout(DRAIN_GRACE, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(anyhow!("output reader task panicked")),
        Err(_) => {
            warn!("output pipe still open after child exit, abandoning reader");
            abort.abort();
            Ok((Vec::new(), 0))
        }
    }
}

async fn write_stdin(mut child_stdin: ChildStdin, input: Vec<u8>) {
    match child_stdin.write_all(&input).await {
        Ok(()) => {}
        // The child exited (or closed stdin) without reading the answer.
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
            debug!("child closed stdin before reading input");
        }
        Err(e) => warn!(err = %e, "failed to write child stdin"),
    }
}

async fn read_stream_limited<R: AsyncRead + Unpin>(
    mut reader: R,
    limit: usize,
) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).await.context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
