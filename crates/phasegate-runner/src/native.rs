use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{RunnerError, timeout_millis};
use crate::{CommandSpec, ProcessOutput, RingBuffer};

/// Default cap on captured bytes per stream.
pub const DEFAULT_CAPTURE_BYTES: usize = 64 * 1024;

/// How long to keep draining pipes after the process exited.
///
/// Grandchildren that inherited the pipes can hold them open indefinitely.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Time between SIGTERM and SIGKILL when a task's process group is stopped.
#[cfg(unix)]
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

enum WaitOutcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Runs external processes directly (no shell) with a timeout and a
/// cancellation token.
///
/// On unix each task leads its own process group, and the whole group is
/// terminated when the timeout elapses or the token is cancelled, so
/// background processes started by the task cannot outlive it. The direct
/// child is also killed when the returned future is dropped.
#[derive(Debug, Clone, Copy)]
pub struct NativeRunner {
    capture_bytes: usize,
}

impl Default for NativeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeRunner {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            capture_bytes: DEFAULT_CAPTURE_BYTES,
        }
    }

    #[must_use]
    pub const fn with_capture_bytes(capture_bytes: usize) -> Self {
        Self { capture_bytes }
    }

    /// Run `cmd` to completion.
    ///
    /// A non-zero exit is not an error here; callers inspect
    /// [`ProcessOutput::success`].
    pub async fn run(
        &self,
        cmd: &CommandSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, RunnerError> {
        if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        let started = Instant::now();
        let mut command = cmd.to_tokio_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| RunnerError::SpawnFailed {
            program: cmd.program.to_string_lossy().into_owned(),
            reason: e.to_string(),
        })?;
        let pid = child.id();
        debug!(pid, command = %cmd.display_line(), "Spawned task process");

        let stdout_task = spawn_capture(child.stdout.take(), self.capture_bytes);
        let stderr_task = spawn_capture(child.stderr.take(), self.capture_bytes);

        let outcome = tokio::select! {
            status = child.wait() => WaitOutcome::Exited(status),
            () = tokio::time::sleep(timeout) => WaitOutcome::TimedOut,
            () = cancel.cancelled() => WaitOutcome::Cancelled,
        };

        match outcome {
            WaitOutcome::Exited(status) => {
                let status = status.map_err(|e| RunnerError::WaitFailed {
                    reason: e.to_string(),
                })?;
                let stdout = collect_capture(stdout_task, self.capture_bytes).await;
                let stderr = collect_capture(stderr_task, self.capture_bytes).await;
                let truncated = stdout.was_truncated() || stderr.was_truncated();
                let mut output = ProcessOutput::new(
                    stdout.into_bytes(),
                    stderr.into_bytes(),
                    status.code(),
                    started.elapsed(),
                );
                output.truncated = truncated;
                Ok(output)
            }
            WaitOutcome::TimedOut => {
                let timeout_ms = timeout_millis(timeout);
                warn!(timeout_ms, "Task process exceeded timeout; terminating");
                terminate(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                Err(RunnerError::Timeout { timeout_ms })
            }
            WaitOutcome::Cancelled => {
                debug!("Cancellation requested; terminating task process");
                terminate(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                Err(RunnerError::Cancelled)
            }
        }
    }
}

/// Stop the task and everything it started.
///
/// SIGTERM goes to the process group first; once the leader exits or the
/// grace period elapses, SIGKILL takes down whatever is left in the group.
async fn terminate(child: &mut tokio::process::Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::sys::signal::Signal;

        if let Some(pid) = pid {
            signal_group(pid, Signal::SIGTERM);
            let _ = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await;
            signal_group(pid, Signal::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }
    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill task process");
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    // ESRCH once the group is gone
    if let Err(e) = killpg(Pid::from_raw(raw), signal) {
        debug!(pid, ?signal, error = %e, "Process group signal not delivered");
    }
}

fn spawn_capture<R>(pipe: Option<R>, max_bytes: usize) -> JoinHandle<RingBuffer>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = RingBuffer::new(max_bytes);
        let Some(mut pipe) = pipe else {
            return buffer;
        };
        let mut chunk = vec![0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buffer.write(&chunk[..n]),
            }
        }
        buffer
    })
}

async fn collect_capture(task: JoinHandle<RingBuffer>, max_bytes: usize) -> RingBuffer {
    match tokio::time::timeout(DRAIN_TIMEOUT, task).await {
        Ok(Ok(buffer)) => buffer,
        Ok(Err(_)) | Err(_) => RingBuffer::new(max_bytes),
    }
}
