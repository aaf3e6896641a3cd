//! External process execution
//!
//! Runs the external toolchain as child processes:
//! - explicit argument vectors, never a shell string
//! - stdout and stderr captured into one buffer in arrival order
//! - a wall-clock timeout after which the child is killed
//! - kill-on-drop, so abandoning the job also stops the process
//!
//! On Unix each tool runs in its own process group. Timeouts, abandoned jobs
//! and normal exits all end with the whole group killed, so helpers a script
//! started in the background never outlive the job.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Errors from running an external tool
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited unsuccessfully
    #[error("{program} exited with status {}", .exit_code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    NonZeroExit {
        program: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// The process exceeded its time budget and was killed
    #[error("{program} timed out after {} seconds", .timeout.as_secs())]
    Timeout {
        program: String,
        timeout: Duration,
        output: String,
    },
}

impl ProcessError {
    /// Output captured before the failure, if any
    pub fn output(&self) -> &str {
        match self {
            ProcessError::Spawn { .. } => "",
            ProcessError::NonZeroExit { output, .. } => output,
            ProcessError::Timeout { output, .. } => output,
        }
    }
}

/// One invocation of an external executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

/// Outcome of a successful invocation
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    /// stdout and stderr interleaved in the order they were read
    pub combined_output: String,
    pub duration: Duration,
}

/// Runs external executables
///
/// A non-zero exit is an error; callers only see output of runs that
/// succeeded, or the output carried inside the error.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError>;
}

/// Runs tools as local child processes
#[derive(Debug, Clone)]
pub struct LocalProcessRunner {
    timeout: Duration,
}

impl LocalProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ProcessRunner for LocalProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        let program = invocation.program.to_string_lossy().to_string();
        let start = Instant::now();

        debug!(
            "Executing {} {:?} in {}",
            program,
            invocation.args,
            invocation.working_dir.display()
        );

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own group, so the tool's helpers can be killed along with it
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Dropping the job future kills the whole group through this guard
        let mut group = ProcessGroup::new(child.id());

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, tx.clone()));
        }
        drop(tx);

        let mut combined = Vec::new();
        let waited = tokio::time::timeout(self.timeout, async {
            loop {
                tokio::select! {
                    Some(chunk) = rx.recv() => combined.extend_from_slice(&chunk),
                    status = child.wait() => break status,
                }
            }
        })
        .await;

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => {
                error!("Failed to wait for {}: {}", program, source);
                return Err(ProcessError::Spawn { program, source });
            }
            Err(_) => {
                group.kill();
                if let Err(e) = child.kill().await {
                    error!("Failed to kill timed out {}: {}", program, e);
                }
                while let Ok(chunk) = rx.try_recv() {
                    combined.extend_from_slice(&chunk);
                }
                error!(
                    "{} timed out after {}s and was killed",
                    program,
                    self.timeout.as_secs()
                );
                return Err(ProcessError::Timeout {
                    program,
                    timeout: self.timeout,
                    output: String::from_utf8_lossy(&combined).to_string(),
                });
            }
        };

        // Leftover background processes would otherwise hold the pipes open
        group.kill();
        let drained = tokio::time::timeout(DRAIN_GRACE, async {
            while let Some(chunk) = rx.recv().await {
                combined.extend_from_slice(&chunk);
            }
        })
        .await;
        if drained.is_err() {
            warn!("Output of {} still open after exit, truncating capture", program);
        }

        let combined_output = String::from_utf8_lossy(&combined).to_string();
        let duration = start.elapsed();

        if !status.success() {
            debug!(
                "{} failed: exit_code={:?} output='{}'",
                program,
                status.code(),
                combined_output.trim()
            );
            return Err(ProcessError::NonZeroExit {
                program,
                exit_code: status.code(),
                output: combined_output,
            });
        }

        info!(
            duration_ms = duration.as_millis() as u64,
            output_len = combined_output.len(),
            "{} completed successfully",
            program
        );

        Ok(ProcessOutput {
            exit_code: status.code().unwrap_or(0),
            combined_output,
            duration,
        })
    }
}

/// How long output is still collected after the tool itself exited
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Kills every process in a tool's process group, at most once
///
/// Armed from spawn until [`ProcessGroup::kill`]; dropping it armed (job
/// future abandoned) kills the group too.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };

    // SAFETY: killpg only sends a signal, it touches no memory of ours
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        // ESRCH: the group is already empty
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!("Failed to kill process group {}: {}", pgid, err);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

/// Forwards everything read from one pipe into the shared channel
async fn pump<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::UnboundedSender<Vec<u8>>) {
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
        }
    }
}
