//! Step runners - how a rendered step is turned into a process

use async_trait::async_trait;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Error types for runner operations
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("timed out after {0} seconds")]
    Timeout(u64),

    #[error("I/O error: {0}")]
    Io(String),
}

/// A fully rendered command ready to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInvocation {
    /// Step identifier (for logging)
    pub step_id: String,

    /// Executable
    pub program: String,

    /// Arguments
    pub args: Vec<String>,

    /// Environment layered over the runner's own environment
    pub env: BTreeMap<String, String>,

    /// Working directory
    pub working_dir: PathBuf,

    /// Timeout in seconds
    pub timeout_secs: u64,
}

impl StepInvocation {
    /// The script passed to the shell, if this is a shell invocation
    pub fn script(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (-1 when terminated by a signal)
    pub exit_code: i32,

    /// Captured stdout
    pub stdout: String,

    /// Captured stderr
    pub stderr: String,

    /// Wall-clock duration
    pub duration: Duration,
}

impl CommandOutput {
    /// Whether the process exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Trait for step execution - allows for different implementations
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run an invocation to completion
    async fn run(&self, invocation: &StepInvocation) -> Result<CommandOutput, RunnerError>;
}

/// Grace period between SIGTERM and SIGKILL for a timed-out step
const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// How long output is still read after the shell has exited
const DRAIN_PERIOD: Duration = Duration::from_secs(2);

/// Runs invocations as local subprocesses, each in its own process group
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepRunner for ShellRunner {
    async fn run(&self, invocation: &StepInvocation) -> Result<CommandOutput, RunnerError> {
        debug!(
            "Spawning {} for step {} in {}",
            invocation.program,
            invocation.step_id,
            invocation.working_dir.display()
        );

        let start = Instant::now();
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(&invocation.env)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child: AsyncGroupChild = command.group_spawn().map_err(|e| RunnerError::Spawn {
            program: invocation.program.clone(),
            message: e.to_string(),
        })?;
        let pgid = child.inner().id();

        let mut stdout = tokio::spawn(read_pipe(child.inner().stdout.take()));
        let mut stderr = tokio::spawn(read_pipe(child.inner().stderr.take()));

        // Wait for the shell itself; background jobs may keep the pipes open
        let waited = timeout(
            Duration::from_secs(invocation.timeout_secs),
            child.inner().wait(),
        )
        .await;

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                terminate_process_group(&mut child, GRACE_PERIOD).await;
                stdout.abort();
                stderr.abort();
                return Err(RunnerError::Io(e.to_string()));
            }
            Err(_) => {
                warn!(
                    "Step {} timed out after {} seconds",
                    invocation.step_id, invocation.timeout_secs
                );
                terminate_process_group(&mut child, GRACE_PERIOD).await;
                stdout.abort();
                stderr.abort();
                return Err(RunnerError::Timeout(invocation.timeout_secs));
            }
        };

        // Nothing the step started outlives it
        kill_leftovers(pgid);

        let stdout = drain(&mut stdout).await;
        let stderr = drain(&mut stderr).await;

        let exit_code = status.code().unwrap_or(-1);
        if exit_code != 0 {
            warn!("Step {} exited with code {}", invocation.step_id, exit_code);
        }

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
            duration: start.elapsed(),
        })
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            warn!("error reading step output: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn drain(reader: &mut JoinHandle<String>) -> String {
    match timeout(DRAIN_PERIOD, &mut *reader).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!("output reader failed: {}", e);
            String::new()
        }
        Err(_) => {
            warn!("step output still open after the shell exited, discarding it");
            reader.abort();
            String::new()
        }
    }
}

/// SIGTERM the process group, SIGKILL after `grace`, then reap
#[cfg(unix)]
async fn terminate_process_group(child: &mut AsyncGroupChild, grace: Duration) {
    use nix::sys::signal::Signal;

    let Some(pgid) = child.inner().id() else {
        return;
    };
    signal_group(pgid, Signal::SIGTERM);

    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        if child.inner().try_wait().ok().flatten().is_some() {
            signal_group(pgid, Signal::SIGKILL);
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    signal_group(pgid, Signal::SIGKILL);
    let _ = child.inner().wait().await;
}

#[cfg(not(unix))]
async fn terminate_process_group(child: &mut AsyncGroupChild, _grace: Duration) {
    let _ = child.kill().await;
    let _ = child.wait().await;
}

#[cfg(unix)]
fn kill_leftovers(pgid: Option<u32>) {
    if let Some(pgid) = pgid {
        signal_group(pgid, nix::sys::signal::Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_leftovers(_pgid: Option<u32>) {}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: nix::sys::signal::Signal) {
    use nix::errno::Errno;
    use nix::unistd::Pid;

    if let Err(e) = nix::sys::signal::kill(Pid::from_raw(-(pgid as i32)), signal) {
        if e != Errno::ESRCH {
            warn!(pgid, error = ?e, "signal to process group failed");
        }
    }
}
