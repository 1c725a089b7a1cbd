//! Timeout-bounded command execution
//!
//! Each run spawns one shell in its own process group under a supervisor
//! task. The caller races the supervisor against the deadline; on expiry the
//! supervisor is cancelled, kills the whole group, reaps the child and only
//! then is joined. No run returns while its child is still alive.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default wall-clock limit per command
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Process runner failures
#[derive(Error, Debug)]
pub enum RunError {
    #[error("command cannot be empty")]
    EmptyCommand,

    #[error("failed to launch command: {0}")]
    LaunchFailed(#[source] std::io::Error),

    #[error("execution timed out after {} seconds", .0.as_secs())]
    TimedOut(Duration),

    #[error("execution cancelled")]
    Cancelled,

    #[error("failed waiting for command: {0}")]
    Wait(#[source] std::io::Error),

    #[error("supervisor task failed: {0}")]
    Supervisor(String),
}

/// Captured result of a command that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was ended by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

enum Supervised {
    Exited(ProcessOutput),
    Killed,
}

/// Runs shell commands with a fixed deadline
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    shell: String,
    shell_args: Vec<String>,
    timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        let (shell, shell_args) = if cfg!(windows) {
            ("cmd", vec!["/C".to_string()])
        } else {
            ("sh", vec!["-c".to_string()])
        };
        Self {
            shell: shell.to_string(),
            shell_args,
            timeout,
        }
    }

    /// Use a different shell, e.g. `bash` with `["-lc"]`
    pub fn with_shell(mut self, shell: impl Into<String>, args: Vec<String>) -> Self {
        self.shell = shell.into();
        self.shell_args = args;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run(&self, command: &str, cwd: &Path) -> Result<ProcessOutput, RunError> {
        self.run_with_cancel(command, cwd, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but `cancel` also stops the command early
    pub async fn run_with_cancel(
        &self,
        command: &str,
        cwd: &Path,
        cancel: CancellationToken,
    ) -> Result<ProcessOutput, RunError> {
        if command.trim().is_empty() {
            return Err(RunError::EmptyCommand);
        }

        let mut cmd = Command::new(&self.shell);
        cmd.args(&self.shell_args)
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(RunError::LaunchFailed)?;
        debug!("Spawned {:?} (pid {:?}) in {:?}", command, child.id(), cwd);

        let stop = cancel.child_token();
        // Dropping this future mid-run still tears the child down.
        let _guard = stop.clone().drop_guard();
        let mut supervisor = tokio::spawn(supervise(child, stop.clone()));

        let mut timed_out = false;
        tokio::select! {
            joined = &mut supervisor => return finish(joined, false, self.timeout),
            _ = tokio::time::sleep(self.timeout) => timed_out = true,
            _ = cancel.cancelled() => {}
        }

        stop.cancel();
        let joined = (&mut supervisor).await;
        if timed_out {
            warn!("Command timed out after {:?}: {}", self.timeout, command);
        }
        finish(joined, timed_out, self.timeout)
    }
}

fn finish(
    joined: Result<Result<Supervised, RunError>, tokio::task::JoinError>,
    timed_out: bool,
    timeout: Duration,
) -> Result<ProcessOutput, RunError> {
    match joined {
        Ok(Ok(Supervised::Exited(output))) => Ok(output),
        Ok(Ok(Supervised::Killed)) if timed_out => Err(RunError::TimedOut(timeout)),
        Ok(Ok(Supervised::Killed)) => Err(RunError::Cancelled),
        Ok(Err(e)) => Err(e),
        Err(e) => Err(RunError::Supervisor(e.to_string())),
    }
}

async fn supervise(mut child: Child, stop: CancellationToken) -> Result<Supervised, RunError> {
    let pid = child.id();
    let stdout = tokio::spawn(read_all(child.stdout.take()));
    let stderr = tokio::spawn(read_all(child.stderr.take()));
    let readers = [stdout.abort_handle(), stderr.abort_handle()];

    // Background jobs may hold the pipes open after the shell exits, so the
    // readers are part of what the deadline covers.
    let finished = async {
        let status = child.wait().await;
        let (out, err) = tokio::join!(stdout, stderr);
        (status, out, err)
    };

    let completed = tokio::select! {
        done = finished => Some(done),
        _ = stop.cancelled() => None,
    };

    let Some((status, out, err)) = completed else {
        terminate(&mut child, pid).await;
        for reader in readers {
            reader.abort();
        }
        return Ok(Supervised::Killed);
    };

    let status = status.map_err(RunError::Wait)?;
    Ok(Supervised::Exited(ProcessOutput {
        exit_code: status.code(),
        stdout: String::from_utf8_lossy(&out.unwrap_or_default()).into_owned(),
        stderr: String::from_utf8_lossy(&err.unwrap_or_default()).into_owned(),
    }))
}

async fn read_all<R>(reader: Option<R>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buf).await {
            debug!("Pipe read ended early: {}", e);
        }
    }
    buf
}

/// Kill the process group, then the direct child, and reap it
async fn terminate(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        kill_group(pid);
    }
    if let Err(e) = child.kill().await {
        debug!("Child already gone: {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("Failed to reap child: {}", e);
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) with a negative pid signals the group created at spawn.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!("killpg({}) failed: {}", pgid, std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}
