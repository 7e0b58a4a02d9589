//! Transcoder process spawning and supervision.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use camlink_common::error::{CamlinkError, CamlinkResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::oneshot;

use crate::profile::{Invocation, ProfileKind};

/// Byte stream produced by a transcoder on its standard output.
pub type ProcessOutput = Pin<Box<dyn AsyncRead + Send>>;

/// How a transcoder process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    /// The process ended on its own.
    Exited { code: Option<i32> },
    /// The process was killed through its handle.
    Killed,
    /// Waiting on the process failed.
    WaitFailed { message: String },
}

impl ProcessExit {
    pub fn is_killed(&self) -> bool {
        matches!(self, Self::Killed)
    }
}

/// Abstract interface for launching transcoder invocations.
///
/// Implementations must not block: the returned handle owns a supervisor
/// that reaps the process in the background.
pub trait ProcessSpawner: Send + Sync {
    /// Start one process for the invocation. `label` tags its logs.
    fn spawn(&self, label: &str, invocation: &Invocation) -> CamlinkResult<TranscoderProcess>;

    /// The executable this spawner runs, for diagnostics.
    fn program(&self) -> &Path;
}

/// Signals a process to terminate. Called at most once.
pub type KillSwitch = Box<dyn FnOnce() + Send>;

/// Ownership handle of one running transcoder.
///
/// Dropping the handle kills the process. The kill is fire-and-forget: the
/// supervisor reaps the process after the handle is gone.
pub struct TranscoderProcess {
    label: String,
    pid: Option<u32>,
    stdout: Option<ProcessOutput>,
    kill: Option<KillSwitch>,
    exit_rx: Option<oneshot::Receiver<ProcessExit>>,
}

impl TranscoderProcess {
    /// Assemble a handle from its parts. `kill` runs when the handle is
    /// killed or dropped; whoever owns the process must then report on the
    /// sender side of `exit_rx`.
    pub fn from_parts(
        label: impl Into<String>,
        pid: Option<u32>,
        stdout: Option<ProcessOutput>,
        kill: KillSwitch,
        exit_rx: oneshot::Receiver<ProcessExit>,
    ) -> Self {
        Self {
            label: label.into(),
            pid,
            stdout,
            kill: Some(kill),
            exit_rx: Some(exit_rx),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take the standard output stream. Only relay invocations have one.
    pub fn take_stdout(&mut self) -> Option<ProcessOutput> {
        self.stdout.take()
    }

    /// Take the exit notification, resolved once the process is gone.
    pub fn take_exit(&mut self) -> Option<oneshot::Receiver<ProcessExit>> {
        self.exit_rx.take()
    }

    /// Kill the process without waiting for it to exit.
    pub fn kill(self) {
        tracing::debug!(process = %self.label, pid = ?self.pid, "Killing transcoder");
        drop(self);
    }
}

impl Drop for TranscoderProcess {
    fn drop(&mut self) {
        if let Some(kill) = self.kill.take() {
            kill();
        }
    }
}

impl std::fmt::Debug for TranscoderProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscoderProcess")
            .field("label", &self.label)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

/// Spawns real transcoder processes through `tokio::process`.
#[derive(Debug, Clone)]
pub struct CommandSpawner {
    program: PathBuf,
}

impl CommandSpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ProcessSpawner for CommandSpawner {
    fn spawn(&self, label: &str, invocation: &Invocation) -> CamlinkResult<TranscoderProcess> {
        tracing::debug!(
            process = %label,
            command = %invocation.command_line(&self.program),
            "Spawning transcoder"
        );

        let stdout = if invocation.kind == ProfileKind::Relay {
            Stdio::piped()
        } else {
            Stdio::null()
        };

        let mut child = Command::new(&self.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CamlinkError::transcoder(format!(
                    "Failed to start {} for {label}: {e}",
                    self.program.display()
                ))
            })?;

        let pid = child.id();
        let stdout = child
            .stdout
            .take()
            .map(|out| Box::pin(out) as ProcessOutput);

        // Drain stderr concurrently so the transcoder never blocks on a full pipe.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_diagnostics(label.to_string(), stderr));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(supervise(label.to_string(), child, kill_rx, exit_tx));

        tracing::info!(process = %label, pid = ?pid, profile = %invocation.kind, "Transcoder started");

        let kill: KillSwitch = Box::new(move || {
            let _ = kill_tx.send(());
        });
        Ok(TranscoderProcess::from_parts(
            label, pid, stdout, kill, exit_rx,
        ))
    }

    fn program(&self) -> &Path {
        &self.program
    }
}

/// Wait for the child to exit or for a kill request, whichever comes first.
async fn supervise(
    label: String,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: oneshot::Sender<ProcessExit>,
) {
    let exit = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => ProcessExit::Exited { code: status.code() },
            Err(e) => ProcessExit::WaitFailed { message: e.to_string() },
        },
        _ = kill_rx => {
            if let Err(e) = child.start_kill() {
                tracing::warn!(process = %label, error = %e, "Failed to signal transcoder");
            }
            let _ = child.wait().await;
            ProcessExit::Killed
        }
    };

    match &exit {
        ProcessExit::Killed => tracing::debug!(process = %label, "Transcoder killed"),
        ProcessExit::Exited { code } => {
            tracing::info!(process = %label, code = ?code, "Transcoder exited")
        }
        ProcessExit::WaitFailed { message } => {
            tracing::warn!(process = %label, error = %message, "Failed to wait on transcoder")
        }
    }

    let _ = exit_tx.send(exit);
}

async fn drain_diagnostics(label: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if !line.is_empty() {
                    tracing::warn!(target: "camlink::transcoder", process = %label, "{line}");
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(process = %label, error = %e, "Stopped reading transcoder diagnostics");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let spawner = CommandSpawner::new("/nonexistent/camlink-test-transcoder");
        let invocation = Invocation::capture("/videos/a.mp4", Path::new("/tmp"), None);
        let err = spawner.spawn("ch1-capture", &invocation).unwrap_err();
        assert!(matches!(err, CamlinkError::Transcoder { .. }));
        assert!(err.to_string().contains("ch1-capture"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_reports_killed() {
        let spawner = CommandSpawner::new("sleep");
        let invocation = Invocation {
            kind: ProfileKind::Capture,
            args: vec!["30".to_string()],
        };
        let mut process = spawner.spawn("sleeper", &invocation).unwrap();
        assert!(process.pid().is_some());
        let exit = process.take_exit().unwrap();

        process.kill();
        let exit = tokio::time::timeout(Duration::from_secs(5), exit)
            .await
            .expect("supervisor should report exit")
            .unwrap();
        assert_eq!(exit, ProcessExit::Killed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_natural_exit_reports_code() {
        let spawner = CommandSpawner::new("sh");
        let invocation = Invocation {
            kind: ProfileKind::Relay,
            args: vec!["-c".to_string(), "printf hi; exit 3".to_string()],
        };
        let mut process = spawner.spawn("short-lived", &invocation).unwrap();
        let mut stdout = process.take_stdout().expect("relay has stdout");
        let exit = process.take_exit().unwrap();

        let mut out = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut stdout, &mut out)
            .await
            .unwrap();
        assert_eq!(out, b"hi");

        let exit = tokio::time::timeout(Duration::from_secs(5), exit)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, ProcessExit::Exited { code: Some(3) });
        drop(process);
    }
}
