use crate::log::{self, LogKind, LogSink};
use crate::logger::{Logger, SharedLogger};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_millis(5000);

/// How long to wait for an immediate spawn failure or exit before probing.
pub const SPAWN_GRACE_PERIOD: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn {bin}: {source}")]
    SpawnFailed {
        bin: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{bin} exited during start-up with {status}")]
    EarlyExit { bin: PathBuf, status: ExitStatus },
    #[error("failed to send {signal} to process {pid}: {reason}")]
    Signal {
        pid: u32,
        signal: &'static str,
        reason: String,
    },
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

// ---------------------------------------------------------------------------
// Stderr handling
// ---------------------------------------------------------------------------

/// How the child's stderr is wired.
#[derive(Clone, Debug)]
pub enum StderrMode {
    Ignore,
    Inherit,
    /// Piped and copied into the sink.
    Sink(LogSink),
}

// ---------------------------------------------------------------------------
// NginxProcess
// ---------------------------------------------------------------------------

pub struct NginxProcess {
    bin: PathBuf,
    child: Child,
    pid: u32,
    stderr_copier: Option<JoinHandle<()>>,
}

impl NginxProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }

    /// Races `grace` against the process failing or exiting. Processes that
    /// cannot run at all are reported here instead of timing out later.
    pub async fn wait_for_spawn_error(&mut self, grace: Duration) -> Result<(), ProcessError> {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Err(_elapsed) => Ok(()),
            Ok(Ok(status)) => Err(ProcessError::EarlyExit {
                bin: self.bin.clone(),
                status,
            }),
            Ok(Err(source)) => Err(ProcessError::SpawnFailed {
                bin: self.bin.clone(),
                source,
            }),
        }
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// `None` while the process is running.
    pub fn exit_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Waits until the stderr copier has forwarded everything the process
    /// wrote. Only returns once the process has exited.
    pub async fn drain_stderr(&mut self) {
        if let Some(task) = self.stderr_copier.take() {
            let _ = task.await;
        }
    }

    #[cfg(unix)]
    pub fn send_signal(&self, signal: nix::sys::signal::Signal) -> Result<(), ProcessError> {
        let pid = nix::unistd::Pid::from_raw(self.pid as i32);
        nix::sys::signal::kill(pid, signal).map_err(|e| ProcessError::Signal {
            pid: self.pid,
            signal: signal.as_str(),
            reason: e.to_string(),
        })
    }

    /// Asks nginx to reload its configuration.
    pub fn reload(&self) -> Result<(), ProcessError> {
        #[cfg(unix)]
        {
            self.send_signal(nix::sys::signal::Signal::SIGHUP)
        }
        #[cfg(not(unix))]
        {
            Err(ProcessError::Unsupported("reload"))
        }
    }

    /// Sends SIGTERM and waits up to `kill_timeout` for the process to exit,
    /// then kills it.
    pub async fn terminate(&mut self, kill_timeout: Duration, logger: &dyn Logger) {
        if !self.is_running() {
            return;
        }
        logger.debug(&format!("stopping nginx ({})", self.pid));

        #[cfg(unix)]
        {
            if self.send_signal(nix::sys::signal::Signal::SIGTERM).is_ok()
                && tokio::time::timeout(kill_timeout, self.child.wait()).await.is_ok()
            {
                return;
            }
            logger.warn(&format!(
                "nginx ({}) did not exit within {kill_timeout:?}, killing it",
                self.pid
            ));
        }
        #[cfg(not(unix))]
        let _ = kill_timeout;

        if let Err(e) = self.child.kill().await {
            logger.warn(&format!("failed to kill nginx ({}): {e}", self.pid));
        }
    }
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// Starts `<bin> -c <config_path> -p <work_dir>`.
pub fn spawn_nginx(
    bin: &Path,
    config_path: &Path,
    work_dir: &Path,
    stderr: &StderrMode,
    logger: SharedLogger,
) -> Result<NginxProcess, ProcessError> {
    let mut cmd = Command::new(bin);
    cmd.arg("-c")
        .arg(config_path)
        .arg("-p")
        .arg(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .kill_on_drop(true);

    cmd.stderr(match stderr {
        StderrMode::Ignore => Stdio::null(),
        StderrMode::Inherit => Stdio::inherit(),
        StderrMode::Sink(_) => Stdio::piped(),
    });

    let mut child = cmd.spawn().map_err(|source| ProcessError::SpawnFailed {
        bin: bin.to_path_buf(),
        source,
    })?;

    // `id()` is only `None` once the child has been reaped.
    let pid = child.id().unwrap_or_default();
    logger.debug(&format!("nginx started with PID {pid}"));

    let stderr_copier = match (stderr, child.stderr.take()) {
        (StderrMode::Sink(sink), Some(pipe)) => Some(log::spawn_log_copier(
            LogKind::Error,
            pipe,
            sink.clone(),
            logger,
        )),
        _ => None,
    };

    Ok(NginxProcess {
        bin: bin.to_path_buf(),
        child,
        pid,
        stderr_copier,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
