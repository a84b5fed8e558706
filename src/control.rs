//! External control of a running session
//!
//! The running instance writes its PID to the runtime directory and maps
//! signals to session commands:
//! - SIGUSR1: record
//! - SIGUSR2: save
//! - SIGINT / SIGTERM: shutdown
//!
//! `recstream control record|save` reads the PID file and sends the
//! matching signal.

use crate::cli::ControlAction;
use crate::config::Config;
use crate::error::{RecstreamError, Result};
use crate::runner::SessionCommand;
use crate::status::SessionSnapshot;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::{mpsc, watch};

/// Location of the PID file of the running instance
pub fn pid_file_path() -> PathBuf {
    Config::runtime_dir().join("pid")
}

/// Write PID file for external control via signals
pub fn write_pid_file() -> Option<PathBuf> {
    let pid_path = pid_file_path();

    if let Some(parent) = pid_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create PID file directory: {}", e);
            return None;
        }
    }

    let pid = std::process::id();
    if let Err(e) = std::fs::write(&pid_path, pid.to_string()) {
        tracing::warn!("Failed to write PID file: {}", e);
        return None;
    }

    tracing::debug!("PID file written: {:?} (pid={})", pid_path, pid);
    Some(pid_path)
}

/// Remove PID file on shutdown
pub fn cleanup_pid_file(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove PID file: {}", e);
        }
    }
}

/// Read the PID of the running instance
pub fn read_pid(path: &Path) -> Result<i32> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        RecstreamError::Config(format!(
            "No running session found ({}: {})",
            path.display(),
            e
        ))
    })?;
    contents
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
        .ok_or_else(|| {
            RecstreamError::Config(format!(
                "Invalid PID file {}: {:?}",
                path.display(),
                contents.trim()
            ))
        })
}

/// Signal the running instance
pub fn send(action: ControlAction) -> Result<()> {
    let pid = read_pid(&pid_file_path())?;
    tracing::debug!("Sending {:?} to pid {}", action, pid);
    send_signal(pid, action)
}

#[cfg(target_os = "linux")]
fn send_signal(pid: i32, action: ControlAction) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let sig = match action {
        ControlAction::Record => Signal::SIGUSR1,
        ControlAction::Save => Signal::SIGUSR2,
    };
    kill(Pid::from_raw(pid), sig).map_err(|e| match e {
        nix::errno::Errno::ESRCH => RecstreamError::Config(format!(
            "No running session (stale PID file, pid {})",
            pid
        )),
        other => RecstreamError::Io(std::io::Error::from(other)),
    })
}

#[cfg(not(target_os = "linux"))]
fn send_signal(pid: i32, action: ControlAction) -> Result<()> {
    let sig = match action {
        ControlAction::Record => "-USR1",
        ControlAction::Save => "-USR2",
    };
    let status = std::process::Command::new("kill")
        .args([sig, &pid.to_string()])
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(RecstreamError::Config(format!(
            "Failed to signal pid {} (is recstream running?)",
            pid
        )))
    }
}

/// Maps process signals to session commands
pub struct SignalListener {
    sigusr1: Signal,
    sigusr2: Signal,
    sigterm: Signal,
    sigint: Signal,
}

impl SignalListener {
    /// Install the handlers. Must be called inside a tokio runtime.
    pub fn new() -> Result<Self> {
        let install = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| {
                RecstreamError::Config(format!("Failed to set up {} handler: {}", name, e))
            })
        };
        Ok(Self {
            sigusr1: install(SignalKind::user_defined1(), "SIGUSR1")?,
            sigusr2: install(SignalKind::user_defined2(), "SIGUSR2")?,
            sigterm: install(SignalKind::terminate(), "SIGTERM")?,
            sigint: install(SignalKind::interrupt(), "SIGINT")?,
        })
    }

    /// Forward commands until shutdown is signalled or the session is gone
    pub async fn forward(mut self, tx: mpsc::Sender<SessionCommand>) {
        loop {
            let cmd = tokio::select! {
                _ = self.sigusr1.recv() => {
                    tracing::debug!("Received SIGUSR1 (record)");
                    SessionCommand::Record
                }
                _ = self.sigusr2.recv() => {
                    tracing::debug!("Received SIGUSR2 (save)");
                    SessionCommand::Save
                }
                _ = self.sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down");
                    SessionCommand::Shutdown
                }
                _ = self.sigint.recv() => {
                    tracing::info!("Received SIGINT, shutting down");
                    SessionCommand::Shutdown
                }
            };
            if tx.send(cmd).await.is_err() || cmd == SessionCommand::Shutdown {
                return;
            }
        }
    }
}

/// Record as soon as the device is ready, then save after `duration`.
///
/// If the device fails instead, the session is shut down since it can
/// never record.
pub async fn record_for(
    mut snapshots: watch::Receiver<SessionSnapshot>,
    tx: mpsc::Sender<SessionCommand>,
    duration: Duration,
) {
    let ready = match snapshots
        .wait_for(|s| s.device_ready || s.device_error.is_some())
        .await
    {
        Ok(snapshot) => snapshot.device_ready,
        Err(_) => return,
    };

    if !ready {
        let _ = tx.send(SessionCommand::Shutdown).await;
        return;
    }

    tracing::info!("Recording for {}s", duration.as_secs());
    if tx.send(SessionCommand::Record).await.is_err() {
        return;
    }
    tokio::time::sleep(duration).await;
    let _ = tx.send(SessionCommand::Save).await;
}
