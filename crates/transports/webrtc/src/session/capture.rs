//! External capture process wrapper
//!
//! The encoder pipeline is a child process that writes RTP to the video
//! socket. It is acquired after both media sockets are bound and released by
//! session cleanup (or on drop).

use crate::config::CaptureConfig;
use crate::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Time allowed for the child to exit after being killed
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Running capture child
#[derive(Debug)]
pub struct CaptureProcess {
    program: String,
    pid: Option<u32>,
    child: Option<Child>,
}

impl CaptureProcess {
    /// Launch the configured capture program
    pub fn spawn(config: &CaptureConfig) -> Result<Self> {
        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            Error::Capture(format!("failed to launch {}: {}", config.program, e))
        })?;
        let pid = child.id();

        info!(pid = ?pid, "Capture process started: {} {}", config.program, config.args.join(" "));

        Ok(Self {
            program: config.program.clone(),
            pid,
            child: Some(child),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Kill the child and reap it
    ///
    /// Idempotent. A child that already exited is only reaped.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("Capture process {} had already exited: {}", self.program, status);
                return;
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to poll capture process {}: {}", self.program, e),
        }

        if let Err(e) = child.start_kill() {
            warn!("Failed to kill capture process {}: {}", self.program, e);
        }

        match tokio::time::timeout(STOP_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => info!(pid = ?self.pid, "Capture process stopped: {}", status),
            Ok(Err(e)) => warn!("Failed to reap capture process {}: {}", self.program, e),
            Err(_) => warn!(
                "Capture process {} did not exit within {:?}",
                self.program, STOP_TIMEOUT
            ),
        }
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_and_stop() {
        let config = CaptureConfig {
            enabled: true,
            program: "sleep".to_string(),
            args: vec!["30".to_string()],
        };

        let mut capture = CaptureProcess::spawn(&config).unwrap();
        assert!(capture.pid().is_some());
        assert!(capture.is_running());

        capture.stop().await;
        assert!(!capture.is_running());

        // Second stop is a no-op
        capture.stop().await;
    }

    #[tokio::test]
    async fn test_missing_program_is_capture_error() {
        let config = CaptureConfig {
            enabled: true,
            program: "/nonexistent/mediarelay-capture".to_string(),
            args: Vec::new(),
        };

        let err = CaptureProcess::spawn(&config).unwrap_err();
        assert!(matches!(err, Error::Capture(_)));
        assert_eq!(err.stage(), Some("capture"));
    }
}
