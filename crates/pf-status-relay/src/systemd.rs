//! Systemd service notifications
//!
//! Enabled when run under systemd with Type=notify; every call is a no-op
//! otherwise.

use crate::error::{RelayError, Result};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct SystemdNotifier {
    /// Is systemd socket available (NOTIFY_SOCKET env var set)?
    enabled: bool,
}

impl SystemdNotifier {
    pub fn new() -> Self {
        Self::with_enabled(std::env::var_os("NOTIFY_SOCKET").is_some())
    }

    fn with_enabled(enabled: bool) -> Self {
        if enabled {
            debug!("Systemd notification socket detected");
        }
        Self { enabled }
    }

    /// Send READY once the relay tasks are running.
    pub fn notify_ready(&self) -> Result<()> {
        self.notify(&[sd_notify::NotifyState::Ready], "READY")
    }

    /// Send STOPPING when shutdown begins.
    pub fn notify_stopping(&self) -> Result<()> {
        self.notify(&[sd_notify::NotifyState::Stopping], "STOPPING")
    }

    /// Send a free-form status line shown by `systemctl status`.
    pub fn notify_status(&self, message: &str) -> Result<()> {
        self.notify(&[sd_notify::NotifyState::Status(message)], "STATUS")
    }

    fn notify(&self, states: &[sd_notify::NotifyState<'_>], kind: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        sd_notify::notify(false, states).map_err(|e| {
            RelayError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to send {} notification: {}", kind, e),
            ))
        })?;

        debug!(kind, "Sent notification to systemd");
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for SystemdNotifier {
    fn default() -> Self {
        Self::new()
    }
}
