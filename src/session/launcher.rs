//! Relay program launcher.
//!
//! The relay program registers a custom URL scheme. Opening
//! `<scheme>://-roomId:<session>` starts it and joins it to the session.

// ============================================================================
// Imports
// ============================================================================

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::Result;
use crate::identifiers::SessionId;

// ============================================================================
// Helpers
// ============================================================================

/// Builds the launcher URL for `session`.
#[must_use]
pub fn launcher_url(scheme: &str, session: &SessionId) -> String {
    format!("{scheme}://-roomId:{}", urlencoding::encode(session.as_str()))
}

// ============================================================================
// RelayLauncher
// ============================================================================

/// Starts the relay program.
#[async_trait]
pub trait RelayLauncher: Send + Sync {
    /// Opens the launcher URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL could not be handed to the system.
    async fn launch(&self, url: &str) -> Result<()>;
}

// ============================================================================
// SystemLauncher
// ============================================================================

/// Hands the URL to the platform's URL opener.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl SystemLauncher {
    fn command(url: &str) -> Command {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", ""]);
            cmd
        } else if cfg!(target_os = "macos") {
            Command::new("open")
        } else {
            Command::new("xdg-open")
        };
        cmd.arg(url);
        cmd
    }
}

#[async_trait]
impl RelayLauncher for SystemLauncher {
    async fn launch(&self, url: &str) -> Result<()> {
        let mut cmd = Self::command(url);

        // Suppress stdio
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let status = cmd.spawn()?.wait().await?;
        debug!(url, ?status, "Relay launcher exited");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
