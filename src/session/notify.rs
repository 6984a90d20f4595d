//! Consumer-facing notifications.
//!
//! The bridge never shows UI; it reports what happened through a
//! [`NotificationSink`] and the host decides how to present it.
//!
//! Sinks are called while internal locks are held, so they must not call
//! back into the bridge synchronously. Forwarding to a channel is the
//! expected pattern.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::identifiers::DeviceKey;

// ============================================================================
// DownloadAsset
// ============================================================================

/// Asset the user asked to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadAsset {
    /// Relay program installer.
    Connector,
    /// Setup guide.
    Guide,
    /// Board firmware source.
    Source,
}

impl fmt::Display for DownloadAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connector => "hardware",
            Self::Guide => "manual",
            Self::Source => "ino",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Notification
// ============================================================================

/// A signal from the bridge to its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// An endpoint became active or the session was torn down.
    ConnectionStateChanged {
        /// Whether a relay session is now live.
        connected: bool,
    },
    /// A new board was recognized and its driver activated.
    DeviceDriverChanged {
        /// Device key of the board.
        key: DeviceKey,
        /// Driver module name.
        driver: String,
        /// Whether the driver provides a monitor view.
        has_monitor: bool,
    },
    /// The relay session ended; the host should tell the user.
    Disconnected,
    /// Every endpoint gave up before any handshake completed.
    RelayUnreachable,
    /// An operation needed a relay session and there was none.
    NotConnected {
        /// The operation that was attempted.
        operation: String,
    },
    /// The relay asked for a driver module and the request was forwarded.
    HardwareModuleRequested {
        /// Module name.
        name: String,
    },
    /// The user asked to download a relay asset.
    RelayDownloadRequested(DownloadAsset),
    /// The user asked for the module catalog page.
    ModuleCatalogRequested,
}

// ============================================================================
// NotificationSink
// ============================================================================

/// Receiver of bridge notifications.
pub trait NotificationSink: Send + Sync {
    /// Delivers one notification.
    fn notify(&self, notification: Notification);
}

impl NotificationSink for mpsc::UnboundedSender<Notification> {
    fn notify(&self, notification: Notification) {
        // Host dropped its receiver; nothing left to inform.
        let _ = self.send(notification);
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _notification: Notification) {}
}

/// Sink that keeps notifications until the host drains them.
///
/// Suits hosts that poll once per tick instead of reacting to a channel.
#[derive(Debug, Default)]
pub struct NotificationLog {
    entries: Mutex<Vec<Notification>>,
}

impl NotificationLog {
    /// Creates an empty log.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Returns a copy of everything recorded so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Notification> {
        self.entries.lock().clone()
    }

    /// Counts recorded notifications matching `predicate`.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&Notification) -> bool) -> usize {
        self.entries.lock().iter().filter(|n| predicate(n)).count()
    }
}

impl NotificationSink for NotificationLog {
    fn notify(&self, notification: Notification) {
        self.entries.lock().push(notification);
    }
}

// ============================================================================
// Tests
// ============================================================================
