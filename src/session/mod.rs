//! Relay session management.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ConnectionManager`] | Session identity, endpoints, activation, teardown |
//! | [`ManagerBuilder`] | Validated construction |
//! | [`BridgeContext`] | Sink, driver catalog and store handed in at construction |
//! | [`Notification`] | Signals for the host, delivered to a [`NotificationSink`] |
//! | [`SessionStore`] | Persistence for the session identifier |
//! | [`RelayLauncher`] | Starts the relay program |

// ============================================================================
// Submodules
// ============================================================================

/// Manager builder.
pub mod builder;

/// Explicit collaborators.
pub mod context;

/// Relay program launcher.
pub mod launcher;

/// Connection manager.
pub mod manager;

/// Host notifications.
pub mod notify;

/// Session identifier persistence.
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ManagerBuilder;
pub use context::BridgeContext;
pub use launcher::{RelayLauncher, SystemLauncher, launcher_url};
pub use manager::ConnectionManager;
pub use notify::{DownloadAsset, Notification, NotificationLog, NotificationSink, NullSink};
pub use store::{FileStore, MemoryStore, SessionStore};
