//! Hardware Bridge - Session bridge between a block editor and a hardware relay.
//!
//! This library keeps a block-programming editor talking to the local
//! hardware relay program, which in turn drives a microcontroller board.
//!
//! # Architecture
//!
//! The bridge follows a client-relay model:
//!
//! - **Bridge (Rust)**: Owns the session, sends port writes, receives readings
//! - **Relay (Socket.IO server)**: Talks to the board, pushes port snapshots
//!
//! Key design principles:
//!
//! - One [`ConnectionManager`] per editor session, identified by a persisted
//!   [`SessionId`]
//! - Every relay address is tried concurrently; the first handshake wins
//! - Each [`TransportEndpoint`] owns its WebSocket, event loop and
//!   [`MessageDispatcher`]
//! - Collaborators arrive through an explicit [`BridgeContext`]
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use hardware_bridge::{ConnectionManager, Notification, Result};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (tx, mut notifications) = mpsc::unbounded_channel::<Notification>();
//!
//!     let manager = ConnectionManager::builder().sink(Arc::new(tx)).build()?;
//!     manager.connect()?;
//!
//!     while let Some(notification) = notifications.recv().await {
//!         if notification == (Notification::ConnectionStateChanged { connected: true }) {
//!             manager.request_hardware_module("arduino")?;
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`BridgeOptions`] and defaults |
//! | [`device`] | [`DeviceRegistry`], [`DeviceDriver`] and catalogs |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`port`] | [`PortDataStore`] and [`SendQueue`] |
//! | [`protocol`] | Socket.IO framing and relay messages |
//! | [`session`] | [`ConnectionManager`], notifications, persistence |
//! | [`transport`] | WebSocket endpoints (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Bridge configuration.
pub mod config;

/// Board identification and driver modules.
///
/// - [`DeviceRegistry`] - Selected device and active driver
/// - [`DeviceDriver`] - Board-specific behavior behind [`Capabilities`]
pub mod device;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Port readings and pending writes.
pub mod port;

/// Relay wire protocol.
///
/// Internal module defining packet framing and message structures.
pub mod protocol;

/// Relay session management.
pub mod session;

/// WebSocket transport layer.
///
/// Internal module handling relay endpoints and their event loops.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::BridgeOptions;

// Device types
pub use device::{Capabilities, DeviceDriver, DeviceRegistry, DriverCatalog, StaticCatalog};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{DeviceKey, EndpointId, SessionId, SubscriptionId};

// Port types
pub use port::{Outbound, PortDataStore, PortMonitor, SendQueue};

// Protocol types
pub use protocol::{OutboundMessage, PortFrame, RelayEvent};

// Session types
pub use session::{
    BridgeContext, ConnectionManager, DownloadAsset, FileStore, ManagerBuilder, MemoryStore,
    Notification, NotificationLog, NotificationSink, NullSink, RelayLauncher, SessionStore,
    SystemLauncher,
};

// Transport types
pub use transport::{EndpointState, MessageDispatcher, ReconnectPolicy, TransportEndpoint};
