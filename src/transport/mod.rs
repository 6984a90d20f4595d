//! WebSocket transport layer.
//!
//! Each relay address gets one [`TransportEndpoint`], a WebSocket client
//! with its own reconnecting event loop and its own [`MessageDispatcher`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Bridge (Rust)  │                              │  Hardware       │
//! │                 │     Socket.IO / WebSocket    │  relay          │
//! │  Endpoint  ─────┼─────────────────────────────►│                 │
//! │  Dispatcher ◄───┼──────────────────────────────│  :23518         │
//! │                 │                              │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Endpoint Lifecycle
//!
//! 1. Register listeners on a fresh [`MessageDispatcher`]
//! 2. [`TransportEndpoint::spawn`]: connect, handshake, reconnect per
//!    [`ReconnectPolicy`]
//! 3. [`TransportEndpoint::send`]: write frames while connected
//! 4. [`TransportEndpoint::detach`] then [`TransportEndpoint::shutdown`]
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `dispatcher` | Per-endpoint typed listeners |
//! | `endpoint` | WebSocket client and event loop |
//! | `retry` | Reconnection budget and backoff |

// ============================================================================
// Submodules
// ============================================================================

/// Per-endpoint event listeners.
pub mod dispatcher;

/// Relay WebSocket client.
pub mod endpoint;

/// Reconnection policy.
pub mod retry;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatcher::{Listener, MessageDispatcher};
pub use endpoint::{EndpointState, TransportEndpoint, socket_url};
pub use retry::ReconnectPolicy;
