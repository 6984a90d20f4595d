//! Relay wire protocol.
//!
//! The relay is a Socket.IO server; this module covers packet framing,
//! inbound events and outbound messages.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `EnginePacket` | Both | Transport framing, heartbeat |
//! | `SocketPacket` | Both | Namespace connect, named events |
//! | `RelayEvent` | Relay → Bridge | `init`, `state`, `disconnect`, `data`, `mode` |
//! | `OutboundMessage` | Bridge → Relay | Driver request, send queue flush |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Relay and lifecycle events |
//! | `frame` | Port snapshots and device signatures |
//! | `message` | Outbound control and data messages |
//! | `packet` | Engine.IO / Socket.IO framing |

// ============================================================================
// Submodules
// ============================================================================

/// Relay event types.
pub mod event;

/// Port snapshot types.
pub mod frame;

/// Outbound message types.
pub mod message;

/// Socket.IO packet codec.
pub mod packet;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{DISCONNECT_HARDWARE, EventKind, RelayEvent};
pub use frame::{DeviceSignature, PortFrame, PortId};
pub use message::OutboundMessage;
pub use packet::{EnginePacket, OpenData, SocketPacket};
