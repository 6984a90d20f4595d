//! Relay event types.
//!
//! Events flow from the hardware relay to the bridge. Socket.IO events are
//! decoded into [`RelayEvent`]; endpoint lifecycle changes use the same
//! type so one listener registry covers both.
//!
//! # Event Types
//!
//! | Wire name | Variant | Payload |
//! |-----------|---------|---------|
//! | `init` | [`RelayEvent::Init`] | module name to load |
//! | `state` | [`RelayEvent::State`] | sentinel string |
//! | `disconnect` | [`RelayEvent::Disconnect`] | none (older relays) |
//! | `data` | [`RelayEvent::Data`] | [`PortFrame`] |
//! | `mode` | [`RelayEvent::Mode`] | integer |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::Value;

use super::frame::PortFrame;

// ============================================================================
// Constants
// ============================================================================

/// `state` payload asking the editor to drop the hardware session.
pub const DISCONNECT_HARDWARE: &str = "disconnectHardware";

// ============================================================================
// EventKind
// ============================================================================

/// Listener registration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Handshake completed.
    Connected,
    /// Transport closed after a completed handshake.
    Closed,
    /// Endpoint gave up after its retry budget.
    RetriesExhausted,
    /// Relay asks for a driver module.
    Init,
    /// Generic state signal.
    State,
    /// Legacy termination signal.
    Disconnect,
    /// Port snapshot.
    Data,
    /// Relay mode change.
    Mode,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connected => "connected",
            Self::Closed => "closed",
            Self::RetriesExhausted => "retriesExhausted",
            Self::Init => "init",
            Self::State => "state",
            Self::Disconnect => "disconnect",
            Self::Data => "data",
            Self::Mode => "mode",
        };
        f.write_str(name)
    }
}

// ============================================================================
// RelayEvent
// ============================================================================

/// A decoded relay or lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// Handshake completed.
    Connected,
    /// Transport closed after a completed handshake.
    Closed,
    /// Endpoint gave up after its retry budget.
    RetriesExhausted,
    /// Relay asks for the named driver module.
    Init(String),
    /// Generic state signal.
    State(String),
    /// Legacy termination signal.
    Disconnect,
    /// Port snapshot.
    Data(PortFrame),
    /// Relay mode.
    Mode(u64),
}

impl RelayEvent {
    /// Decodes a Socket.IO event.
    ///
    /// Returns `None` for unknown event names and for `init`/`mode` events
    /// whose payload has the wrong type.
    #[must_use]
    pub fn from_socket_event(name: &str, args: Vec<Value>) -> Option<Self> {
        let first = args.into_iter().next().unwrap_or(Value::Null);

        match name {
            "init" => first.as_str().map(|s| Self::Init(s.to_string())),
            "state" => Some(Self::State(first.as_str().unwrap_or_default().to_string())),
            "disconnect" => Some(Self::Disconnect),
            "data" => Some(Self::Data(PortFrame::from_value(first))),
            "mode" => first.as_u64().map(Self::Mode),
            _ => None,
        }
    }

    /// Returns the registration key for this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connected,
            Self::Closed => EventKind::Closed,
            Self::RetriesExhausted => EventKind::RetriesExhausted,
            Self::Init(_) => EventKind::Init,
            Self::State(_) => EventKind::State,
            Self::Disconnect => EventKind::Disconnect,
            Self::Data(_) => EventKind::Data,
            Self::Mode(_) => EventKind::Mode,
        }
    }

    /// Returns `true` for the `state` sentinel requesting a disconnect.
    #[inline]
    #[must_use]
    pub fn is_disconnect_request(&self) -> bool {
        matches!(self, Self::State(s) if s == DISCONNECT_HARDWARE)
    }
}

// ============================================================================
// Tests
// ============================================================================
