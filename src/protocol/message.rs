//! Outbound message format.
//!
//! Everything the bridge sends travels as the Socket.IO event `message`
//! with a JSON-encoded `data` string.
//!
//! # Format
//!
//! Control (driver request):
//! ```json
//! { "action": "init", "data": "{\"name\":\"arduino\"}", "mode": 0, "type": "utf8" }
//! ```
//!
//! Data (send queue flush):
//! ```json
//! { "data": "{\"3\":1,\"readablePorts\":[2]}", "mode": 0, "type": "utf8" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::Result;

use super::packet::SocketPacket;

// ============================================================================
// Constants
// ============================================================================

/// Socket.IO event name used for all outbound traffic.
pub const MESSAGE_EVENT: &str = "message";

/// `action` value of the driver request.
pub const INIT_ACTION: &str = "init";

/// Payload encoding marker expected by the relay.
pub const UTF8_TYPE: &str = "utf8";

// ============================================================================
// OutboundMessage
// ============================================================================

/// A message from the bridge to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Control action; absent for data messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// JSON-encoded payload.
    pub data: String,

    /// Relay mode of the sending endpoint, once announced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u64>,

    /// Payload encoding marker.
    #[serde(rename = "type")]
    pub message_type: String,
}

impl OutboundMessage {
    /// Creates the control message requesting a driver module.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if encoding fails.
    pub fn init(module_name: &str, mode: Option<u64>) -> Result<Self> {
        Ok(Self {
            action: Some(INIT_ACTION.to_string()),
            data: serde_json::to_string(&json!({ "name": module_name }))?,
            mode,
            message_type: UTF8_TYPE.to_string(),
        })
    }

    /// Creates a data message carrying any serializable payload.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if encoding fails.
    pub fn data<T: Serialize>(payload: &T, mode: Option<u64>) -> Result<Self> {
        Ok(Self {
            action: None,
            data: serde_json::to_string(payload)?,
            mode,
            message_type: UTF8_TYPE.to_string(),
        })
    }

    /// Returns `true` for control messages.
    #[inline]
    #[must_use]
    pub fn is_control(&self) -> bool {
        self.action.is_some()
    }

    /// Encodes the message as a WebSocket text frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if encoding fails.
    pub fn to_frame(&self) -> Result<String> {
        SocketPacket::encode_event(MESSAGE_EVENT, self)
    }
}

// ============================================================================
// Tests
// ============================================================================
