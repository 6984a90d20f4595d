//! Socket.IO framing over WebSocket text frames.
//!
//! The relay speaks Socket.IO v2 (Engine.IO protocol 3). Each WebSocket
//! text frame carries one Engine.IO packet; `message` packets wrap one
//! Socket.IO packet.
//!
//! # Format
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,"pingTimeout":5000}   engine open
//! 2 / 3                                                    engine ping / pong
//! 40                                                       socket connect
//! 42["data",{"company":10,"model":2,"3":1}]                socket event
//! 42/ns,7["mode",1]                                        namespace + ack id
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Ping interval assumed when the open packet omits it.
const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;

/// Ping timeout assumed when the open packet omits it.
const DEFAULT_PING_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// OpenData
// ============================================================================

/// Payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OpenData {
    /// Engine session id assigned by the server.
    #[serde(default)]
    pub sid: String,

    /// Interval between client pings.
    #[serde(rename = "pingInterval", default = "default_ping_interval")]
    pub ping_interval_ms: u64,

    /// Grace period for the matching pong.
    #[serde(rename = "pingTimeout", default = "default_ping_timeout")]
    pub ping_timeout_ms: u64,
}

fn default_ping_interval() -> u64 {
    DEFAULT_PING_INTERVAL_MS
}

fn default_ping_timeout() -> u64 {
    DEFAULT_PING_TIMEOUT_MS
}

impl Default for OpenData {
    fn default() -> Self {
        Self {
            sid: String::new(),
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            ping_timeout_ms: DEFAULT_PING_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// EnginePacket
// ============================================================================

/// Transport-level packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    /// Session opened by the server.
    Open(OpenData),
    /// Server is closing the transport.
    Close,
    /// Heartbeat request.
    Ping(String),
    /// Heartbeat reply.
    Pong(String),
    /// Carries a Socket.IO packet.
    Message(String),
    /// Transport upgrade marker (unused over a direct WebSocket).
    Upgrade,
    /// No-op.
    Noop,
}

impl EnginePacket {
    /// Decodes one WebSocket text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for an empty frame or unknown packet type,
    /// and [`Error::Json`] for a malformed open payload.
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::protocol("Empty engine packet"))?;
        let body = chars.as_str();

        match kind {
            '0' => {
                let data = if body.is_empty() {
                    OpenData::default()
                } else {
                    serde_json::from_str(body)?
                };
                Ok(Self::Open(data))
            }
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(body.to_string())),
            '3' => Ok(Self::Pong(body.to_string())),
            '4' => Ok(Self::Message(body.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(Error::protocol(format!(
                "Unknown engine packet type: {other}"
            ))),
        }
    }

    /// Encodes the packet as a WebSocket text frame.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Open(_) => "0".to_string(),
            Self::Close => "1".to_string(),
            Self::Ping(probe) => format!("2{probe}"),
            Self::Pong(probe) => format!("3{probe}"),
            Self::Message(payload) => format!("4{payload}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

// ============================================================================
// SocketPacket
// ============================================================================

/// Socket.IO packet carried inside an engine `message`.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Namespace joined; this is the handshake completion.
    Connect,
    /// Namespace left.
    Disconnect,
    /// Named event with its arguments.
    Event {
        /// Event name (first array element).
        name: String,
        /// Remaining array elements.
        args: Vec<Value>,
    },
    /// Acknowledgement; the client never requests acks, so these are ignored.
    Ack,
    /// Server rejected the namespace or request.
    Error(Value),
}

impl SocketPacket {
    /// Decodes the payload of an engine `message` packet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for unknown packet types or events whose
    /// payload is not a non-empty array led by a string.
    pub fn decode(payload: &str) -> Result<Self> {
        let mut chars = payload.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::protocol("Empty socket packet"))?;
        let body = Self::strip_prefix(chars.as_str());

        match kind {
            '0' => Ok(Self::Connect),
            '1' => Ok(Self::Disconnect),
            '2' | '5' => Self::decode_event(body),
            '3' | '6' => Ok(Self::Ack),
            '4' => {
                let value = if body.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
                };
                Ok(Self::Error(value))
            }
            other => Err(Error::protocol(format!(
                "Unknown socket packet type: {other}"
            ))),
        }
    }

    /// Encodes an event as a complete WebSocket text frame (`42[...]`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the argument cannot be serialized.
    pub fn encode_event<T: Serialize>(name: &str, arg: &T) -> Result<String> {
        let array = serde_json::to_string(&(name, arg))?;
        Ok(EnginePacket::Message(format!("2{array}")).encode())
    }

    /// Skips the optional `/namespace,` and ack-id prefix.
    fn strip_prefix(body: &str) -> &str {
        let body = match body.strip_prefix('/') {
            Some(rest) => rest.split_once(',').map_or("", |(_, tail)| tail),
            None => body,
        };
        body.trim_start_matches(|c: char| c.is_ascii_digit())
    }

    fn decode_event(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body)?;
        let Value::Array(mut items) = value else {
            return Err(Error::protocol("Event payload is not an array"));
        };

        if items.is_empty() {
            return Err(Error::protocol("Event payload is empty"));
        }

        let Value::String(name) = items.remove(0) else {
            return Err(Error::protocol("Event name is not a string"));
        };

        Ok(Self::Event { name, args: items })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_decode_open() {
        let packet =
            EnginePacket::decode(r#"0{"sid":"abc","pingInterval":1000,"pingTimeout":500,"upgrades":[]}"#)
                .expect("decode");

        assert_eq!(
            packet,
            EnginePacket::Open(OpenData {
                sid: "abc".into(),
                ping_interval_ms: 1000,
                ping_timeout_ms: 500,
            })
        );
    }

    #[test]
    fn test_decode_open_defaults() {
        let packet = EnginePacket::decode(r#"0{"sid":"abc"}"#).expect("decode");
        let EnginePacket::Open(data) = packet else {
            panic!("expected open");
        };
        assert_eq!(data.ping_interval_ms, 25_000);
        assert_eq!(data.ping_timeout_ms, 5_000);
    }

    #[test]
    fn test_decode_heartbeat() {
        assert_eq!(
            EnginePacket::decode("2").expect("ping"),
            EnginePacket::Ping(String::new())
        );
        assert_eq!(
            EnginePacket::decode("3probe").expect("pong"),
            EnginePacket::Pong("probe".into())
        );
        assert_eq!(EnginePacket::Pong(String::new()).encode(), "3");
    }

    #[test]
    fn test_decode_unknown_engine_type() {
        assert!(EnginePacket::decode("9").is_err());
        assert!(EnginePacket::decode("").is_err());
    }

    #[test]
    fn test_decode_connect() {
        assert_eq!(SocketPacket::decode("0").expect("decode"), SocketPacket::Connect);
        assert_eq!(
            SocketPacket::decode("0/relay,").expect("decode"),
            SocketPacket::Connect
        );
    }

    #[test]
    fn test_decode_event() {
        let packet = SocketPacket::decode(r#"2["mode",1]"#).expect("decode");
        assert_eq!(
            packet,
            SocketPacket::Event {
                name: "mode".into(),
                args: vec![json!(1)],
            }
        );
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack() {
        let packet = SocketPacket::decode(r#"2/relay,12["state","disconnectHardware"]"#)
            .expect("decode");
        assert_eq!(
            packet,
            SocketPacket::Event {
                name: "state".into(),
                args: vec![json!("disconnectHardware")],
            }
        );
    }

    #[test]
    fn test_decode_event_without_args() {
        let packet = SocketPacket::decode(r#"2["disconnect"]"#).expect("decode");
        assert_eq!(
            packet,
            SocketPacket::Event {
                name: "disconnect".into(),
                args: vec![],
            }
        );
    }

    #[test]
    fn test_decode_bad_event() {
        assert!(SocketPacket::decode(r#"2{"a":1}"#).is_err());
        assert!(SocketPacket::decode("2[]").is_err());
        assert!(SocketPacket::decode("2[1]").is_err());
    }

    #[test]
    fn test_decode_error_packet() {
        let packet = SocketPacket::decode(r#"4"Invalid namespace""#).expect("decode");
        assert_eq!(packet, SocketPacket::Error(json!("Invalid namespace")));
    }

    #[test]
    fn test_encode_event_frame() {
        let frame = SocketPacket::encode_event("message", &json!({"type": "utf8"}))
            .expect("encode");
        assert_eq!(frame, r#"42["message",{"type":"utf8"}]"#);
    }
}
