//! Inbound port snapshots.
//!
//! A [`PortFrame`] is the payload of a relay `data` event: a flat JSON
//! object keyed by port identifier, optionally carrying the numeric
//! `company`/`model` codes that identify the attached board.
//!
//! ```json
//! { "company": 10, "model": 2, "3": 1, "a0": 512 }
//! ```
//!
//! Parsing is permissive: missing or non-numeric fields read as absent.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::identifiers::DeviceKey;

// ============================================================================
// Constants
// ============================================================================

/// Frame field holding the board vendor code.
pub const COMPANY_FIELD: &str = "company";

/// Frame field holding the board model code.
pub const MODEL_FIELD: &str = "model";

// ============================================================================
// PortId
// ============================================================================

/// Port identifier as it appears in frame and queue keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortId {
    /// Digital port, keyed by its number (`"3"`).
    Digital(u32),
    /// Analog port, keyed with an `a` prefix (`"a0"`).
    Analog(u32),
}

impl PortId {
    /// Returns the wire key for this port.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Digital(port) => write!(f, "{port}"),
            Self::Analog(port) => write!(f, "a{port}"),
        }
    }
}

// ============================================================================
// DeviceSignature
// ============================================================================

/// Company/model pair reported by the attached board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceSignature {
    /// Vendor code.
    pub company: u64,
    /// Model code.
    pub model: u64,
}

impl DeviceSignature {
    /// Returns the driver lookup key for this signature.
    #[inline]
    #[must_use]
    pub fn key(&self) -> DeviceKey {
        DeviceKey::from_signature(self.company, self.model)
    }
}

// ============================================================================
// PortFrame
// ============================================================================

/// Most recent port readings reported by the relay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortFrame {
    values: Map<String, Value>,
}

impl PortFrame {
    /// Creates an empty frame.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a frame from a decoded event payload.
    ///
    /// Anything other than a JSON object yields an empty frame.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::default(),
        }
    }

    /// Returns the device signature, if the frame carries one.
    ///
    /// Requires a numeric `company`; a missing `model` reads as 0.
    #[must_use]
    pub fn signature(&self) -> Option<DeviceSignature> {
        let company = self.values.get(COMPANY_FIELD).and_then(as_code)?;
        let model = self.values.get(MODEL_FIELD).and_then(as_code).unwrap_or(0);
        Some(DeviceSignature { company, model })
    }

    /// Returns the numeric value stored under `key`.
    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    /// Returns the numeric reading for a port.
    #[inline]
    #[must_use]
    pub fn port(&self, port: PortId) -> Option<f64> {
        self.number(&port.key())
    }

    /// Returns the raw value stored under `key`.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Stores a raw value, mostly for drivers and tests.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Returns all fields of the frame.
    #[inline]
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Returns the number of fields.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the frame has no fields.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Value> for PortFrame {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

/// Reads a vendor/model code; integral floats are accepted.
fn as_code(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0)
            .map(|f| f as u64)
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_port_id_keys() {
        assert_eq!(PortId::Digital(3).key(), "3");
        assert_eq!(PortId::Analog(0).key(), "a0");
    }

    #[test]
    fn test_frame_readings() {
        let frame = PortFrame::from_value(json!({"company": 10, "model": 2, "3": 1, "a0": 512}));

        assert_eq!(frame.port(PortId::Digital(3)), Some(1.0));
        assert_eq!(frame.port(PortId::Analog(0)), Some(512.0));
        assert_eq!(frame.port(PortId::Digital(4)), None);
        assert_eq!(frame.len(), 4);
    }

    #[test]
    fn test_signature() {
        let frame = PortFrame::from_value(json!({"company": 10, "model": 2}));
        let signature = frame.signature().expect("signature");
        assert_eq!(signature, DeviceSignature { company: 10, model: 2 });
        assert_eq!(signature.key().as_str(), "a.2");
    }

    #[test]
    fn test_signature_missing_model_defaults_to_zero() {
        let frame = PortFrame::from_value(json!({"company": 16.0}));
        assert_eq!(frame.signature().map(|s| s.key()), Some(DeviceKey::new("10.0")));
    }

    #[test]
    fn test_no_signature_without_company() {
        let frame = PortFrame::from_value(json!({"model": 2, "3": 1}));
        assert!(frame.signature().is_none());

        let frame = PortFrame::from_value(json!({"company": "acme"}));
        assert!(frame.signature().is_none());
    }

    #[test]
    fn test_non_object_payload_is_empty() {
        assert!(PortFrame::from_value(json!([1, 2, 3])).is_empty());
        assert!(PortFrame::from_value(Value::Null).is_empty());
    }

    #[test]
    fn test_non_numeric_reading_is_absent() {
        let frame = PortFrame::from_value(json!({"3": "high"}));
        assert_eq!(frame.port(PortId::Digital(3)), None);
        assert_eq!(frame.get("3"), Some(&json!("high")));
    }
}
