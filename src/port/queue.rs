//! Outbound port state.

// ============================================================================
// Imports
// ============================================================================

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

// ============================================================================
// Constants
// ============================================================================

/// Queue field listing ports the relay should keep reporting.
pub const READABLE_PORTS_FIELD: &str = "readablePorts";

// ============================================================================
// SendQueue
// ============================================================================

/// Pending port writes plus the ordered set of polled ports.
///
/// Serializes as one flat object, which is exactly what the relay expects
/// in the `data` string of a flush:
///
/// ```json
/// { "3": 1, "9": 255, "readablePorts": [2, 4] }
/// ```
///
/// `readablePorts` is left out until the first port is polled; after that
/// it stays, even when empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendQueue {
    values: Map<String, Value>,
    readable_ports: Vec<u32>,
    /// Set by the first `add_readable`, cleared by `clear`.
    polling: bool,
}

impl SendQueue {
    /// Creates an empty queue.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a pending value under a raw key.
    ///
    /// Drivers with custom encodings use arbitrary keys; the reserved
    /// `readablePorts` key is ignored.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        if key == READABLE_PORTS_FIELD {
            return;
        }
        self.values.insert(key, value.into());
    }

    /// Returns the pending value under `key`.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Removes a pending value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Returns all pending values.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Returns the polled ports in insertion order.
    #[inline]
    #[must_use]
    pub fn readable_ports(&self) -> &[u32] {
        &self.readable_ports
    }

    /// Adds a port to the polled set. Returns `false` if already present.
    pub fn add_readable(&mut self, port: u32) -> bool {
        self.polling = true;
        if self.readable_ports.contains(&port) {
            return false;
        }
        self.readable_ports.push(port);
        true
    }

    /// Removes a port from the polled set, keeping the order of the rest.
    /// Returns `false` if it was not present.
    pub fn remove_readable(&mut self, port: u32) -> bool {
        match self.readable_ports.iter().position(|p| *p == port) {
            Some(index) => {
                self.readable_ports.remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns `true` if nothing is pending and no port is polled.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.readable_ports.is_empty()
    }

    /// Drops every pending value and polled port.
    pub fn clear(&mut self) {
        self.values.clear();
        self.readable_ports.clear();
        self.polling = false;
    }
}

impl Serialize for SendQueue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.values.len() + usize::from(self.polling);
        let mut map = serializer.serialize_map(Some(len))?;
        for (key, value) in &self.values {
            map.serialize_entry(key, value)?;
        }
        if self.polling {
            map.serialize_entry(READABLE_PORTS_FIELD, &self.readable_ports)?;
        }
        map.end()
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
    fn test_add_readable_is_idempotent() {
        let mut queue = SendQueue::new();
        assert!(queue.add_readable(4));
        assert!(queue.add_readable(2));
        assert!(!queue.add_readable(4));
        assert_eq!(queue.readable_ports(), &[4, 2]);
    }

    #[test]
    fn test_remove_readable_preserves_order() {
        let mut queue = SendQueue::new();
        for port in [1, 2, 3, 4] {
            queue.add_readable(port);
        }

        assert!(queue.remove_readable(2));
        assert!(!queue.remove_readable(9));
        assert_eq!(queue.readable_ports(), &[1, 3, 4]);
    }

    #[test]
    fn test_reserved_key_ignored() {
        let mut queue = SendQueue::new();
        queue.set(READABLE_PORTS_FIELD, json!([1]));
        assert!(queue.get(READABLE_PORTS_FIELD).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_serialize_flat_object() {
        let mut queue = SendQueue::new();
        queue.set("3", 1);
        queue.add_readable(2);

        let json = serde_json::to_value(&queue).expect("serialize");
        assert_eq!(json, json!({"3": 1, "readablePorts": [2]}));
    }

    #[test]
    fn test_serialize_omits_readable_ports_until_polled() {
        let mut queue = SendQueue::new();
        assert_eq!(serde_json::to_value(&queue).expect("serialize"), json!({}));

        queue.set("3", 1);
        assert_eq!(serde_json::to_value(&queue).expect("serialize"), json!({"3": 1}));
    }

    #[test]
    fn test_serialize_keeps_emptied_readable_ports() {
        let mut queue = SendQueue::new();
        queue.add_readable(2);
        queue.remove_readable(2);

        let json = serde_json::to_value(&queue).expect("serialize");
        assert_eq!(json, json!({"readablePorts": []}));
    }

    #[test]
    fn test_clear() {
        let mut queue = SendQueue::new();
        queue.set("3", 1);
        queue.add_readable(3);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(serde_json::to_value(&queue).expect("serialize"), json!({}));
    }
}
