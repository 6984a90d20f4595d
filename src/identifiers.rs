//! Type-safe identifiers for bridge entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Wraps | Purpose |
//! |------|-------|---------|
//! | [`SessionId`] | `String` | Relay room id, persisted per profile |
//! | [`EndpointId`] | `usize` | Slot of a transport endpoint in the catalog |
//! | [`DeviceKey`] | `String` | `"<companyHex>.<modelHex>"` driver lookup key |
//! | [`SubscriptionId`] | `u64` | Dispatcher listener handle |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// SessionId
// ============================================================================

/// Relay room identifier.
///
/// Generated once per profile from [`SessionId::TEMPLATE`]: every `x` is a
/// random hex nibble, every `y` is a random nibble in `8..=b`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Shape of every generated room id.
    pub const TEMPLATE: &'static str = "xxxxxxxxyx";

    /// Generates a fresh room id.
    ///
    /// Randomness comes from a v4 UUID; the version and variant bytes are
    /// skipped so each nibble is uniformly distributed.
    #[must_use]
    pub fn generate() -> Self {
        let uuid = Uuid::new_v4();
        let mut nibbles = uuid
            .as_bytes()
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != 6 && *index != 8)
            .map(|(_, byte)| byte & 0x0f);

        let id = Self::TEMPLATE
            .chars()
            .map(|c| {
                let r = nibbles.next().unwrap_or_default();
                let v = if c == 'y' { (r & 0x3) | 0x8 } else { r };
                char::from_digit(u32::from(v), 16).unwrap_or('0')
            })
            .collect();

        Self(id)
    }

    /// Validates a persisted room id against the template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSessionId`] when the length or any nibble
    /// does not fit the template.
    pub fn parse(value: &str) -> Result<Self> {
        if Self::matches_template(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(Error::invalid_session_id(value))
        }
    }

    /// Returns `true` if `value` has the shape of a generated room id.
    #[must_use]
    pub fn matches_template(value: &str) -> bool {
        value.len() == Self::TEMPLATE.len()
            && value.chars().zip(Self::TEMPLATE.chars()).all(|(c, t)| match t {
                'y' => matches!(c, '8' | '9' | 'a' | 'b'),
                _ => matches!(c, '0'..='9' | 'a'..='f'),
            })
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

// ============================================================================
// EndpointId
// ============================================================================

/// Position of a transport endpoint in the endpoint catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(usize);

impl EndpointId {
    /// Creates an endpoint id from its catalog index.
    #[inline]
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the catalog index.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint-{}", self.0)
    }
}

// ============================================================================
// DeviceKey
// ============================================================================

/// Driver lookup key derived from a device signature.
///
/// Both codes are rendered as lowercase hex without padding, so company 10
/// and model 2 give `"a.2"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(String);

impl DeviceKey {
    /// Builds the key for a company/model pair.
    #[must_use]
    pub fn from_signature(company: u64, model: u64) -> Self {
        Self(format!("{company:x}.{model:x}"))
    }

    /// Wraps an already formatted key, e.g. from a driver catalog file.
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Global counter for subscription ids.
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned when registering a dispatcher listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocates the next process-unique subscription id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_session_id_matches_template() {
        for _ in 0..256 {
            let id = SessionId::generate();
            assert!(
                SessionId::matches_template(id.as_str()),
                "bad id: {id}"
            );
        }
    }

    #[test]
    fn test_generated_session_ids_differ() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_rejects_bad_shape() {
        assert!(SessionId::parse("0123456709").is_err());
        assert!(SessionId::parse("01234567a").is_err());
        assert!(SessionId::parse("0123456G8a").is_err());
        assert!(SessionId::parse("01234567A0").is_err());
        assert!(SessionId::parse("0123456780").is_ok());
        assert!(SessionId::parse("abcdef01bf").is_ok());
    }

    #[test]
    fn test_session_id_serde() {
        let id = SessionId::parse("deadbeef9c").expect("valid id");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"deadbeef9c\"");

        let bad = serde_json::from_str::<SessionId>("\"nope\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_device_key_lowercase_hex() {
        assert_eq!(DeviceKey::from_signature(10, 2).as_str(), "a.2");
        assert_eq!(DeviceKey::from_signature(0x10, 0xff).as_str(), "10.ff");
        assert_eq!(DeviceKey::from_signature(0, 0).as_str(), "0.0");
    }

    #[test]
    fn test_subscription_ids_unique() {
        let a = SubscriptionId::next();
        let b = SubscriptionId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_endpoint_id_display() {
        assert_eq!(EndpointId::new(2).to_string(), "endpoint-2");
        assert_eq!(EndpointId::new(2).index(), 2);
    }
}
