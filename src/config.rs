//! Bridge configuration.
//!
//! [`BridgeOptions`] holds every tunable of the bridge: the relay endpoint
//! catalog, reconnection budgets and timings, the persisted-identity key and
//! the relay launcher scheme. Defaults match the public relay deployment.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use hardware_bridge::BridgeOptions;
//!
//! let options = BridgeOptions::new()
//!     .with_endpoints(["http://127.0.0.1:23518"])
//!     .with_attempt_timeout(Duration::from_secs(2));
//!
//! options.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::transport::ReconnectPolicy;

// ============================================================================
// Constants
// ============================================================================

/// Relay on the local machine.
pub const LOCAL_ENDPOINT: &str = "http://127.0.0.1:23518";

/// Public relay hosts.
pub const REMOTE_ENDPOINTS: [&str; 2] = [
    "https://hardware.playentry.org:23518",
    "https://hardware.play-entry.org:23518",
];

/// Key under which the session identifier is persisted.
pub const DEFAULT_STORAGE_KEY: &str = "entryhwRoomId";

/// URL scheme registered by the relay program.
pub const DEFAULT_LAUNCHER_SCHEME: &str = "entryhw";

// ============================================================================
// BridgeOptions
// ============================================================================

/// Bridge configuration.
///
/// Durations serialize as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeOptions {
    /// Relay base URLs (`http(s)` or `ws(s)`), connected concurrently.
    pub endpoints: Vec<String>,

    /// Reconnection attempts for automatic connects.
    pub retry_budget: u32,

    /// Reconnection attempts after a manual retry or relay launch.
    pub manual_retry_budget: u32,

    /// First backoff delay.
    #[serde(with = "millis")]
    pub backoff_base: Duration,

    /// Backoff cap.
    #[serde(with = "millis")]
    pub backoff_max: Duration,

    /// Limit for one connect-and-handshake attempt.
    #[serde(with = "millis")]
    pub attempt_timeout: Duration,

    /// Delay before the deferred connect after launching the relay.
    #[serde(with = "millis")]
    pub deferred_connect_delay: Duration,

    /// Session store key.
    pub storage_key: String,

    /// Relay launcher URL scheme.
    pub launcher_scheme: String,
}

// ============================================================================
// Constructors
// ============================================================================

impl Default for BridgeOptions {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        let mut endpoints = Vec::with_capacity(1 + REMOTE_ENDPOINTS.len());
        endpoints.push(LOCAL_ENDPOINT.to_string());
        endpoints.extend(REMOTE_ENDPOINTS.iter().map(|e| (*e).to_string()));

        Self {
            endpoints,
            retry_budget: ReconnectPolicy::DEFAULT_RETRY_BUDGET,
            manual_retry_budget: ReconnectPolicy::MANUAL_RETRY_BUDGET,
            backoff_base: policy.base_delay,
            backoff_max: policy.max_delay,
            attempt_timeout: policy.attempt_timeout,
            deferred_connect_delay: Duration::from_secs(1),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            launcher_scheme: DEFAULT_LAUNCHER_SCHEME.to_string(),
        }
    }
}

impl BridgeOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] for malformed input.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads options from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, and
    /// [`Error::Json`] if it is malformed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl BridgeOptions {
    /// Replaces the endpoint catalog.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the automatic retry budget.
    #[inline]
    #[must_use]
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Sets the manual retry budget.
    #[inline]
    #[must_use]
    pub fn with_manual_retry_budget(mut self, budget: u32) -> Self {
        self.manual_retry_budget = budget;
        self
    }

    /// Sets backoff base and cap.
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// Sets the per-attempt handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Sets the deferred connect delay used after launching the relay.
    #[inline]
    #[must_use]
    pub fn with_deferred_connect_delay(mut self, delay: Duration) -> Self {
        self.deferred_connect_delay = delay;
        self
    }

    /// Sets the session store key.
    #[inline]
    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Sets the relay launcher scheme.
    #[inline]
    #[must_use]
    pub fn with_launcher_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.launcher_scheme = scheme.into();
        self
    }
}

// ============================================================================
// Derived Values
// ============================================================================

impl BridgeOptions {
    /// Reconnect policy with the given budget.
    #[must_use]
    pub fn policy(&self, retry_budget: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            retry_budget,
            base_delay: self.backoff_base,
            max_delay: self.backoff_max,
            attempt_timeout: self.attempt_timeout,
        }
    }

    /// Parses the endpoint catalog.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] for the first unparsable entry.
    pub fn endpoint_urls(&self) -> Result<Vec<Url>> {
        self.endpoints
            .iter()
            .map(|e| Url::parse(e).map_err(Error::from))
            .collect()
    }

    /// Checks the options for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::config("At least one relay endpoint is required"));
        }

        for url in self.endpoint_urls()? {
            if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
                return Err(Error::config(format!(
                    "Unsupported relay URL scheme: {}",
                    url.scheme()
                )));
            }
        }

        if self.attempt_timeout.is_zero() {
            return Err(Error::config("Attempt timeout must be positive"));
        }

        if self.backoff_base > self.backoff_max {
            return Err(Error::config("Backoff base exceeds backoff cap"));
        }

        if self.storage_key.is_empty() {
            return Err(Error::config("Storage key must not be empty"));
        }

        if self.launcher_scheme.is_empty()
            || !self
                .launcher_scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(Error::config(format!(
                "Invalid launcher scheme: {:?}",
                self.launcher_scheme
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = BridgeOptions::default();

        assert_eq!(
            options.endpoints,
            vec![
                "http://127.0.0.1:23518",
                "https://hardware.playentry.org:23518",
                "https://hardware.play-entry.org:23518",
            ]
        );
        assert_eq!(options.retry_budget, 2);
        assert_eq!(options.manual_retry_budget, 5);
        assert_eq!(options.backoff_max, Duration::from_secs(1));
        assert_eq!(options.attempt_timeout, Duration::from_secs(1));
        assert_eq!(options.deferred_connect_delay, Duration::from_secs(1));
        assert_eq!(options.storage_key, "entryhwRoomId");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let options = BridgeOptions::from_json(
            r#"{"endpoints":["ws://localhost:4000"],"attemptTimeout":2500}"#,
        )
        .expect("parse");

        assert_eq!(options.endpoints, vec!["ws://localhost:4000"]);
        assert_eq!(options.attempt_timeout, Duration::from_millis(2500));
        assert_eq!(options.retry_budget, 2);
    }

    #[test]
    fn test_json_uses_milliseconds() {
        let json = serde_json::to_value(BridgeOptions::default()).expect("serialize");
        assert_eq!(json["backoffMax"], 1000);
        assert_eq!(json["storageKey"], "entryhwRoomId");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bridge.json");
        std::fs::write(&path, r#"{"retryBudget":4}"#).expect("write");

        let options = BridgeOptions::from_file(&path).expect("load");
        assert_eq!(options.retry_budget, 4);
        assert!(BridgeOptions::from_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_policy_uses_timings() {
        let options = BridgeOptions::new()
            .with_backoff(Duration::from_millis(10), Duration::from_millis(40))
            .with_attempt_timeout(Duration::from_millis(300));

        let policy = options.policy(5);
        assert_eq!(policy.retry_budget, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_millis(40));
        assert_eq!(policy.attempt_timeout, Duration::from_millis(300));
    }

    #[test]
    fn test_validate_rejects_bad_options() {
        assert!(BridgeOptions::new().with_endpoints(Vec::<String>::new()).validate().is_err());
        assert!(BridgeOptions::new().with_endpoints(["ftp://relay"]).validate().is_err());
        assert!(BridgeOptions::new().with_endpoints(["not a url"]).validate().is_err());
        assert!(
            BridgeOptions::new()
                .with_attempt_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            BridgeOptions::new()
                .with_backoff(Duration::from_secs(2), Duration::from_secs(1))
                .validate()
                .is_err()
        );
        assert!(BridgeOptions::new().with_storage_key("").validate().is_err());
        assert!(BridgeOptions::new().with_launcher_scheme("bad scheme").validate().is_err());
    }
}
