//! Device driver modules and the driver catalog.
//!
//! A driver interprets the port traffic of one board model. Drivers opt into
//! optional behavior through [`Capabilities`]; callers check the capability
//! before invoking the matching method, and the default method bodies are
//! never reached for a driver that does not advertise the capability.
//!
//! # Example
//!
//! ```ignore
//! struct Blink;
//!
//! impl DeviceDriver for Blink {
//!     fn name(&self) -> &str { "blink" }
//!     fn capabilities(&self) -> Capabilities { Capabilities::SET_ZERO }
//!     fn set_zero(&self, queue: &mut SendQueue) { queue.set("13", 0); }
//! }
//!
//! let catalog = StaticCatalog::new().with_driver(DeviceKey::new("a.2"), Arc::new(Blink));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::identifiers::DeviceKey;
use crate::port::SendQueue;
use crate::protocol::{OutboundMessage, PortFrame};

// ============================================================================
// Capabilities
// ============================================================================

/// Set of optional driver behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    /// No optional behavior.
    pub const NONE: Self = Self(0);
    /// Encodes the outbound message itself on every flush.
    pub const CUSTOM_SEND: Self = Self(1 << 0);
    /// Observes each new frame after it is stored.
    pub const AFTER_RECEIVE: Self = Self(1 << 1);
    /// Handles every frame once the device is locked in.
    pub const DATA_HANDLER: Self = Self(1 << 2);
    /// Resets outputs when the host program stops.
    pub const SET_ZERO: Self = Self(1 << 3);
    /// Provides a port monitor view.
    pub const MONITOR: Self = Self(1 << 4);

    /// Returns `true` if every capability in `other` is present.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no capability is present.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ============================================================================
// DeviceDriver
// ============================================================================

/// Board-specific driver module.
pub trait DeviceDriver: Send + Sync {
    /// Module name, as requested from the relay.
    fn name(&self) -> &str;

    /// Optional behaviors this driver implements.
    fn capabilities(&self) -> Capabilities;

    /// Builds the outbound message for a flush.
    ///
    /// Called only with [`Capabilities::CUSTOM_SEND`]. `Ok(None)` sends
    /// nothing this cycle.
    fn send_message(&self, _queue: &SendQueue, _mode: Option<u64>) -> Result<Option<OutboundMessage>> {
        Ok(None)
    }

    /// Called only with [`Capabilities::AFTER_RECEIVE`].
    fn after_receive(&self, _frame: &PortFrame) {}

    /// Called only with [`Capabilities::DATA_HANDLER`].
    fn handle_data(&self, _frame: &PortFrame) {}

    /// Called only with [`Capabilities::SET_ZERO`].
    fn set_zero(&self, _queue: &mut SendQueue) {}
}

impl fmt::Debug for dyn DeviceDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceDriver")
            .field("name", &self.name())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

// ============================================================================
// DriverCatalog
// ============================================================================

/// Lookup from device key to driver module.
pub trait DriverCatalog: Send + Sync {
    /// Returns the driver for `key`, if one is known.
    fn resolve(&self, key: &DeviceKey) -> Option<Arc<dyn DeviceDriver>>;
}

/// Catalog backed by a fixed map.
#[derive(Default, Clone)]
pub struct StaticCatalog {
    drivers: FxHashMap<DeviceKey, Arc<dyn DeviceDriver>>,
}

impl StaticCatalog {
    /// Creates an empty catalog.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a driver, replacing any previous entry for the key.
    pub fn register(&mut self, key: DeviceKey, driver: Arc<dyn DeviceDriver>) {
        self.drivers.insert(key, driver);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with_driver(mut self, key: DeviceKey, driver: Arc<dyn DeviceDriver>) -> Self {
        self.register(key, driver);
        self
    }

    /// Returns the number of registered drivers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Returns `true` if no driver is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl DriverCatalog for StaticCatalog {
    fn resolve(&self, key: &DeviceKey) -> Option<Arc<dyn DeviceDriver>> {
        self.drivers.get(key).cloned()
    }
}

impl fmt::Debug for StaticCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCatalog")
            .field("keys", &self.drivers.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
