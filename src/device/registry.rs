//! Device identification.
//!
//! Every inbound frame may carry a company/model signature. The registry
//! turns it into a [`DeviceKey`], keeps the selected key and its driver,
//! and reports when the board changes.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::identifiers::DeviceKey;
use crate::protocol::PortFrame;
use crate::session::{BridgeContext, Notification, NotificationSink};

use super::driver::{Capabilities, DeviceDriver, DriverCatalog};

// ============================================================================
// Identification
// ============================================================================

/// Outcome of [`DeviceRegistry::identify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identification {
    /// Frame had no signature.
    NoSignature,
    /// Same board as before.
    Unchanged(DeviceKey),
    /// New board with a known driver, now active.
    Activated(DeviceKey),
    /// New board without a driver; selection recorded only.
    Unknown(DeviceKey),
}

// ============================================================================
// DeviceRegistry
// ============================================================================

/// Selected device and its active driver.
pub struct DeviceRegistry {
    catalog: Arc<dyn DriverCatalog>,
    sink: Arc<dyn NotificationSink>,
    selected: Option<DeviceKey>,
    driver: Option<Arc<dyn DeviceDriver>>,
}

impl DeviceRegistry {
    /// Creates a registry resolving drivers from `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<dyn DriverCatalog>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            catalog,
            sink,
            selected: None,
            driver: None,
        }
    }

    /// Creates a registry from the shared context.
    #[must_use]
    pub fn from_context(context: &BridgeContext) -> Self {
        Self::new(Arc::clone(&context.catalog), Arc::clone(&context.sink))
    }

    /// Identifies the board behind `frame`.
    ///
    /// On the steady-state path (same key as before) the frame goes to the
    /// driver's per-frame handler. A new key replaces the selection and the
    /// driver; only a resolved driver triggers
    /// [`Notification::DeviceDriverChanged`]. Unknown keys are kept so the
    /// next identical frame takes the steady-state path.
    pub fn identify(&mut self, frame: &PortFrame) -> Identification {
        let Some(signature) = frame.signature() else {
            return Identification::NoSignature;
        };
        let key = signature.key();

        if self.selected.as_ref() == Some(&key) {
            if let Some(driver) = &self.driver
                && driver.capabilities().contains(Capabilities::DATA_HANDLER)
            {
                driver.handle_data(frame);
            }
            return Identification::Unchanged(key);
        }

        self.selected = Some(key.clone());
        self.driver = self.catalog.resolve(&key);

        let Some(driver) = &self.driver else {
            debug!(key = %key, "No driver for device");
            return Identification::Unknown(key);
        };

        let has_monitor = driver.capabilities().contains(Capabilities::MONITOR);
        info!(key = %key, driver = driver.name(), has_monitor, "Device driver activated");

        self.sink.notify(Notification::DeviceDriverChanged {
            key: key.clone(),
            driver: driver.name().to_string(),
            has_monitor,
        });

        Identification::Activated(key)
    }

    /// Returns the selected device key.
    #[inline]
    #[must_use]
    pub fn selected(&self) -> Option<&DeviceKey> {
        self.selected.as_ref()
    }

    /// Returns the active driver.
    #[inline]
    #[must_use]
    pub fn driver(&self) -> Option<&Arc<dyn DeviceDriver>> {
        self.driver.as_ref()
    }

    /// Forgets the selected device and driver.
    pub fn reset(&mut self) {
        self.selected = None;
        self.driver = None;
    }
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("selected", &self.selected)
            .field("driver", &self.driver.as_ref().map(|d| d.name()))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
