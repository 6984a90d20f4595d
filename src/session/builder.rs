//! Builder pattern for manager configuration.
//!
//! Provides a fluent API for configuring and creating [`ConnectionManager`]
//! instances.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hardware_bridge::{ConnectionManager, FileStore};
//!
//! # fn example() -> hardware_bridge::Result<()> {
//! let manager = ConnectionManager::builder()
//!     .endpoints(["http://127.0.0.1:23518"])
//!     .store(Arc::new(FileStore::new("./bridge-session.json")))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::BridgeOptions;
use crate::device::{DeviceRegistry, DriverCatalog};
use crate::error::Result;
use crate::port::PortDataStore;

use super::context::BridgeContext;
use super::manager::ConnectionManager;
use super::notify::NotificationSink;
use super::store::SessionStore;

// ============================================================================
// ManagerBuilder
// ============================================================================

/// Builder for configuring a [`ConnectionManager`].
///
/// Use [`ConnectionManager::builder()`] to create a new builder.
#[derive(Debug, Default)]
pub struct ManagerBuilder {
    options: BridgeOptions,
    context: BridgeContext,
    ports: Option<Arc<Mutex<PortDataStore>>>,
}

// ============================================================================
// ManagerBuilder Implementation
// ============================================================================

impl ManagerBuilder {
    /// Creates a builder with default options and context.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: BridgeOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the relay endpoint catalog.
    #[inline]
    #[must_use]
    pub fn endpoints(mut self, endpoints: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.options = self.options.with_endpoints(endpoints);
        self
    }

    /// Sets the notification sink.
    #[inline]
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.context = self.context.with_sink(sink);
        self
    }

    /// Sets the driver catalog.
    #[inline]
    #[must_use]
    pub fn catalog(mut self, catalog: Arc<dyn DriverCatalog>) -> Self {
        self.context = self.context.with_catalog(catalog);
        self
    }

    /// Sets the session store.
    #[inline]
    #[must_use]
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.context = self.context.with_store(store);
        self
    }

    /// Shares a host-owned port store with the manager.
    #[inline]
    #[must_use]
    pub fn ports(mut self, ports: Arc<Mutex<PortDataStore>>) -> Self {
        self.ports = Some(ports);
        self
    }

    /// Builds the manager with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) for inconsistent options
    /// - [`Error::Url`](crate::Error::Url) for an unparsable endpoint
    pub fn build(self) -> Result<ConnectionManager> {
        self.options.validate()?;

        let devices = Arc::new(Mutex::new(DeviceRegistry::from_context(&self.context)));
        let ports = self
            .ports
            .unwrap_or_else(|| Arc::new(Mutex::new(PortDataStore::new())));

        Ok(ConnectionManager::with_shared(
            self.options,
            self.context,
            devices,
            ports,
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================
