//! Explicit collaborators handed to bridge components.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::device::{DriverCatalog, StaticCatalog};

use super::notify::{NotificationSink, NullSink};
use super::store::{MemoryStore, SessionStore};

// ============================================================================
// BridgeContext
// ============================================================================

/// Collaborators shared by the manager and the device registry.
///
/// Components receive this at construction instead of reaching into any
/// process-wide state.
#[derive(Clone)]
pub struct BridgeContext {
    /// Where notifications go.
    pub sink: Arc<dyn NotificationSink>,
    /// Driver lookup for device keys.
    pub catalog: Arc<dyn DriverCatalog>,
    /// Persistence for the session identifier.
    pub store: Arc<dyn SessionStore>,
}

impl BridgeContext {
    /// Creates a context from its three collaborators.
    #[must_use]
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        catalog: Arc<dyn DriverCatalog>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            sink,
            catalog,
            store,
        }
    }

    /// Replaces the notification sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replaces the driver catalog.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<dyn DriverCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replaces the session store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }
}

impl Default for BridgeContext {
    /// Discarding sink, empty catalog, in-memory store.
    fn default() -> Self {
        Self {
            sink: Arc::new(NullSink),
            catalog: Arc::new(StaticCatalog::new()),
            store: Arc::new(MemoryStore::new()),
        }
    }
}

impl fmt::Debug for BridgeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeContext").finish_non_exhaustive()
    }
}
