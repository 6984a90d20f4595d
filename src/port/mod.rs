//! Port state shared between the editor and the relay.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PortDataStore`] | Last inbound frame, outbound queue, typed accessors |
//! | [`SendQueue`] | Pending writes plus ordered `readablePorts` set |
//! | [`Outbound`] | Sending half of the active transport, passed to `flush` |
//! | [`PortMonitor`] | Optional view refreshed on every frame |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound queue.
pub mod queue;

/// Port data store.
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use queue::{READABLE_PORTS_FIELD, SendQueue};
pub use store::{Outbound, PortDataStore, PortMonitor};
