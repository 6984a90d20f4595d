//! Board identification and driver modules.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`DeviceRegistry`] | Selected device key and active driver |
//! | [`DeviceDriver`] | Driver module with optional [`Capabilities`] |
//! | [`DriverCatalog`] | Key → driver lookup, [`StaticCatalog`] included |

// ============================================================================
// Submodules
// ============================================================================

/// Driver trait and catalog.
pub mod driver;

/// Device identification.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use driver::{Capabilities, DeviceDriver, DriverCatalog, StaticCatalog};
pub use registry::{DeviceRegistry, Identification};
