/*!
 * ZigFlow Devices
 *
 * This crate provides device discovery and the ZigBee Cluster Library
 * command framework on top of a [`NetworkTransport`] supplied by a radio
 * driver.
 *
 * - [`discovery`]: producers, work queue, device builder and their manager
 * - [`registry`]: the discovered devices
 * - [`zcl`]: frame codec, command dispatch and capability proxies
 */

#![warn(missing_docs)]

// Re-export core types
pub use zigflow_core::prelude;

pub mod device;
pub mod discovery;
pub mod registry;
pub mod transport;
pub mod zcl;

#[cfg(test)]
pub(crate) mod testing;

pub use device::{DeviceError, DeviceModel, DeviceStatus, EndpointModel, Result};
pub use discovery::{DiscoveryManager, DiscoveryQueue, DiscoveryState};
pub use registry::{DeviceRegistry, RegistryEvent, SharedDeviceRegistry};
pub use transport::{AnnounceEvent, NetworkTransport};
pub use zcl::{ClusterClient, ClusterProxy};

/// ZigFlow devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the device system
pub fn init() -> std::result::Result<(), zigflow_core::error::Error> {
    tracing::info!("ZigFlow Devices {} initialized", VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert!(init().is_ok());
    }
}
