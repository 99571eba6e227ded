/*!
 * Cluster descriptors and typed wrappers.
 *
 * Each module declares its cluster as data for [`ClusterProxy`] and adds a
 * thin typed layer over the generic operations.
 *
 * [`ClusterProxy`]: crate::zcl::proxy::ClusterProxy
 */
pub mod ias_zone;
pub mod level_control;
pub mod scenes;

use crate::zcl::proxy::ClusterDescriptor;

pub use ias_zone::{IasZone, IAS_ZONE};
pub use level_control::{LevelControl, LEVEL_CONTROL};
pub use scenes::{Scenes, SCENES};

/// Every descriptor shipped with the crate
pub static KNOWN_CLUSTERS: [&ClusterDescriptor; 3] = [&LEVEL_CONTROL, &IAS_ZONE, &SCENES];

/// Look up a shipped descriptor by cluster id
pub fn descriptor(cluster_id: u16) -> Option<&'static ClusterDescriptor> {
    KNOWN_CLUSTERS.iter().copied().find(|d| d.id == cluster_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_lookup() {
        assert_eq!(descriptor(0x0008).map(|d| d.name), Some("Level Control"));
        assert_eq!(descriptor(0x0500).map(|d| d.name), Some("IAS Zone"));
        assert!(descriptor(0x0006).is_none());
    }
}
