/*!
 * Device registry for ZigFlow.
 *
 * Discovery registers every interrogated device here, keyed by its network
 * address. Readers get shared snapshots; changes are broadcast as
 * [`RegistryEvent`]s.
 */
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;
use tracing::{debug, info};

use zigflow_core::types::{ClusterId, ExtendedAddress, NetworkAddress};

use crate::device::{DeviceError, DeviceModel, DeviceStatus, Result};

/// Event types for device registry
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A device was added to the registry
    DeviceAdded(Arc<DeviceModel>),
    /// A registered address was interrogated again and replaced
    DeviceUpdated(Arc<DeviceModel>),
    /// A device was removed from the registry
    DeviceRemoved(NetworkAddress),
    /// A device status changed
    DeviceStatusChanged {
        /// The device address
        address: NetworkAddress,
        /// The old status
        old_status: DeviceStatus,
        /// The new status
        new_status: DeviceStatus,
    },
}

/// Device registry
#[derive(Debug)]
pub struct DeviceRegistry {
    /// The registered devices
    devices: RwLock<HashMap<NetworkAddress, Arc<DeviceModel>>>,
    /// Event sender for registry events
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl DeviceRegistry {
    /// Create a new device registry
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(100);
        Self {
            devices: RwLock::new(HashMap::new()),
            event_sender,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<NetworkAddress, Arc<DeviceModel>>>> {
        self.devices.read().map_err(|_| {
            DeviceError::Other("Failed to acquire read lock on device registry".to_string())
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<NetworkAddress, Arc<DeviceModel>>>> {
        self.devices.write().map_err(|_| {
            DeviceError::Other("Failed to acquire write lock on device registry".to_string())
        })
    }

    /// Register a device
    ///
    /// Registering an address again replaces the previous model. A device
    /// that rejoined under a new address evicts its stale entry, matched by
    /// IEEE address. Returns whether the address was new.
    pub fn register(&self, device: DeviceModel) -> Result<bool> {
        let address = device.network_address();
        let ieee = device.extended_address();
        let device = Arc::new(device);

        let (previous, stale) = {
            let mut devices = self.write()?;
            let stale: Vec<NetworkAddress> = devices
                .iter()
                .filter(|(addr, d)| **addr != address && d.extended_address() == ieee)
                .map(|(addr, _)| *addr)
                .collect();
            for addr in &stale {
                devices.remove(addr);
            }
            (devices.insert(address, device.clone()), stale)
        };

        for addr in stale {
            debug!("Evicted {} now known as {} ({})", addr, address, ieee);
            let _ = self.event_sender.send(RegistryEvent::DeviceRemoved(addr));
        }

        let added = previous.is_none();
        if added {
            info!(
                address = %address,
                ieee = %ieee,
                endpoints = device.endpoints().len(),
                "Registered device"
            );
            let _ = self.event_sender.send(RegistryEvent::DeviceAdded(device));
        } else {
            debug!("Replaced device model of {}", address);
            let _ = self.event_sender.send(RegistryEvent::DeviceUpdated(device));
        }
        Ok(added)
    }

    /// Unregister a device
    pub fn unregister(&self, address: NetworkAddress) -> Result<Arc<DeviceModel>> {
        let removed = self.write()?.remove(&address).ok_or_else(|| {
            DeviceError::Other(format!("Device {} not registered", address))
        })?;

        let _ = self.event_sender.send(RegistryEvent::DeviceRemoved(address));
        debug!("Unregistered device {}", address);

        Ok(removed)
    }

    /// Get a device by address
    pub fn get(&self, address: NetworkAddress) -> Result<Option<Arc<DeviceModel>>> {
        Ok(self.read()?.get(&address).cloned())
    }

    /// Get a device by IEEE address
    pub fn by_extended_address(&self, ieee: ExtendedAddress) -> Result<Option<Arc<DeviceModel>>> {
        Ok(self
            .read()?
            .values()
            .find(|d| d.extended_address() == ieee)
            .cloned())
    }

    /// Get all registered devices, ordered by address
    pub fn devices(&self) -> Result<Vec<Arc<DeviceModel>>> {
        let mut devices: Vec<_> = self.read()?.values().cloned().collect();
        devices.sort_by_key(|d| d.network_address());
        Ok(devices)
    }

    /// Get all registered addresses
    pub fn addresses(&self) -> Result<Vec<NetworkAddress>> {
        Ok(self.read()?.keys().copied().collect())
    }

    /// Get devices with an endpoint serving `cluster`
    pub fn devices_with_cluster(&self, cluster: ClusterId) -> Result<Vec<Arc<DeviceModel>>> {
        Ok(self
            .read()?
            .values()
            .filter(|device| device.has_cluster(cluster))
            .cloned()
            .collect())
    }

    /// Record a new availability status
    pub fn set_status(&self, address: NetworkAddress, status: DeviceStatus) -> Result<()> {
        let old_status = {
            let mut devices = self.write()?;
            let device = devices.get_mut(&address).ok_or_else(|| {
                DeviceError::Other(format!("Device {} not registered", address))
            })?;
            let old_status = device.status();
            if old_status == status {
                return Ok(());
            }
            *device = Arc::new(device.with_status(status));
            old_status
        };

        info!("Device {} is now {}", address, status);
        let _ = self.event_sender.send(RegistryEvent::DeviceStatusChanged {
            address,
            old_status,
            new_status: status,
        });
        Ok(())
    }

    /// Serialize every registered device as a JSON array, ordered by address
    pub fn to_json(&self) -> Result<String> {
        let devices = self.devices()?;
        let models: Vec<&DeviceModel> = devices.iter().map(|d| d.as_ref()).collect();
        serde_json::to_string_pretty(&models).map_err(|e| DeviceError::Core(e.into()))
    }

    /// Subscribe to registry events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Count registered devices
    pub fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// Check if a device is registered
    pub fn contains(&self, address: NetworkAddress) -> Result<bool> {
        Ok(self.read()?.contains_key(&address))
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A shared device registry that can be cloned
#[derive(Debug, Clone, Default)]
pub struct SharedDeviceRegistry(Arc<DeviceRegistry>);

impl SharedDeviceRegistry {
    /// Create a new shared device registry
    pub fn new() -> Self {
        Self(Arc::new(DeviceRegistry::new()))
    }

    /// Get a reference to the device registry
    pub fn registry(&self) -> &DeviceRegistry {
        &self.0
    }
}

impl AsRef<DeviceRegistry> for SharedDeviceRegistry {
    fn as_ref(&self) -> &DeviceRegistry {
        self.registry()
    }
}

impl std::ops::Deref for SharedDeviceRegistry {
    type Target = DeviceRegistry;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::EndpointModel;

    fn device(address: u16, ieee: u64, clusters: &[ClusterId]) -> DeviceModel {
        DeviceModel::new(
            NetworkAddress(address),
            ExtendedAddress(ieee),
            vec![EndpointModel {
                endpoint_id: 1,
                profile_id: 0x0104,
                device_id: 0x0101,
                device_version: 1,
                input_clusters: clusters.to_vec(),
                output_clusters: vec![],
            }],
        )
    }

    #[test]
    fn test_register_is_idempotent_last_write_wins() {
        let registry = DeviceRegistry::new();
        assert!(registry.register(device(0x10, 1, &[0x0008])).unwrap());
        assert!(!registry.register(device(0x10, 1, &[0x0008, 0x0005])).unwrap());

        assert_eq!(registry.count().unwrap(), 1);
        let stored = registry.get(NetworkAddress(0x10)).unwrap().unwrap();
        assert!(stored.has_cluster(0x0005));
    }

    #[test]
    fn test_rejoin_evicts_stale_address() {
        let registry = DeviceRegistry::new();
        registry.register(device(0x10, 0xAA, &[])).unwrap();
        registry.register(device(0x20, 0xBB, &[])).unwrap();
        registry.register(device(0x30, 0xAA, &[])).unwrap();

        assert!(!registry.contains(NetworkAddress(0x10)).unwrap());
        assert_eq!(
            registry
                .by_extended_address(ExtendedAddress(0xAA))
                .unwrap()
                .map(|d| d.network_address()),
            Some(NetworkAddress(0x30))
        );
        let addresses: Vec<_> = registry
            .devices()
            .unwrap()
            .iter()
            .map(|d| d.network_address())
            .collect();
        assert_eq!(addresses, vec![NetworkAddress(0x20), NetworkAddress(0x30)]);
    }

    #[test]
    fn test_queries_and_unregister() {
        let registry = DeviceRegistry::new();
        registry.register(device(0x10, 1, &[0x0008])).unwrap();
        registry.register(device(0x20, 2, &[0x0500])).unwrap();

        let dimmers = registry.devices_with_cluster(0x0008).unwrap();
        assert_eq!(dimmers.len(), 1);
        assert_eq!(dimmers[0].network_address(), NetworkAddress(0x10));

        registry.unregister(NetworkAddress(0x10)).unwrap();
        assert!(registry.unregister(NetworkAddress(0x10)).is_err());
        assert_eq!(registry.addresses().unwrap(), vec![NetworkAddress(0x20)]);
    }

    #[test]
    fn test_json_export() {
        let registry = DeviceRegistry::new();
        registry.register(device(0x20, 0xBEEF, &[0x0500])).unwrap();

        let json: serde_json::Value = serde_json::from_str(&registry.to_json().unwrap()).unwrap();
        assert_eq!(json[0]["network_address"], 0x20);
        assert_eq!(json[0]["extended_address"], 0xBEEF);
        assert_eq!(json[0]["status"], "Online");
        assert_eq!(json[0]["endpoints"][0]["input_clusters"][0], 0x0500);
    }

    #[tokio::test]
    async fn test_events() {
        let registry = DeviceRegistry::new();
        let mut events = registry.subscribe();

        registry.register(device(0x10, 1, &[])).unwrap();
        registry
            .set_status(NetworkAddress(0x10), DeviceStatus::Offline)
            .unwrap();
        // Unchanged status is not broadcast
        registry
            .set_status(NetworkAddress(0x10), DeviceStatus::Offline)
            .unwrap();
        registry.unregister(NetworkAddress(0x10)).unwrap();

        assert!(matches!(events.recv().await, Ok(RegistryEvent::DeviceAdded(_))));
        match events.recv().await {
            Ok(RegistryEvent::DeviceStatusChanged {
                old_status,
                new_status,
                ..
            }) => {
                assert_eq!(old_status, DeviceStatus::Online);
                assert_eq!(new_status, DeviceStatus::Offline);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            events.recv().await,
            Ok(RegistryEvent::DeviceRemoved(NetworkAddress(0x10)))
        ));
    }
}
