use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::timeout;
use tracing::info;

use zigflow_core::config::ConfigBuilder;
use zigflow_core::types::{ClusterId, EndpointId, ExtendedAddress, NetworkAddress};
use zigflow_devices::device::{DeviceError, Result};
use zigflow_devices::transport::{
    AnnounceCallback, AnnounceEvent, AnnounceListeners, AnnounceSubscription, NeighborLink,
    NetworkTransport, SimpleDescriptor,
};
use zigflow_devices::zcl::clusters::{level_control, LevelControl, LEVEL_CONTROL};
use zigflow_devices::zcl::codec::{ZclReader, ZclWriter};
use zigflow_devices::zcl::command::DEFAULT_RESPONSE_ID;
use zigflow_devices::zcl::global::{READ_ATTRIBUTES, READ_ATTRIBUTES_RESPONSE};
use zigflow_devices::zcl::{ClusterProxy, Direction, FrameType, Status, ZclFrame};
use zigflow_devices::{DiscoveryManager, RegistryEvent, SharedDeviceRegistry};

/// A handful of dimmable lights that answer Level Control and Read Attributes
#[derive(Debug, Default)]
struct SimulatedMesh {
    listeners: AnnounceListeners,
    lights: Mutex<HashMap<NetworkAddress, u8>>,
}

impl SimulatedMesh {
    fn with_lights(addresses: &[u16]) -> Self {
        let mesh = Self::default();
        for address in addresses {
            mesh.join(NetworkAddress(*address));
        }
        mesh
    }

    fn join(&self, address: NetworkAddress) {
        if let Ok(mut lights) = self.lights.lock() {
            lights.insert(address, 0);
        }
    }

    fn level(&self, address: NetworkAddress) -> Result<Option<u8>> {
        self.lights
            .lock()
            .map(|lights| lights.get(&address).copied())
            .map_err(|_| DeviceError::Other("mesh lock poisoned".to_string()))
    }

    fn set_level(&self, address: NetworkAddress, level: u8) -> Result<()> {
        self.lights
            .lock()
            .map(|mut lights| {
                lights.insert(address, level);
            })
            .map_err(|_| DeviceError::Other("mesh lock poisoned".to_string()))
    }

    fn reply(request: &ZclFrame, frame_type: FrameType, command_id: u8, payload: Bytes) -> Bytes {
        let mut header = request.header;
        header.frame_control.frame_type = frame_type;
        header.frame_control.direction = Direction::ServerToClient;
        header.frame_control.disable_default_response = true;
        header.command_id = command_id;
        ZclFrame { header, payload }.encode()
    }

    fn default_response(request: &ZclFrame, status: Status) -> Bytes {
        let mut payload = ZclWriter::new();
        payload
            .write_u8(request.header.command_id)
            .write_u8(status.code());
        Self::reply(request, FrameType::Global, DEFAULT_RESPONSE_ID, payload.finish())
    }
}

#[async_trait]
impl NetworkTransport for SimulatedMesh {
    fn name(&self) -> &str {
        "simulated-mesh"
    }

    fn subscribe_announce(&self, callback: AnnounceCallback) -> Result<AnnounceSubscription> {
        Ok(self.listeners.subscribe(callback))
    }

    fn unsubscribe_announce(&self, subscription: AnnounceSubscription) {
        self.listeners.unsubscribe(subscription);
    }

    async fn known_addresses(&self) -> Result<Vec<NetworkAddress>> {
        let lights = self
            .lights
            .lock()
            .map_err(|_| DeviceError::Other("mesh lock poisoned".to_string()))?;
        let mut addresses: Vec<_> = lights.keys().copied().collect();
        addresses.push(NetworkAddress::COORDINATOR);
        addresses.sort();
        Ok(addresses)
    }

    async fn neighbor_link_quality(&self, address: NetworkAddress) -> Result<Vec<NeighborLink>> {
        if !address.is_coordinator() {
            return Ok(Vec::new());
        }
        Ok(self
            .known_addresses()
            .await?
            .into_iter()
            .filter(|a| !a.is_coordinator())
            .map(|neighbor| NeighborLink {
                neighbor,
                link_quality: 180,
            })
            .collect())
    }

    async fn ieee_address(&self, address: NetworkAddress) -> Result<ExtendedAddress> {
        match self.level(address)? {
            Some(_) => Ok(ExtendedAddress(0x00158D0000000000 | u64::from(address.raw()))),
            None => Err(DeviceError::TransportUnreachable(address.to_string())),
        }
    }

    async fn active_endpoints(&self, address: NetworkAddress) -> Result<Vec<EndpointId>> {
        match self.level(address)? {
            Some(_) => Ok(vec![1]),
            None => Err(DeviceError::TransportUnreachable(address.to_string())),
        }
    }

    async fn simple_descriptor(
        &self,
        _address: NetworkAddress,
        endpoint: EndpointId,
    ) -> Result<SimpleDescriptor> {
        Ok(SimpleDescriptor {
            endpoint,
            profile_id: 0x0104,
            device_id: 0x0101,
            device_version: 1,
            input_clusters: vec![0x0000, 0x0006, level_control::CLUSTER_ID],
            output_clusters: vec![0x0019],
        })
    }

    async fn send_command(
        &self,
        address: NetworkAddress,
        _endpoint: EndpointId,
        cluster_id: ClusterId,
        frame: Bytes,
    ) -> Result<Bytes> {
        let request = ZclFrame::decode(frame)?;
        let current = self
            .level(address)?
            .ok_or_else(|| DeviceError::TransportUnreachable(address.to_string()))?;
        if cluster_id != level_control::CLUSTER_ID {
            return Ok(Self::default_response(&request, Status::UnsupportedCluster));
        }

        let frame_type = request.header.frame_control.frame_type;
        match (frame_type, request.header.command_id) {
            (FrameType::Global, READ_ATTRIBUTES) => {
                let mut reader = ZclReader::new(request.payload.clone());
                let mut records = ZclWriter::new();
                while !reader.is_exhausted() {
                    let attribute = reader.read_u16()?;
                    records.write_u16(attribute);
                    if attribute == level_control::ATTR_CURRENT_LEVEL {
                        // success, uint8
                        records.write_u8(0x00).write_u8(0x20).write_u8(current);
                    } else {
                        records.write_u8(Status::UnsupportedAttribute.code());
                    }
                }
                Ok(Self::reply(
                    &request,
                    FrameType::Global,
                    READ_ATTRIBUTES_RESPONSE,
                    records.finish(),
                ))
            }
            // MoveToLevel and MoveToLevelWithOnOff
            (FrameType::ClusterSpecific, 0x00 | 0x04) => {
                let level = ZclReader::new(request.payload.clone()).read_u8()?;
                self.set_level(address, level)?;
                Ok(Self::default_response(&request, Status::Success))
            }
            _ => Ok(Self::default_response(&request, Status::UnsupClusterCommand)),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigBuilder::new()
        .with_environment_prefix("ZIGFLOW")
        .build()?;
    zigflow_core::logging::init_from_config(&config.logging)?;
    let mut discovery = config.discovery.clone();
    discovery.lqi_discovery_enabled = true;

    let mesh = Arc::new(SimulatedMesh::with_lights(&[0x1A01, 0x1A02, 0x1A03]));
    let registry = SharedDeviceRegistry::new();
    let mut events = registry.subscribe();

    let manager = DiscoveryManager::new(mesh.clone(), registry.clone(), discovery)?;
    manager.startup()?;

    // A light joining after the scans started is picked up through its announcement
    tokio::time::sleep(Duration::from_millis(50)).await;
    let late = NetworkAddress(0x1A04);
    mesh.join(late);
    mesh.listeners.dispatch(&AnnounceEvent::new(late, None));

    let mut added = 0;
    while added < 4 {
        match timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Ok(RegistryEvent::DeviceAdded(device))) => {
                info!(
                    "Discovered {} ({}) with {} endpoint(s)",
                    device.network_address(),
                    device.extended_address(),
                    device.endpoints().len()
                );
                added += 1;
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => anyhow::bail!("registry events lost: {}", e),
            Err(_) => anyhow::bail!("only {} of 4 lights discovered", added),
        }
    }

    manager.shutdown().await;
    if let Some(stats) = manager.builder_stats() {
        info!("Builder stopped: {} built, {} failed", stats.built, stats.failed);
    }

    for device in registry.devices_with_cluster(level_control::CLUSTER_ID)? {
        let light = LevelControl::new(ClusterProxy::for_device(
            &LEVEL_CONTROL,
            manager.client().clone(),
            &device,
        )?);
        light.move_to_level(128, 10, true).await?;
        let level = light.current_level().await?;
        info!("{} is now at level {}", device.network_address(), level);
    }

    println!("{}", registry.to_json()?);
    Ok(())
}
