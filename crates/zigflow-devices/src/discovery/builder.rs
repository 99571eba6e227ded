/*!
 * The discovery queue's only consumer.
 *
 * For each candidate the builder asks for the active endpoints, the IEEE
 * address and one simple descriptor per endpoint, then registers the
 * assembled [`DeviceModel`]. A failed step drops that candidate only.
 */
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use zigflow_core::types::NetworkAddress;

use crate::device::{DeviceError, DeviceModel, EndpointModel, Result};
use crate::discovery::queue::DiscoveryQueue;
use crate::registry::SharedDeviceRegistry;
use crate::transport::SimpleDescriptor;
use crate::zcl::client::ClusterClient;

/// Counters reported when the builder stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuilderStats {
    /// Devices interrogated and registered
    pub built: usize,
    /// Candidates dropped after a failure
    pub failed: usize,
}

/// Interrogates candidates one at a time, in queue order
#[derive(Debug)]
pub struct DeviceBuilder {
    client: Arc<ClusterClient>,
    queue: Arc<DiscoveryQueue>,
    registry: SharedDeviceRegistry,
}

fn endpoint_model(descriptor: SimpleDescriptor) -> EndpointModel {
    EndpointModel {
        endpoint_id: descriptor.endpoint,
        profile_id: descriptor.profile_id,
        device_id: descriptor.device_id,
        device_version: descriptor.device_version,
        input_clusters: descriptor.input_clusters,
        output_clusters: descriptor.output_clusters,
    }
}

impl DeviceBuilder {
    /// Create a builder
    pub fn new(
        client: Arc<ClusterClient>,
        queue: Arc<DiscoveryQueue>,
        registry: SharedDeviceRegistry,
    ) -> Self {
        Self {
            client,
            queue,
            registry,
        }
    }

    /// Process candidates until the queue is drained and closed or `cancel` fires
    ///
    /// Cancellation is only observed between candidates.
    pub async fn run(self, cancel: CancellationToken) -> BuilderStats {
        let mut stats = BuilderStats::default();
        loop {
            let candidate = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                candidate = self.queue.pop() => match candidate {
                    Some(candidate) => candidate,
                    None => break,
                },
            };

            let address = candidate.network_address;
            let span = info_span!("interrogate", address = %address, source = %candidate.source);
            let outcome = async {
                let device = self.interrogate(address).await?;
                self.registry.register(device)
            }
            .instrument(span)
            .await;

            match outcome {
                Ok(_) => stats.built += 1,
                Err(e) => {
                    warn!("Dropping candidate {}: {}", address, e);
                    stats.failed += 1;
                }
            }
        }

        info!(built = stats.built, failed = stats.failed, "Device builder stopped");
        stats
    }

    /// Interrogate one device
    pub async fn interrogate(&self, address: NetworkAddress) -> Result<DeviceModel> {
        let transport = self.client.transport();
        let wrap = |e: DeviceError| DeviceError::interrogation(address, e);

        let endpoints = self
            .client
            .bounded("active endpoints request", transport.active_endpoints(address))
            .await
            .map_err(wrap)?;
        let ieee = self
            .client
            .bounded("IEEE address request", transport.ieee_address(address))
            .await
            .map_err(wrap)?;

        let mut models = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let descriptor = self
                .client
                .bounded(
                    "simple descriptor request",
                    transport.simple_descriptor(address, endpoint),
                )
                .await
                .map_err(wrap)?;
            models.push(endpoint_model(descriptor));
        }

        debug!(ieee = %ieee, endpoints = models.len(), "Interrogation complete");
        Ok(DeviceModel::new(address, ieee, models))
    }
}
