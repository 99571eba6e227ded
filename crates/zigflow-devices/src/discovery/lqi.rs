//! Single-pass breadth-first walk of the neighbor tables.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use zigflow_core::types::NetworkAddress;

use crate::discovery::queue::{DiscoveryQueue, PushOutcome};
use crate::discovery::{DiscoveryCandidate, DiscoverySource};
use crate::registry::SharedDeviceRegistry;
use crate::zcl::client::ClusterClient;

/// Finds devices reachable through neighbor links
///
/// The walk starts at the coordinator and every registered device. A
/// neighbor is queued once per pass, when it is not registered and its link
/// is at least `min_link_quality`. Nodes more than `max_depth` hops from a
/// starting point are not queried.
#[derive(Debug)]
pub struct LqiNetworkBrowser {
    client: Arc<ClusterClient>,
    queue: Arc<DiscoveryQueue>,
    registry: SharedDeviceRegistry,
    min_link_quality: u8,
    max_depth: usize,
    skip_coordinator: bool,
}

impl LqiNetworkBrowser {
    /// Create a link-quality browser
    pub fn new(
        client: Arc<ClusterClient>,
        queue: Arc<DiscoveryQueue>,
        registry: SharedDeviceRegistry,
        min_link_quality: u8,
        max_depth: usize,
        skip_coordinator: bool,
    ) -> Self {
        Self {
            client,
            queue,
            registry,
            min_link_quality,
            max_depth,
            skip_coordinator,
        }
    }

    /// Run one pass; returns the number of candidates queued
    pub async fn run(self, cancel: CancellationToken) -> usize {
        let transport = self.client.transport().clone();
        let mut roots = self.registry.addresses().unwrap_or_default();
        roots.sort();
        roots.retain(|address| !address.is_coordinator());
        roots.insert(0, NetworkAddress::COORDINATOR);

        let mut visited: HashSet<NetworkAddress> = roots.iter().copied().collect();
        let mut frontier: VecDeque<(NetworkAddress, usize)> =
            roots.into_iter().map(|address| (address, 0)).collect();

        let mut queued = 0;
        'walk: while let Some((address, depth)) = frontier.pop_front() {
            if depth >= self.max_depth {
                continue;
            }

            let neighbors = tokio::select! {
                biased;
                () = cancel.cancelled() => break 'walk,
                neighbors = self.client.bounded("neighbor table", transport.neighbor_link_quality(address)) => neighbors,
            };
            let neighbors = match neighbors {
                Ok(neighbors) => neighbors,
                Err(e) => {
                    warn!(address = %address, "Neighbor table query failed: {}", e);
                    continue;
                }
            };

            for link in neighbors {
                if link.link_quality < self.min_link_quality {
                    trace!(
                        neighbor = %link.neighbor,
                        lqi = link.link_quality,
                        "Ignoring weak link"
                    );
                    continue;
                }
                if link.neighbor.is_broadcast() || !visited.insert(link.neighbor) {
                    continue;
                }
                frontier.push_back((link.neighbor, depth + 1));

                if self.skip_coordinator && link.neighbor.is_coordinator() {
                    continue;
                }
                let candidate = DiscoveryCandidate::new(link.neighbor, DiscoverySource::LqiScan);
                let outcome = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break 'walk,
                    outcome = self.queue.push(candidate) => outcome,
                };
                match outcome {
                    PushOutcome::Enqueued => {
                        debug!(neighbor = %link.neighbor, via = %address, "Queued neighbor");
                        queued += 1;
                    }
                    PushOutcome::Closed => break 'walk,
                    PushOutcome::Duplicate | PushOutcome::Full => {}
                }
            }
        }

        info!(queued, "Link quality scan finished");
        queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use zigflow_core::types::ExtendedAddress;

    use crate::device::DeviceModel;
    use crate::testing::StubTransport;

    async fn walk(
        stub: &Arc<StubTransport>,
        registry: &SharedDeviceRegistry,
        min_link_quality: u8,
        max_depth: usize,
    ) -> Vec<u16> {
        let client = Arc::new(ClusterClient::new(stub.clone(), Duration::from_millis(100)));
        let queue = Arc::new(DiscoveryQueue::new(32));
        let browser = LqiNetworkBrowser::new(
            client,
            queue.clone(),
            registry.clone(),
            min_link_quality,
            max_depth,
            true,
        );
        browser.run(CancellationToken::new()).await;
        queue.close();
        let mut found = Vec::new();
        while let Some(c) = queue.pop().await {
            assert_eq!(c.source, DiscoverySource::LqiScan);
            found.push(c.network_address.raw());
        }
        found
    }

    fn mesh() -> Arc<StubTransport> {
        // coordinator -> 0x0A -> 0x0B -> 0x0C, plus a weak link to 0x0F
        let stub = Arc::new(StubTransport::new());
        stub.set_neighbors(NetworkAddress(0x0000), &[(0x000A, 200), (0x000F, 10)]);
        stub.set_neighbors(NetworkAddress(0x000A), &[(0x0000, 200), (0x000B, 150)]);
        stub.set_neighbors(NetworkAddress(0x000B), &[(0x000A, 150), (0x000C, 90)]);
        stub
    }

    #[tokio::test]
    async fn test_walk_is_breadth_first_and_filtered() {
        let stub = mesh();
        let found = walk(&stub, &SharedDeviceRegistry::new(), 50, 8).await;
        assert_eq!(found, vec![0x000A, 0x000B, 0x000C]);
    }

    #[tokio::test]
    async fn test_walk_respects_depth() {
        let stub = mesh();
        let found = walk(&stub, &SharedDeviceRegistry::new(), 0, 1).await;
        assert_eq!(found, vec![0x000A, 0x000F]);
        assert_eq!(stub.neighbor_queries(), vec![NetworkAddress(0x0000)]);
    }

    #[tokio::test]
    async fn test_registered_devices_are_not_queued() {
        let stub = mesh();
        let registry = SharedDeviceRegistry::new();
        registry
            .register(DeviceModel::new(NetworkAddress(0x000B), ExtendedAddress(0xB), vec![]))
            .unwrap();
        let found = walk(&stub, &registry, 50, 8).await;
        assert_eq!(found, vec![0x000A, 0x000C]);
    }
}
