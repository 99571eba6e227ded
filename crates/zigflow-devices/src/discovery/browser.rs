//! Single-pass scan of the transport's address table.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::queue::{DiscoveryQueue, PushOutcome};
use crate::discovery::{DiscoveryCandidate, DiscoverySource};
use crate::registry::SharedDeviceRegistry;
use crate::zcl::client::ClusterClient;

/// Pushes every known address that is not registered yet
#[derive(Debug)]
pub struct NetworkBrowser {
    client: Arc<ClusterClient>,
    queue: Arc<DiscoveryQueue>,
    registry: SharedDeviceRegistry,
    skip_coordinator: bool,
}

impl NetworkBrowser {
    /// Create a browser
    pub fn new(
        client: Arc<ClusterClient>,
        queue: Arc<DiscoveryQueue>,
        registry: SharedDeviceRegistry,
        skip_coordinator: bool,
    ) -> Self {
        Self {
            client,
            queue,
            registry,
            skip_coordinator,
        }
    }

    /// Run one pass; returns the number of candidates queued
    pub async fn run(self, cancel: CancellationToken) -> usize {
        let transport = self.client.transport().clone();
        let scan = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Address scan cancelled before it started");
                return 0;
            }
            scan = self.client.bounded("address table scan", transport.known_addresses()) => scan,
        };
        let addresses = match scan {
            Ok(addresses) => addresses,
            Err(e) => {
                warn!("Address table scan failed: {}", e);
                return 0;
            }
        };

        let mut queued = 0;
        for address in addresses {
            if cancel.is_cancelled() {
                debug!("Address scan cancelled");
                break;
            }
            if address.is_broadcast() || (self.skip_coordinator && address.is_coordinator()) {
                continue;
            }
            if self.registry.contains(address).unwrap_or(false) {
                continue;
            }

            let candidate = DiscoveryCandidate::new(address, DiscoverySource::AddressScan);
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                outcome = self.queue.push(candidate) => outcome,
            };
            match outcome {
                PushOutcome::Enqueued => queued += 1,
                PushOutcome::Closed => break,
                PushOutcome::Duplicate | PushOutcome::Full => {}
            }
        }

        info!(queued, "Address scan finished");
        queued
    }
}
