/*!
 * Network transport facade.
 *
 * ZigFlow does not talk to the radio itself. A coordinator driver implements
 * [`NetworkTransport`] and exposes its address tables, ZDO requests and the
 * raw ZCL send primitive; discovery and the cluster framework are built on
 * top of that trait only.
 */
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use zigflow_core::types::{ClusterId, EndpointId, ExtendedAddress, NetworkAddress, ProfileId};

use crate::device::Result;

/// Device announce notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceEvent {
    /// Short address the device (re)joined with
    pub network_address: NetworkAddress,
    /// IEEE address, if the announcement carried it
    pub extended_address: Option<ExtendedAddress>,
    /// MAC capability flags
    pub capabilities: u8,
    /// When the transport received the announcement
    pub received_at: DateTime<Utc>,
}

impl AnnounceEvent {
    /// Create an announce event stamped with the current time
    pub fn new(network_address: NetworkAddress, extended_address: Option<ExtendedAddress>) -> Self {
        Self {
            network_address,
            extended_address,
            capabilities: 0,
            received_at: Utc::now(),
        }
    }
}

/// Callback invoked on the transport's delivery thread for each announcement
///
/// Implementations must return quickly; they run inline with the radio driver.
pub type AnnounceCallback = Arc<dyn Fn(&AnnounceEvent) + Send + Sync>;

/// Handle identifying one announce registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnnounceSubscription(u64);

impl AnnounceSubscription {
    /// Raw handle value
    pub fn id(self) -> u64 {
        self.0
    }
}

/// One row of a neighbor table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborLink {
    /// The neighbor's short address
    pub neighbor: NetworkAddress,
    /// Link quality indicator as reported by the queried device (0..=255)
    pub link_quality: u8,
}

/// Simple descriptor of one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleDescriptor {
    /// The endpoint number
    pub endpoint: EndpointId,
    /// Application profile
    pub profile_id: ProfileId,
    /// Application device type
    pub device_id: u16,
    /// Application device version
    pub device_version: u8,
    /// Server-side clusters
    pub input_clusters: Vec<ClusterId>,
    /// Client-side clusters
    pub output_clusters: Vec<ClusterId>,
}

/// The radio/network driver boundary
///
/// Failures are reported as [`DeviceError::TransportTimeout`] or
/// [`DeviceError::TransportUnreachable`].
///
/// [`DeviceError::TransportTimeout`]: crate::device::DeviceError::TransportTimeout
/// [`DeviceError::TransportUnreachable`]: crate::device::DeviceError::TransportUnreachable
#[async_trait]
pub trait NetworkTransport: Send + Sync + Debug {
    /// Human readable name of the transport, used in log spans
    fn name(&self) -> &str;

    /// Register a callback for device announcements
    fn subscribe_announce(&self, callback: AnnounceCallback) -> Result<AnnounceSubscription>;

    /// Remove a registration; unknown handles are ignored
    fn unsubscribe_announce(&self, subscription: AnnounceSubscription);

    /// Snapshot of the addresses in the transport's address table
    async fn known_addresses(&self) -> Result<Vec<NetworkAddress>>;

    /// Neighbor table of `address`
    async fn neighbor_link_quality(&self, address: NetworkAddress) -> Result<Vec<NeighborLink>>;

    /// IEEE address of `address`
    async fn ieee_address(&self, address: NetworkAddress) -> Result<ExtendedAddress>;

    /// Active endpoints of `address`
    async fn active_endpoints(&self, address: NetworkAddress) -> Result<Vec<EndpointId>>;

    /// Simple descriptor of one endpoint
    async fn simple_descriptor(
        &self,
        address: NetworkAddress,
        endpoint: EndpointId,
    ) -> Result<SimpleDescriptor>;

    /// Send an encoded ZCL frame and return the encoded reply frame
    async fn send_command(
        &self,
        address: NetworkAddress,
        endpoint: EndpointId,
        cluster_id: ClusterId,
        frame: Bytes,
    ) -> Result<Bytes>;
}

/// Bookkeeping for announce callbacks, for transports to embed
#[derive(Default)]
pub struct AnnounceListeners {
    next_id: AtomicU64,
    callbacks: RwLock<HashMap<u64, AnnounceCallback>>,
}

impl AnnounceListeners {
    /// Create an empty listener set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback
    pub fn subscribe(&self, callback: AnnounceCallback) -> AnnounceSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.callbacks.write() {
            Ok(mut callbacks) => {
                callbacks.insert(id, callback);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(id, callback);
            }
        }
        debug!("Registered announce listener {}", id);
        AnnounceSubscription(id)
    }

    /// Remove a callback; returns whether it was registered
    pub fn unsubscribe(&self, subscription: AnnounceSubscription) -> bool {
        let removed = match self.callbacks.write() {
            Ok(mut callbacks) => callbacks.remove(&subscription.0).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(&subscription.0).is_some(),
        };
        if !removed {
            warn!("Announce listener {} was not registered", subscription.0);
        }
        removed
    }

    /// Deliver an event to every callback
    pub fn dispatch(&self, event: &AnnounceEvent) -> usize {
        // Clone out so a callback may unsubscribe without deadlocking
        let callbacks: Vec<AnnounceCallback> = match self.callbacks.read() {
            Ok(callbacks) => callbacks.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };
        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.callbacks.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Whether no callback is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for AnnounceListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnounceListeners")
            .field("registered", &self.len())
            .finish()
    }
}
