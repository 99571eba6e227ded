//! Scripted in-memory transport for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;

use zigflow_core::types::{ClusterId, EndpointId, ExtendedAddress, NetworkAddress};

use crate::device::{DeviceError, Result};
use crate::transport::{
    AnnounceCallback, AnnounceEvent, AnnounceListeners, AnnounceSubscription, NeighborLink,
    NetworkTransport, SimpleDescriptor,
};
use crate::zcl::frame::{Direction, FrameType, ZclFrame};

type Responder = Box<dyn FnOnce(&ZclFrame) -> Result<Bytes> + Send>;

enum Scripted {
    Reply(Responder),
    Hang,
}

/// One command the stub received
#[derive(Debug, Clone)]
pub(crate) struct SentCommand {
    pub address: NetworkAddress,
    pub endpoint: EndpointId,
    pub cluster_id: ClusterId,
    pub frame: Bytes,
}

#[derive(Debug, Clone)]
struct StubNode {
    ieee: ExtendedAddress,
    endpoints: Vec<SimpleDescriptor>,
}

#[derive(Default)]
struct StubState {
    addresses: Vec<NetworkAddress>,
    nodes: HashMap<NetworkAddress, StubNode>,
    hanging: HashSet<NetworkAddress>,
    neighbors: HashMap<NetworkAddress, Vec<NeighborLink>>,
    replies: VecDeque<Scripted>,
    sent: Vec<SentCommand>,
    interrogated: Vec<NetworkAddress>,
    neighbor_queries: Vec<NetworkAddress>,
}

#[derive(Default)]
pub(crate) struct StubTransport {
    listeners: AnnounceListeners,
    fail_subscribe: AtomicBool,
    hang_scans: AtomicBool,
    state: Mutex<StubState>,
}

impl std::fmt::Debug for StubTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubTransport")
            .field("listeners", &self.listeners)
            .finish()
    }
}

/// Simple descriptor of a Home Automation endpoint
pub(crate) fn ha_endpoint(endpoint: EndpointId, inputs: &[ClusterId]) -> SimpleDescriptor {
    SimpleDescriptor {
        endpoint,
        profile_id: 0x0104,
        device_id: 0x0101,
        device_version: 1,
        input_clusters: inputs.to_vec(),
        output_clusters: vec![0x0019],
    }
}

/// Build a server-to-client reply to `request` carrying the same sequence number
pub(crate) fn server_reply(
    request: &ZclFrame,
    frame_type: FrameType,
    command_id: u8,
    payload: &[u8],
) -> Bytes {
    let mut header = request.header;
    header.frame_control.frame_type = frame_type;
    header.frame_control.direction = Direction::ServerToClient;
    header.frame_control.disable_default_response = true;
    header.command_id = command_id;
    ZclFrame {
        header,
        payload: Bytes::copy_from_slice(payload),
    }
    .encode()
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Add a node that answers its interrogation
    pub fn add_node(
        &self,
        address: NetworkAddress,
        ieee: ExtendedAddress,
        endpoints: Vec<SimpleDescriptor>,
    ) {
        let mut state = self.state();
        if !state.addresses.contains(&address) {
            state.addresses.push(address);
        }
        state.nodes.insert(address, StubNode { ieee, endpoints });
    }

    /// Add a node whose ZDO requests never complete
    pub fn add_silent_node(&self, address: NetworkAddress) {
        let mut state = self.state();
        if !state.addresses.contains(&address) {
            state.addresses.push(address);
        }
        state.hanging.insert(address);
    }

    pub fn set_neighbors(&self, address: NetworkAddress, links: &[(u16, u8)]) {
        self.state().neighbors.insert(
            address,
            links
                .iter()
                .map(|(neighbor, link_quality)| NeighborLink {
                    neighbor: NetworkAddress(*neighbor),
                    link_quality: *link_quality,
                })
                .collect(),
        );
    }

    pub fn fail_subscriptions(&self) {
        self.fail_subscribe.store(true, Ordering::SeqCst);
    }

    /// Make address-table and neighbor-table queries block forever
    pub fn hang_scans(&self) {
        self.hang_scans.store(true, Ordering::SeqCst);
    }

    /// Queue a reply for the next `send_command`
    pub fn script_reply<F>(&self, responder: F)
    where
        F: FnOnce(&ZclFrame) -> Result<Bytes> + Send + 'static,
    {
        self.state()
            .replies
            .push_back(Scripted::Reply(Box::new(responder)));
    }

    /// The next `send_command` never completes
    pub fn script_hang(&self) {
        self.state().replies.push_back(Scripted::Hang);
    }

    /// Deliver a device announcement to every listener
    pub fn announce(&self, address: NetworkAddress) -> usize {
        self.listeners.dispatch(&AnnounceEvent::new(address, None))
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn sent_commands(&self) -> Vec<SentCommand> {
        self.state().sent.clone()
    }

    /// Addresses in the order their interrogation started
    pub fn interrogated(&self) -> Vec<NetworkAddress> {
        self.state().interrogated.clone()
    }

    pub fn neighbor_queries(&self) -> Vec<NetworkAddress> {
        self.state().neighbor_queries.clone()
    }

    fn node(&self, address: NetworkAddress) -> Result<Option<StubNode>> {
        let state = self.state();
        if state.hanging.contains(&address) {
            return Ok(None);
        }
        state
            .nodes
            .get(&address)
            .cloned()
            .map(Some)
            .ok_or_else(|| DeviceError::TransportUnreachable(address.to_string()))
    }
}

#[async_trait]
impl NetworkTransport for StubTransport {
    fn name(&self) -> &str {
        "stub"
    }

    fn subscribe_announce(&self, callback: AnnounceCallback) -> Result<AnnounceSubscription> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(DeviceError::TransportUnreachable(
                "announce channel unavailable".to_string(),
            ));
        }
        Ok(self.listeners.subscribe(callback))
    }

    fn unsubscribe_announce(&self, subscription: AnnounceSubscription) {
        self.listeners.unsubscribe(subscription);
    }

    async fn known_addresses(&self) -> Result<Vec<NetworkAddress>> {
        if self.hang_scans.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        Ok(self.state().addresses.clone())
    }

    async fn neighbor_link_quality(&self, address: NetworkAddress) -> Result<Vec<NeighborLink>> {
        if self.hang_scans.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        let mut state = self.state();
        state.neighbor_queries.push(address);
        Ok(state.neighbors.get(&address).cloned().unwrap_or_default())
    }

    async fn ieee_address(&self, address: NetworkAddress) -> Result<ExtendedAddress> {
        match self.node(address)? {
            Some(node) => Ok(node.ieee),
            None => futures::future::pending().await,
        }
    }

    async fn active_endpoints(&self, address: NetworkAddress) -> Result<Vec<EndpointId>> {
        self.state().interrogated.push(address);
        match self.node(address)? {
            Some(node) => Ok(node.endpoints.iter().map(|e| e.endpoint).collect()),
            None => futures::future::pending().await,
        }
    }

    async fn simple_descriptor(
        &self,
        address: NetworkAddress,
        endpoint: EndpointId,
    ) -> Result<SimpleDescriptor> {
        match self.node(address)? {
            Some(node) => node
                .endpoints
                .into_iter()
                .find(|e| e.endpoint == endpoint)
                .ok_or_else(|| DeviceError::TransportUnreachable(format!("{}/{}", address, endpoint))),
            None => futures::future::pending().await,
        }
    }

    async fn send_command(
        &self,
        address: NetworkAddress,
        endpoint: EndpointId,
        cluster_id: ClusterId,
        frame: Bytes,
    ) -> Result<Bytes> {
        let scripted = {
            let mut state = self.state();
            state.sent.push(SentCommand {
                address,
                endpoint,
                cluster_id,
                frame: frame.clone(),
            });
            state.replies.pop_front()
        };
        match scripted {
            Some(Scripted::Reply(responder)) => responder(&ZclFrame::decode(frame)?),
            Some(Scripted::Hang) => futures::future::pending().await,
            None => Err(DeviceError::TransportUnreachable(format!(
                "no reply scripted for {}",
                address
            ))),
        }
    }
}

/// Shared stub behind the transport trait object
pub(crate) fn shared(stub: &Arc<StubTransport>) -> Arc<dyn NetworkTransport> {
    stub.clone()
}
