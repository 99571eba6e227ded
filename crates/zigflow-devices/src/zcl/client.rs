/*!
 * Command dispatch.
 *
 * [`ClusterClient`] is the single path every command takes: it assigns the
 * transaction sequence number, frames and sends the request, checks that
 * the reply belongs to it and classifies the reply. Every transport call is
 * bounded by the client's timeout. Nothing here retries.
 */
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn, Instrument};

use zigflow_core::logging::operation_span;
use zigflow_core::types::{EndpointId, NetworkAddress};
use zigflow_core::utils::with_timeout;

use crate::device::{DeviceError, Result};
use crate::transport::NetworkTransport;
use crate::zcl::command::{CommandRequest, ResponseFrame, ResponsePayload};
use crate::zcl::frame::{Direction, ZclFrame};

/// Sends ZCL commands through a transport and correlates the replies
#[derive(Debug)]
pub struct ClusterClient {
    transport: Arc<dyn NetworkTransport>,
    timeout: Duration,
    sequence: AtomicU8,
}

impl ClusterClient {
    /// Create a client whose calls give up after `timeout`
    pub fn new(transport: Arc<dyn NetworkTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            sequence: AtomicU8::new(1),
        }
    }

    /// The underlying transport
    pub fn transport(&self) -> &Arc<dyn NetworkTransport> {
        &self.transport
    }

    /// Per-call deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Next transaction sequence number; wraps at 255
    pub fn next_sequence(&self) -> u8 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Run a transport call under the client's deadline
    ///
    /// Expiry is reported as [`DeviceError::TransportTimeout`] naming `what`.
    pub async fn bounded<T, F>(&self, what: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        with_timeout(self.timeout, call).await.map_err(|e| match e {
            DeviceError::Core(core) if core.is_timeout() => {
                DeviceError::TransportTimeout(format!("{} after {:?}", what, self.timeout))
            }
            other => other,
        })
    }

    /// Send a request and classify the correlated reply
    pub async fn send(
        &self,
        address: NetworkAddress,
        endpoint: EndpointId,
        request: &CommandRequest,
    ) -> Result<ResponseFrame> {
        let sequence = self.next_sequence();
        let frame = request.to_frame(sequence);
        debug!(
            address = %address,
            endpoint,
            cluster = request.cluster_id,
            command = request.command_id,
            sequence,
            "Sending command"
        );

        let what = format!(
            "command 0x{:02X} to {} cluster 0x{:04X}",
            request.command_id, address, request.cluster_id
        );
        let raw = self
            .bounded(
                &what,
                self.transport
                    .send_command(address, endpoint, request.cluster_id, frame.encode()),
            )
            .instrument(operation_span("send_command", self.transport.name()))
            .await?;

        let reply = ZclFrame::decode(raw)?;
        self.check_correlation(address, request, sequence, &reply)?;
        ResponseFrame::classify(reply)
    }

    fn check_correlation(
        &self,
        address: NetworkAddress,
        request: &CommandRequest,
        sequence: u8,
        reply: &ZclFrame,
    ) -> Result<()> {
        if reply.header.transaction_sequence != sequence {
            warn!(
                address = %address,
                cluster = request.cluster_id,
                expected = sequence,
                received = reply.header.transaction_sequence,
                "Dropping reply with foreign transaction sequence"
            );
            return Err(DeviceError::malformed(format!(
                "reply sequence {} does not match request sequence {}",
                reply.header.transaction_sequence, sequence
            )));
        }
        if reply.header.frame_control.direction != Direction::ClientToServer.reverse() {
            warn!(
                address = %address,
                cluster = request.cluster_id,
                sequence,
                "Dropping reply travelling client to server"
            );
            return Err(DeviceError::malformed("reply has client-to-server direction"));
        }
        Ok(())
    }

    /// Send a request whose answer is the specific response `R`
    pub async fn invoke<R: ResponsePayload>(
        &self,
        address: NetworkAddress,
        endpoint: EndpointId,
        request: &CommandRequest,
    ) -> Result<R> {
        let context = format!("command 0x{:02X}", request.command_id);
        self.send(address, endpoint, request)
            .await?
            .decode_specific(&context)
    }

    /// Send a request answered by a Default Response
    pub async fn invoke_default(
        &self,
        address: NetworkAddress,
        endpoint: EndpointId,
        request: &CommandRequest,
    ) -> Result<()> {
        let context = format!("command 0x{:02X}", request.command_id);
        self.send(address, endpoint, request)
            .await?
            .expect_default(request.command_id, &context)
    }
}
