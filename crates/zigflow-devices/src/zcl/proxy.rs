/*!
 * Generic capability proxy.
 *
 * A cluster is described by plain data, a [`ClusterDescriptor`] listing its
 * attributes and commands. [`ClusterProxy`] binds a descriptor to one
 * endpoint of one device and provides attribute access, command invocation
 * and report subscriptions through the shared [`ClusterClient`].
 */
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use zigflow_core::types::{ClusterId, EndpointId, Id, NetworkAddress};

use crate::device::{DeviceError, DeviceModel, Result};
use crate::zcl::attribute::{Attribute, AttributeDescriptor, AttributeId, AttributeValue};
use crate::zcl::client::ClusterClient;
use crate::zcl::codec::ZclReader;
use crate::zcl::command::{CommandPayload, CommandRequest, ResponsePayload};
use crate::zcl::frame::{FrameType, ZclFrame};
use crate::zcl::global::{
    AttributeReport, ConfigureReporting, ConfigureReportingResponse, ReadAttributes,
    ReadAttributesResponse, ReportingConfiguration, WriteAttributes, WriteAttributesResponse,
    CONFIGURE_REPORTING, READ_ATTRIBUTES, REPORT_ATTRIBUTES, WRITE_ATTRIBUTES,
};
use crate::zcl::status::Status;

/// A command a cluster server accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Command id
    pub id: u8,
    /// Command name
    pub name: &'static str,
    /// Id of the specific response, or `None` when a Default Response answers it
    pub response: Option<u8>,
}

/// Static description of a cluster
#[derive(Debug)]
pub struct ClusterDescriptor {
    /// Cluster id
    pub id: ClusterId,
    /// Cluster name
    pub name: &'static str,
    /// Server attributes
    pub attributes: &'static [AttributeDescriptor],
    /// Server commands
    pub commands: &'static [CommandDescriptor],
}

impl ClusterDescriptor {
    /// Look up an attribute
    pub fn attribute(&self, id: AttributeId) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.id == id)
    }

    /// Look up a command
    pub fn command(&self, id: u8) -> Option<&CommandDescriptor> {
        self.commands.iter().find(|c| c.id == id)
    }
}

/// A reported attribute change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    /// Reporting device
    pub address: NetworkAddress,
    /// Cluster of the attribute
    pub cluster_id: ClusterId,
    /// Attribute id
    pub attribute_id: AttributeId,
    /// Value before the report, if one was known
    pub previous: Option<AttributeValue>,
    /// Reported value
    pub value: AttributeValue,
}

/// Callback invoked for every report of a subscribed attribute
pub type AttributeListener = Arc<dyn Fn(&AttributeChange) + Send + Sync>;

struct Subscription {
    attribute_id: AttributeId,
    listener: AttributeListener,
}

/// A cluster on one endpoint of one device
pub struct ClusterProxy {
    descriptor: &'static ClusterDescriptor,
    client: Arc<ClusterClient>,
    address: NetworkAddress,
    endpoint: EndpointId,
    attributes: BTreeMap<AttributeId, Attribute>,
    subscriptions: RwLock<HashMap<Id, Subscription>>,
}

impl fmt::Debug for ClusterProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterProxy")
            .field("cluster", &self.descriptor.name)
            .field("address", &self.address)
            .field("endpoint", &self.endpoint)
            .field("subscriptions", &self.active_subscriptions())
            .finish()
    }
}

impl ClusterProxy {
    /// Bind `descriptor` to an explicit endpoint
    pub fn new(
        descriptor: &'static ClusterDescriptor,
        client: Arc<ClusterClient>,
        address: NetworkAddress,
        endpoint: EndpointId,
    ) -> Self {
        let attributes = descriptor
            .attributes
            .iter()
            .map(|d| (d.id, Attribute::new(*d)))
            .collect();
        Self {
            descriptor,
            client,
            address,
            endpoint,
            attributes,
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Bind `descriptor` to the first endpoint of `device` serving the cluster
    pub fn for_device(
        descriptor: &'static ClusterDescriptor,
        client: Arc<ClusterClient>,
        device: &DeviceModel,
    ) -> Result<Self> {
        let endpoint = device.endpoint_for_cluster(descriptor.id).ok_or_else(|| {
            DeviceError::InvalidState(format!(
                "device {} has no endpoint serving {}",
                device.network_address(),
                descriptor.name
            ))
        })?;
        Ok(Self::new(
            descriptor,
            client,
            device.network_address(),
            endpoint.endpoint_id,
        ))
    }

    /// Cluster id
    pub fn id(&self) -> ClusterId {
        self.descriptor.id
    }

    /// Cluster name
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Static description of the cluster
    pub fn descriptor(&self) -> &'static ClusterDescriptor {
        self.descriptor
    }

    /// Device address
    pub fn address(&self) -> NetworkAddress {
        self.address
    }

    /// Endpoint the proxy talks to
    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    /// Look up an attribute
    pub fn attribute(&self, id: AttributeId) -> Result<&Attribute> {
        self.attributes.get(&id).ok_or_else(|| {
            DeviceError::UnsupportedAttribute(format!("0x{:04X} in {}", id, self.descriptor.name))
        })
    }

    /// Every attribute of the cluster, ordered by id
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    /// Read an attribute from the device and cache its value
    pub async fn read_attribute(&self, id: AttributeId) -> Result<AttributeValue> {
        let attribute = self.attribute(id)?;
        if !attribute.access().is_readable() {
            return Err(DeviceError::UnsupportedAttribute(format!(
                "{} is write-only",
                attribute.name()
            )));
        }

        let request = CommandRequest::global(
            self.descriptor.id,
            READ_ATTRIBUTES,
            &ReadAttributes {
                attributes: vec![id],
            },
        );
        let response: ReadAttributesResponse = self
            .client
            .invoke(self.address, self.endpoint, &request)
            .await?;

        let record = response.record(id).ok_or_else(|| {
            DeviceError::malformed(format!("no record for {} in read response", attribute.name()))
        })?;
        if !record.status.is_success() {
            return Err(DeviceError::status(
                record.status,
                format!("read {}", attribute.name()),
            ));
        }
        let value = record
            .value
            .clone()
            .ok_or_else(|| DeviceError::malformed("successful read record without a value"))?;
        attribute.update(value.clone())?;
        debug!(
            address = %self.address,
            cluster = self.descriptor.name,
            attribute = attribute.name(),
            value = %value,
            "Read attribute"
        );
        Ok(value)
    }

    /// Write an attribute on the device; the cache holds `value` once the device accepts it
    pub async fn write_attribute(&self, id: AttributeId, value: AttributeValue) -> Result<()> {
        let attribute = self.attribute(id)?;
        if !attribute.access().is_writable() {
            return Err(DeviceError::UnsupportedAttribute(format!(
                "{} is read-only",
                attribute.name()
            )));
        }
        if value.data_type() != attribute.data_type() {
            return Err(DeviceError::status(
                Status::InvalidDataType,
                format!(
                    "write {}: expects {:?}, got {:?}",
                    attribute.name(),
                    attribute.data_type(),
                    value.data_type()
                ),
            ));
        }

        let request = CommandRequest::global(
            self.descriptor.id,
            WRITE_ATTRIBUTES,
            &WriteAttributes {
                records: vec![(id, value.clone())],
            },
        );
        let _: WriteAttributesResponse = self
            .client
            .invoke(self.address, self.endpoint, &request)
            .await?;

        attribute.update(value.clone())?;
        debug!(
            address = %self.address,
            cluster = self.descriptor.name,
            attribute = attribute.name(),
            value = %value,
            "Wrote attribute"
        );
        Ok(())
    }

    fn command(&self, command_id: u8) -> Result<&CommandDescriptor> {
        self.descriptor.command(command_id).ok_or_else(|| {
            DeviceError::UnsupportedCommand(format!(
                "0x{:02X} in {}",
                command_id, self.descriptor.name
            ))
        })
    }

    /// Invoke a command answered by a Default Response
    pub async fn invoke<P: CommandPayload>(&self, command_id: u8, payload: &P) -> Result<()> {
        let command = self.command(command_id)?;
        if let Some(response) = command.response {
            return Err(DeviceError::UnsupportedCommand(format!(
                "{} answers with response 0x{:02X}",
                command.name, response
            )));
        }
        let request = CommandRequest::cluster(self.descriptor.id, command_id, payload);
        debug!(address = %self.address, command = command.name, "Invoking command");
        self.client
            .invoke_default(self.address, self.endpoint, &request)
            .await
    }

    /// Invoke a command answered by the specific response `R`
    pub async fn invoke_expecting<P, R>(&self, command_id: u8, payload: &P) -> Result<R>
    where
        P: CommandPayload,
        R: ResponsePayload,
    {
        let command = self.command(command_id)?;
        if command.response != Some(R::COMMAND_ID) {
            return Err(DeviceError::UnsupportedCommand(format!(
                "{} does not answer with response 0x{:02X}",
                command.name,
                R::COMMAND_ID
            )));
        }
        let request = CommandRequest::cluster(self.descriptor.id, command_id, payload);
        debug!(address = %self.address, command = command.name, "Invoking command");
        self.client
            .invoke(self.address, self.endpoint, &request)
            .await
    }

    /// Listen to reports of `attribute_id`
    ///
    /// With `reporting` set, the device is first asked to report the
    /// attribute with those parameters; the listener is only added when the
    /// device accepts.
    pub async fn subscribe(
        &self,
        attribute_id: AttributeId,
        listener: AttributeListener,
        reporting: Option<ReportingConfiguration>,
    ) -> Result<Id> {
        let attribute = self.attribute(attribute_id)?;
        if !attribute.is_reportable() {
            return Err(DeviceError::UnsupportedAttribute(format!(
                "{} is not reportable",
                attribute.name()
            )));
        }

        if let Some(config) = reporting {
            let request = CommandRequest::global(
                self.descriptor.id,
                CONFIGURE_REPORTING,
                &ConfigureReporting {
                    records: vec![(attribute_id, attribute.data_type(), config)],
                },
            );
            let _: ConfigureReportingResponse = self
                .client
                .invoke(self.address, self.endpoint, &request)
                .await?;
        }

        let id = Id::new();
        self.subscriptions
            .write()
            .map_err(|_| DeviceError::Other("subscription lock poisoned".to_string()))?
            .insert(
                id.clone(),
                Subscription {
                    attribute_id,
                    listener,
                },
            );
        info!(
            address = %self.address,
            cluster = self.descriptor.name,
            attribute = attribute.name(),
            subscription = %id,
            "Subscribed to attribute reports"
        );
        Ok(id)
    }

    /// Remove a subscription; returns whether it existed
    pub fn unsubscribe(&self, id: &Id) -> bool {
        match self.subscriptions.write() {
            Ok(mut subscriptions) => subscriptions.remove(id).is_some(),
            Err(_) => false,
        }
    }

    /// Number of live subscriptions
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Apply an inbound Report Attributes frame
    ///
    /// Known attributes are updated and their listeners notified. Returns the
    /// number of listener invocations.
    pub fn handle_report(&self, frame: &ZclFrame) -> Result<usize> {
        if frame.header.frame_control.frame_type != FrameType::Global
            || frame.header.command_id != REPORT_ATTRIBUTES
        {
            return Err(DeviceError::malformed(format!(
                "command 0x{:02X} is not an attribute report",
                frame.header.command_id
            )));
        }
        let report = AttributeReport::decode(&mut ZclReader::new(frame.payload.clone()))?;

        let mut notified = 0;
        for (attribute_id, value) in report.records {
            let attribute = match self.attributes.get(&attribute_id) {
                Some(attribute) => attribute,
                None => {
                    debug!(
                        cluster = self.descriptor.name,
                        attribute_id, "Ignoring report of unknown attribute"
                    );
                    continue;
                }
            };
            let previous = match attribute.update(value.clone()) {
                Ok(previous) => previous,
                Err(e) => {
                    warn!("Dropping report for {}: {}", attribute.name(), e);
                    continue;
                }
            };

            let change = AttributeChange {
                address: self.address,
                cluster_id: self.descriptor.id,
                attribute_id,
                previous,
                value,
            };
            // Clone listeners out so one may unsubscribe from inside the callback
            let listeners: Vec<AttributeListener> = match self.subscriptions.read() {
                Ok(subscriptions) => subscriptions
                    .values()
                    .filter(|s| s.attribute_id == attribute_id)
                    .map(|s| s.listener.clone())
                    .collect(),
                Err(_) => Vec::new(),
            };
            for listener in listeners {
                listener(&change);
                notified += 1;
            }
        }
        Ok(notified)
    }
}
