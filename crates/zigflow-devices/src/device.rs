/*!
 * Device model and the device error family.
 *
 * A [`DeviceModel`] is what discovery produces for every node it manages to
 * interrogate: its addresses and the endpoints it exposes. Every failure
 * raised by this crate, from the transport up to a capability proxy, is a
 * [`DeviceError`].
 */
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use zigflow_core::{
    error::Error as CoreError,
    types::{ClusterId, EndpointId, ExtendedAddress, NetworkAddress, ProfileId},
};

use crate::zcl::status::Status;

/// Error type for device operations
///
/// Transport faults, malformed frames and non-success ZCL statuses all land
/// in this one type, so callers can handle a failed command generically.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// No response arrived before the deadline
    #[error("Transport timeout: {0}")]
    TransportTimeout(String),

    /// The destination could not be reached
    #[error("Transport unreachable: {0}")]
    TransportUnreachable(String),

    /// The response frame had the wrong shape or was too short
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The device answered with a non-success status
    #[error("{status} ({context})")]
    Status {
        /// The status returned by the device
        status: Status,
        /// What was being attempted
        context: String,
    },

    /// A discovery interrogation step failed
    #[error("Interrogation of {address} failed: {reason}")]
    InterrogationFailure {
        /// The device being interrogated
        address: NetworkAddress,
        /// The underlying failure
        reason: String,
    },

    /// The command is not part of the cluster
    #[error("Command not supported: {0}")]
    UnsupportedCommand(String),

    /// The attribute is not part of the cluster
    #[error("Attribute not supported: {0}")]
    UnsupportedAttribute(String),

    /// The component is in an invalid state for the operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

impl DeviceError {
    /// Create a malformed response error
    pub fn malformed<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::MalformedResponse(msg.as_ref().to_string())
    }

    /// Create a status error
    pub fn status<S: AsRef<str>>(status: Status, context: S) -> Self {
        DeviceError::Status {
            status,
            context: context.as_ref().to_string(),
        }
    }

    /// Wrap a failure raised while interrogating `address`
    pub fn interrogation(address: NetworkAddress, cause: DeviceError) -> Self {
        match cause {
            DeviceError::InterrogationFailure { .. } => cause,
            other => DeviceError::InterrogationFailure {
                address,
                reason: other.to_string(),
            },
        }
    }

    /// The ZCL status carried by this error, if any
    pub fn zcl_status(&self) -> Option<Status> {
        match self {
            DeviceError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the failure happened below the application layer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DeviceError::TransportTimeout(_) | DeviceError::TransportUnreachable(_)
        )
    }
}

/// Device availability as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceStatus {
    /// The device answered its interrogation or a later command
    Online,
    /// The device stopped answering
    Offline,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Online => f.write_str("online"),
            DeviceStatus::Offline => f.write_str("offline"),
        }
    }
}

/// An endpoint as described by its simple descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointModel {
    /// The endpoint number
    pub endpoint_id: EndpointId,
    /// The application profile
    pub profile_id: ProfileId,
    /// The application device type
    pub device_id: u16,
    /// The application device version
    pub device_version: u8,
    /// Server-side clusters
    pub input_clusters: Vec<ClusterId>,
    /// Client-side clusters
    pub output_clusters: Vec<ClusterId>,
}

impl EndpointModel {
    /// All clusters the endpoint exposes, server and client side
    pub fn supported_cluster_ids(&self) -> BTreeSet<ClusterId> {
        self.input_clusters
            .iter()
            .chain(self.output_clusters.iter())
            .copied()
            .collect()
    }

    /// Whether the endpoint implements the server side of `cluster`
    pub fn has_input_cluster(&self, cluster: ClusterId) -> bool {
        self.input_clusters.contains(&cluster)
    }
}

/// A fully interrogated node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceModel {
    network_address: NetworkAddress,
    extended_address: ExtendedAddress,
    endpoints: Vec<EndpointModel>,
    status: DeviceStatus,
    discovered_at: DateTime<Utc>,
}

impl DeviceModel {
    /// Create a device model; endpoints are kept sorted by endpoint id
    pub fn new(
        network_address: NetworkAddress,
        extended_address: ExtendedAddress,
        mut endpoints: Vec<EndpointModel>,
    ) -> Self {
        endpoints.sort_by_key(|e| e.endpoint_id);
        Self {
            network_address,
            extended_address,
            endpoints,
            status: DeviceStatus::Online,
            discovered_at: Utc::now(),
        }
    }

    /// The 16-bit network address
    pub fn network_address(&self) -> NetworkAddress {
        self.network_address
    }

    /// The IEEE address
    pub fn extended_address(&self) -> ExtendedAddress {
        self.extended_address
    }

    /// The endpoints, ordered by endpoint id
    pub fn endpoints(&self) -> &[EndpointModel] {
        &self.endpoints
    }

    /// Look up one endpoint
    pub fn endpoint(&self, id: EndpointId) -> Option<&EndpointModel> {
        self.endpoints.iter().find(|e| e.endpoint_id == id)
    }

    /// Current availability
    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    /// When the interrogation finished
    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }

    /// First endpoint serving `cluster`
    pub fn endpoint_for_cluster(&self, cluster: ClusterId) -> Option<&EndpointModel> {
        self.endpoints.iter().find(|e| e.has_input_cluster(cluster))
    }

    /// Whether any endpoint serves `cluster`
    pub fn has_cluster(&self, cluster: ClusterId) -> bool {
        self.endpoint_for_cluster(cluster).is_some()
    }

    pub(crate) fn with_status(&self, status: DeviceStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(id: EndpointId, inputs: &[ClusterId], outputs: &[ClusterId]) -> EndpointModel {
        EndpointModel {
            endpoint_id: id,
            profile_id: 0x0104,
            device_id: 0x0101,
            device_version: 1,
            input_clusters: inputs.to_vec(),
            output_clusters: outputs.to_vec(),
        }
    }

    #[test]
    fn test_supported_cluster_ids_is_union() {
        let ep = endpoint(1, &[0x0000, 0x0008], &[0x0019, 0x0008]);
        let ids: Vec<_> = ep.supported_cluster_ids().into_iter().collect();
        assert_eq!(ids, vec![0x0000, 0x0008, 0x0019]);
    }

    #[test]
    fn test_device_model_sorts_endpoints() {
        let device = DeviceModel::new(
            NetworkAddress(0x1234),
            ExtendedAddress(0xAABB),
            vec![endpoint(11, &[0x0500], &[]), endpoint(1, &[0x0008], &[])],
        );
        let ids: Vec<_> = device.endpoints().iter().map(|e| e.endpoint_id).collect();
        assert_eq!(ids, vec![1, 11]);
        assert_eq!(device.status(), DeviceStatus::Online);
        assert_eq!(device.endpoint_for_cluster(0x0500).map(|e| e.endpoint_id), Some(11));
        assert!(!device.has_cluster(0x0006));
    }

    #[test]
    fn test_status_error_message_names_status() {
        let err = DeviceError::status(Status::Failure, "move to level");
        assert_eq!(err.to_string(), "FAILURE (move to level)");
        assert_eq!(err.zcl_status(), Some(Status::Failure));
        assert!(!err.is_transport());
    }

    #[test]
    fn test_interrogation_wraps_once() {
        let addr = NetworkAddress(0x0042);
        let inner = DeviceError::TransportTimeout("active endpoints".into());
        let wrapped = DeviceError::interrogation(addr, inner);
        let rewrapped = DeviceError::interrogation(addr, wrapped);
        assert_eq!(
            rewrapped.to_string(),
            "Interrogation of 0x0042 failed: Transport timeout: active endpoints"
        );
    }
}
