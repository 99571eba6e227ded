//! IAS Zone cluster (0x0500).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use zigflow_core::types::Id;

use crate::device::{DeviceError, Result};
use crate::zcl::attribute::{Access, AttributeDescriptor, DataType};
use crate::zcl::codec::{ZclReader, ZclWriter};
use crate::zcl::command::{CommandPayload, ResponsePayload};
use crate::zcl::frame::{FrameType, ZclFrame};
use crate::zcl::proxy::{ClusterDescriptor, ClusterProxy, CommandDescriptor};

/// Cluster id
pub const CLUSTER_ID: u16 = 0x0500;

/// ZoneState attribute
pub const ATTR_ZONE_STATE: u16 = 0x0000;
/// ZoneType attribute
pub const ATTR_ZONE_TYPE: u16 = 0x0001;
/// ZoneStatus attribute
pub const ATTR_ZONE_STATUS: u16 = 0x0002;
/// IAS_CIE_Address attribute
pub const ATTR_IAS_CIE_ADDRESS: u16 = 0x0010;

const ZONE_STATUS_CHANGE_NOTIFICATION: u8 = 0x00;
const ZONE_ENROLL_REQUEST: u8 = 0x01;
const ZONE_ENROLL_RESPONSE: u8 = 0x00;

static ATTRIBUTES: [AttributeDescriptor; 4] = [
    AttributeDescriptor {
        id: ATTR_ZONE_STATE,
        name: "ZoneState",
        data_type: DataType::Enum8,
        access: Access::ReadOnly,
        reportable: false,
    },
    AttributeDescriptor {
        id: ATTR_ZONE_TYPE,
        name: "ZoneType",
        data_type: DataType::Enum16,
        access: Access::ReadOnly,
        reportable: false,
    },
    AttributeDescriptor {
        id: ATTR_ZONE_STATUS,
        name: "ZoneStatus",
        data_type: DataType::Bitmap16,
        access: Access::ReadOnly,
        reportable: true,
    },
    AttributeDescriptor {
        id: ATTR_IAS_CIE_ADDRESS,
        name: "IAS_CIE_Address",
        data_type: DataType::IeeeAddress,
        access: Access::ReadWrite,
        reportable: false,
    },
];

static COMMANDS: [CommandDescriptor; 2] = [
    CommandDescriptor {
        id: ZONE_STATUS_CHANGE_NOTIFICATION,
        name: "ZoneStatusChangeNotification",
        response: None,
    },
    CommandDescriptor {
        id: ZONE_ENROLL_REQUEST,
        name: "ZoneEnrollRequest",
        response: Some(ZONE_ENROLL_RESPONSE),
    },
];

/// IAS Zone descriptor
pub static IAS_ZONE: ClusterDescriptor = ClusterDescriptor {
    id: CLUSTER_ID,
    name: "IAS Zone",
    attributes: &ATTRIBUTES,
    commands: &COMMANDS,
};

/// ZoneStatus bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneStatus(pub u16);

impl ZoneStatus {
    /// Alarm 1 is active
    pub fn alarm1(self) -> bool {
        self.0 & 0x0001 != 0
    }

    /// Alarm 2 is active
    pub fn alarm2(self) -> bool {
        self.0 & 0x0002 != 0
    }

    /// The enclosure was tampered with
    pub fn tamper(self) -> bool {
        self.0 & 0x0004 != 0
    }

    /// Battery is low
    pub fn battery_low(self) -> bool {
        self.0 & 0x0008 != 0
    }
}

/// Zone enroll request payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneEnrollRequest {
    /// Zone type
    pub zone_type: u16,
    /// Manufacturer code
    pub manufacturer_code: u16,
}

impl CommandPayload for ZoneEnrollRequest {
    fn encode(&self, writer: &mut ZclWriter) {
        writer
            .write_u16(self.zone_type)
            .write_u16(self.manufacturer_code);
    }
}

/// Outcome of a zone enrollment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollResponseCode {
    /// Enrolled
    Success,
    /// The CIE does not support this zone type
    NotSupported,
    /// Enrollment is not permitted
    NoEnrollPermit,
    /// The zone table is full
    TooManyZones,
    /// Any other code
    Other(u8),
}

impl From<u8> for EnrollResponseCode {
    fn from(code: u8) -> Self {
        match code {
            0x00 => EnrollResponseCode::Success,
            0x01 => EnrollResponseCode::NotSupported,
            0x02 => EnrollResponseCode::NoEnrollPermit,
            0x03 => EnrollResponseCode::TooManyZones,
            other => EnrollResponseCode::Other(other),
        }
    }
}

/// Zone enroll response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneEnrollResponse {
    /// Enrollment outcome
    pub code: EnrollResponseCode,
    /// Assigned zone id
    pub zone_id: u8,
}

impl ResponsePayload for ZoneEnrollResponse {
    const COMMAND_ID: u8 = ZONE_ENROLL_RESPONSE;

    fn decode(reader: &mut ZclReader) -> Result<Self> {
        Ok(Self {
            code: EnrollResponseCode::from(reader.read_u8()?),
            zone_id: reader.read_u8()?,
        })
    }
}

/// Zone status change notification payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneStatusChangeNotification {
    /// New zone status
    pub zone_status: ZoneStatus,
    /// Extended status, reserved
    pub extended_status: u8,
}

impl CommandPayload for ZoneStatusChangeNotification {
    fn encode(&self, writer: &mut ZclWriter) {
        writer
            .write_u16(self.zone_status.0)
            .write_u8(self.extended_status);
    }
}

impl ZoneStatusChangeNotification {
    fn decode(reader: &mut ZclReader) -> Result<Self> {
        Ok(Self {
            zone_status: ZoneStatus(reader.read_u16()?),
            extended_status: reader.read_u8()?,
        })
    }
}

/// Callback for inbound zone status change notifications
pub type ZoneStatusListener = Arc<dyn Fn(&ZoneStatusChangeNotification) + Send + Sync>;

/// Typed IAS Zone proxy
pub struct IasZone {
    proxy: ClusterProxy,
    listeners: RwLock<HashMap<Id, ZoneStatusListener>>,
}

impl std::fmt::Debug for IasZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IasZone")
            .field("proxy", &self.proxy)
            .finish()
    }
}

impl IasZone {
    /// Wrap a proxy bound to the IAS Zone descriptor
    pub fn new(proxy: ClusterProxy) -> Self {
        Self {
            proxy,
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// The generic proxy
    pub fn proxy(&self) -> &ClusterProxy {
        &self.proxy
    }

    /// Send a zone enroll request
    pub async fn zone_enroll_request(&self, request: ZoneEnrollRequest) -> Result<ZoneEnrollResponse> {
        self.proxy
            .invoke_expecting(ZONE_ENROLL_REQUEST, &request)
            .await
    }

    /// Send a zone status change notification
    pub async fn zone_status_change_notification(
        &self,
        notification: ZoneStatusChangeNotification,
    ) -> Result<()> {
        self.proxy
            .invoke(ZONE_STATUS_CHANGE_NOTIFICATION, &notification)
            .await
    }

    /// Read ZoneStatus from the device
    pub async fn zone_status(&self) -> Result<ZoneStatus> {
        let value = self.proxy.read_attribute(ATTR_ZONE_STATUS).await?;
        Ok(ZoneStatus(value.as_u32().unwrap_or_default() as u16))
    }

    /// Listen to zone status change notifications sent by the device
    pub fn add_zone_status_listener(&self, listener: ZoneStatusListener) -> Result<Id> {
        let id = Id::new();
        self.listeners
            .write()
            .map_err(|_| DeviceError::Other("listener lock poisoned".to_string()))?
            .insert(id.clone(), listener);
        Ok(id)
    }

    /// Remove a listener; returns whether it was registered
    pub fn remove_zone_status_listener(&self, id: &Id) -> bool {
        self.listeners
            .write()
            .map(|mut listeners| listeners.remove(id).is_some())
            .unwrap_or(false)
    }

    /// Apply an inbound zone status change notification frame
    pub fn handle_notification(&self, frame: &ZclFrame) -> Result<usize> {
        if frame.header.frame_control.frame_type != FrameType::ClusterSpecific
            || frame.header.command_id != ZONE_STATUS_CHANGE_NOTIFICATION
        {
            return Err(DeviceError::malformed(format!(
                "command 0x{:02X} is not a zone status change notification",
                frame.header.command_id
            )));
        }
        let notification =
            ZoneStatusChangeNotification::decode(&mut ZclReader::new(frame.payload.clone()))?;
        debug!(
            address = %self.proxy.address(),
            zone_status = notification.zone_status.0,
            "Zone status changed"
        );

        let listeners: Vec<ZoneStatusListener> = match self.listeners.read() {
            Ok(listeners) => listeners.values().cloned().collect(),
            Err(_) => Vec::new(),
        };
        for listener in &listeners {
            listener(&notification);
        }
        Ok(listeners.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use bytes::Bytes;
    use zigflow_core::types::NetworkAddress;

    use crate::testing::{server_reply, StubTransport};
    use crate::zcl::client::ClusterClient;
    use crate::zcl::frame::{Direction, FrameControl, ZclHeader};

    fn zone(stub: &Arc<StubTransport>) -> IasZone {
        let client = Arc::new(ClusterClient::new(stub.clone(), Duration::from_millis(200)));
        IasZone::new(ClusterProxy::new(&IAS_ZONE, client, NetworkAddress(0x3003), 1))
    }

    #[tokio::test]
    async fn test_zone_enroll_request() {
        let stub = Arc::new(StubTransport::new());
        stub.script_reply(|request| {
            Ok(server_reply(request, FrameType::ClusterSpecific, 0x00, &[0x00, 0x07]))
        });
        let zone = zone(&stub);

        let response = zone
            .zone_enroll_request(ZoneEnrollRequest {
                zone_type: 0x0015,
                manufacturer_code: 0x1234,
            })
            .await
            .unwrap();
        assert_eq!(response.code, EnrollResponseCode::Success);
        assert_eq!(response.zone_id, 7);

        let sent = stub.sent_commands();
        assert_eq!(&sent[0].frame[2..], &[0x01, 0x15, 0x00, 0x34, 0x12]);
    }

    #[tokio::test]
    async fn test_zone_enroll_rejected_by_default_response() {
        let stub = Arc::new(StubTransport::new());
        stub.script_reply(|request| {
            Ok(server_reply(request, FrameType::Global, 0x0B, &[0x01, 0x81]))
        });
        let zone = zone(&stub);

        let err = zone
            .zone_enroll_request(ZoneEnrollRequest {
                zone_type: 0x0015,
                manufacturer_code: 0x1234,
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "UNSUP_CLUSTER_COMMAND (command 0x01)");
    }

    #[test]
    fn test_notification_reaches_listeners() {
        let stub = Arc::new(StubTransport::new());
        let zone = zone(&stub);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = zone
            .add_zone_status_listener(Arc::new(move |n: &ZoneStatusChangeNotification| {
                sink.lock().unwrap().push(n.zone_status);
            }))
            .unwrap();

        let mut frame_control = FrameControl::request(FrameType::ClusterSpecific);
        frame_control.direction = Direction::ServerToClient;
        let frame = ZclFrame {
            header: ZclHeader {
                frame_control,
                manufacturer_code: None,
                transaction_sequence: 0x10,
                command_id: 0x00,
            },
            payload: Bytes::from_static(&[0x05, 0x00, 0x00]),
        };
        assert_eq!(zone.handle_notification(&frame).unwrap(), 1);
        let status = seen.lock().unwrap()[0];
        assert!(status.alarm1());
        assert!(status.tamper());
        assert!(!status.battery_low());

        assert!(zone.remove_zone_status_listener(&id));
        assert_eq!(zone.handle_notification(&frame).unwrap(), 0);
    }
}
