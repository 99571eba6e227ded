/*!
 * Command requests, responses and the typed payload traits.
 *
 * A reply is classified into a [`ResponseFrame`] before anything looks at
 * its payload: either the cluster answered with a specific response, or it
 * sent the generic Default Response (global command `0x0B`, payload
 * `[command id, status]`). Only the specific shape is decoded positionally.
 */
use bytes::Bytes;

use zigflow_core::types::ClusterId;

use crate::device::{DeviceError, Result};
use crate::zcl::codec::{ZclReader, ZclWriter};
use crate::zcl::frame::{FrameControl, FrameType, ZclFrame, ZclHeader};
use crate::zcl::status::Status;

/// Global command id of the Default Response
pub const DEFAULT_RESPONSE_ID: u8 = 0x0B;

/// Request payload that knows its own layout
pub trait CommandPayload {
    /// Append the payload fields
    fn encode(&self, writer: &mut ZclWriter);

    /// Encode into a fresh buffer
    fn to_bytes(&self) -> Bytes {
        let mut writer = ZclWriter::new();
        self.encode(&mut writer);
        writer.finish()
    }
}

impl CommandPayload for () {
    fn encode(&self, _writer: &mut ZclWriter) {}
}

/// Typed specific response
pub trait ResponsePayload: Sized {
    /// Command id of the response in its header
    const COMMAND_ID: u8;

    /// Frame type the response is sent with
    const FRAME_TYPE: FrameType = FrameType::ClusterSpecific;

    /// Decode the payload fields in order
    fn decode(reader: &mut ZclReader) -> Result<Self>;

    /// Status carried inside the payload, if the layout has one
    fn status(&self) -> Status {
        Status::Success
    }
}

/// An outgoing command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Target cluster
    pub cluster_id: ClusterId,
    /// Command id
    pub command_id: u8,
    /// Encoded payload
    pub payload: Bytes,
    /// Global or cluster specific
    pub frame_type: FrameType,
    /// Manufacturer code for manufacturer-specific commands
    pub manufacturer_code: Option<u16>,
    /// Ask the device not to send a Default Response on success
    pub disable_default_response: bool,
}

impl CommandRequest {
    /// Cluster-specific command
    pub fn cluster<P: CommandPayload>(cluster_id: ClusterId, command_id: u8, payload: &P) -> Self {
        Self::raw(
            cluster_id,
            command_id,
            FrameType::ClusterSpecific,
            payload.to_bytes(),
        )
    }

    /// Profile-wide command addressed to a cluster
    pub fn global<P: CommandPayload>(cluster_id: ClusterId, command_id: u8, payload: &P) -> Self {
        Self::raw(cluster_id, command_id, FrameType::Global, payload.to_bytes())
    }

    /// Command with an already encoded payload
    pub fn raw(cluster_id: ClusterId, command_id: u8, frame_type: FrameType, payload: Bytes) -> Self {
        Self {
            cluster_id,
            command_id,
            payload,
            frame_type,
            manufacturer_code: None,
            disable_default_response: false,
        }
    }

    /// Mark the command manufacturer specific
    pub fn with_manufacturer_code(mut self, code: u16) -> Self {
        self.manufacturer_code = Some(code);
        self
    }

    /// Set the disable-default-response flag
    pub fn without_default_response(mut self) -> Self {
        self.disable_default_response = true;
        self
    }

    /// Frame this request under transaction sequence `sequence`
    pub fn to_frame(&self, sequence: u8) -> ZclFrame {
        let mut frame_control = FrameControl::request(self.frame_type);
        frame_control.manufacturer_specific = self.manufacturer_code.is_some();
        frame_control.disable_default_response = self.disable_default_response;
        ZclFrame {
            header: ZclHeader {
                frame_control,
                manufacturer_code: self.manufacturer_code,
                transaction_sequence: sequence,
                command_id: self.command_id,
            },
            payload: self.payload.clone(),
        }
    }
}

/// A specific response, not yet decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    /// Command id in the response header
    pub header_command_id: u8,
    /// Frame type of the response
    pub frame_type: FrameType,
    /// Status at the frame level; specific responses carry any other status in their payload
    pub status: Status,
    /// Raw payload
    pub payload: Bytes,
}

/// A classified reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFrame {
    /// The cluster answered with its own response command
    Specific(CommandResponse),
    /// Default Response
    Generic {
        /// Command the default response refers to
        command_id: u8,
        /// Outcome
        status: Status,
    },
}

impl ResponseFrame {
    /// Classify a decoded reply frame
    pub fn classify(frame: ZclFrame) -> Result<Self> {
        let header = frame.header;
        if header.frame_control.frame_type == FrameType::Global
            && header.command_id == DEFAULT_RESPONSE_ID
        {
            let mut reader = ZclReader::new(frame.payload);
            let command_id = reader.read_u8()?;
            let status = Status::from_code(reader.read_u8()?);
            return Ok(ResponseFrame::Generic { command_id, status });
        }
        Ok(ResponseFrame::Specific(CommandResponse {
            header_command_id: header.command_id,
            frame_type: header.frame_control.frame_type,
            status: Status::Success,
            payload: frame.payload,
        }))
    }

    /// Whether this is a Default Response with a non-success status
    pub fn is_failure(&self) -> bool {
        matches!(self, ResponseFrame::Generic { status, .. } if !status.is_success())
    }

    /// Decode the specific response `R`
    ///
    /// A failing Default Response becomes a status error; any other shape
    /// mismatch is a malformed response.
    pub fn decode_specific<R: ResponsePayload>(self, context: &str) -> Result<R> {
        match self {
            ResponseFrame::Generic { status, .. } if !status.is_success() => {
                Err(DeviceError::status(status, context))
            }
            ResponseFrame::Generic { command_id, .. } => Err(DeviceError::malformed(format!(
                "{}: expected response 0x{:02X}, got default response for 0x{:02X}",
                context,
                R::COMMAND_ID,
                command_id
            ))),
            ResponseFrame::Specific(response) => {
                if response.header_command_id != R::COMMAND_ID
                    || response.frame_type != R::FRAME_TYPE
                {
                    return Err(DeviceError::malformed(format!(
                        "{}: expected response 0x{:02X}, got 0x{:02X}",
                        context,
                        R::COMMAND_ID,
                        response.header_command_id
                    )));
                }
                let mut reader = ZclReader::new(response.payload);
                let decoded = R::decode(&mut reader)?;
                let status = decoded.status();
                if !status.is_success() {
                    return Err(DeviceError::status(status, context));
                }
                Ok(decoded)
            }
        }
    }

    /// Accept a successful Default Response to `command_id`
    pub fn expect_default(self, command_id: u8, context: &str) -> Result<()> {
        match self {
            ResponseFrame::Generic {
                command_id: answered,
                status,
            } => {
                if answered != command_id {
                    return Err(DeviceError::malformed(format!(
                        "{}: default response refers to 0x{:02X}, sent 0x{:02X}",
                        context, answered, command_id
                    )));
                }
                if !status.is_success() {
                    return Err(DeviceError::status(status, context));
                }
                Ok(())
            }
            ResponseFrame::Specific(response) => Err(DeviceError::malformed(format!(
                "{}: expected default response, got command 0x{:02X}",
                context, response.header_command_id
            ))),
        }
    }
}
