/*!
 * ZCL frame envelope.
 *
 * ```text
 * | frame control | manufacturer code (opt) | transaction seq | command id | payload... |
 * |      1        |            2            |        1        |     1      |     n      |
 * ```
 */
use bytes::Bytes;

use crate::device::{DeviceError, Result};
use crate::zcl::codec::{ZclReader, ZclWriter};

const FRAME_TYPE_MASK: u8 = 0b0000_0011;
const MANUFACTURER_SPECIFIC: u8 = 0b0000_0100;
const DIRECTION_SERVER_TO_CLIENT: u8 = 0b0000_1000;
const DISABLE_DEFAULT_RESPONSE: u8 = 0b0001_0000;

/// Whether the command is a profile-wide or cluster-specific one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Command acts across the entire profile (read attributes, default response, ...)
    Global,
    /// Command is specific to the addressed cluster
    ClusterSpecific,
}

/// Which side of the cluster sent the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sent by the client side (requests to a device's server cluster)
    ClientToServer,
    /// Sent by the server side (responses and notifications)
    ServerToClient,
}

impl Direction {
    /// The direction a reply to this frame travels in
    pub fn reverse(self) -> Self {
        match self {
            Direction::ClientToServer => Direction::ServerToClient,
            Direction::ServerToClient => Direction::ClientToServer,
        }
    }
}

/// Decoded frame control field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameControl {
    /// Frame type
    pub frame_type: FrameType,
    /// Whether a manufacturer code follows
    pub manufacturer_specific: bool,
    /// Direction of travel
    pub direction: Direction,
    /// Whether the receiver should suppress the default response
    pub disable_default_response: bool,
}

impl FrameControl {
    /// Control field for a client request
    pub fn request(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            manufacturer_specific: false,
            direction: Direction::ClientToServer,
            disable_default_response: false,
        }
    }

    /// Encode to the wire byte
    pub fn to_byte(self) -> u8 {
        let mut byte = match self.frame_type {
            FrameType::Global => 0b00,
            FrameType::ClusterSpecific => 0b01,
        };
        if self.manufacturer_specific {
            byte |= MANUFACTURER_SPECIFIC;
        }
        if self.direction == Direction::ServerToClient {
            byte |= DIRECTION_SERVER_TO_CLIENT;
        }
        if self.disable_default_response {
            byte |= DISABLE_DEFAULT_RESPONSE;
        }
        byte
    }

    /// Decode the wire byte
    pub fn from_byte(byte: u8) -> Result<Self> {
        let frame_type = match byte & FRAME_TYPE_MASK {
            0b00 => FrameType::Global,
            0b01 => FrameType::ClusterSpecific,
            other => {
                return Err(DeviceError::malformed(format!(
                    "reserved frame type {:#04b}",
                    other
                )))
            }
        };
        Ok(Self {
            frame_type,
            manufacturer_specific: byte & MANUFACTURER_SPECIFIC != 0,
            direction: if byte & DIRECTION_SERVER_TO_CLIENT != 0 {
                Direction::ServerToClient
            } else {
                Direction::ClientToServer
            },
            disable_default_response: byte & DISABLE_DEFAULT_RESPONSE != 0,
        })
    }
}

/// ZCL header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZclHeader {
    /// Frame control
    pub frame_control: FrameControl,
    /// Manufacturer code, present iff the frame is manufacturer specific
    pub manufacturer_code: Option<u16>,
    /// Transaction sequence number used to match replies
    pub transaction_sequence: u8,
    /// Command identifier
    pub command_id: u8,
}

/// A whole ZCL frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZclFrame {
    /// Header
    pub header: ZclHeader,
    /// Command payload
    pub payload: Bytes,
}

impl ZclFrame {
    /// Serialize header and payload
    pub fn encode(&self) -> Bytes {
        let mut writer = ZclWriter::with_capacity(5 + self.payload.len());
        let mut control = self.header.frame_control;
        control.manufacturer_specific = self.header.manufacturer_code.is_some();
        writer.write_u8(control.to_byte());
        if let Some(code) = self.header.manufacturer_code {
            writer.write_u16(code);
        }
        writer
            .write_u8(self.header.transaction_sequence)
            .write_u8(self.header.command_id)
            .write_bytes(&self.payload);
        writer.finish()
    }

    /// Parse a received frame
    pub fn decode(raw: Bytes) -> Result<Self> {
        let mut reader = ZclReader::new(raw);
        let frame_control = FrameControl::from_byte(reader.read_u8()?)?;
        let manufacturer_code = if frame_control.manufacturer_specific {
            Some(reader.read_u16()?)
        } else {
            None
        };
        let transaction_sequence = reader.read_u8()?;
        let command_id = reader.read_u8()?;
        Ok(Self {
            header: ZclHeader {
                frame_control,
                manufacturer_code,
                transaction_sequence,
                command_id,
            },
            payload: reader.rest(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_control_bits() {
        let control = FrameControl {
            frame_type: FrameType::ClusterSpecific,
            manufacturer_specific: true,
            direction: Direction::ServerToClient,
            disable_default_response: true,
        };
        assert_eq!(control.to_byte(), 0b0001_1101);
        assert_eq!(FrameControl::from_byte(0b0001_1101).unwrap(), control);
        assert!(FrameControl::from_byte(0b0000_0010).is_err());
    }

    #[test]
    fn test_encode_cluster_request() {
        // Level Control "move to level" to 0x80 over 10 tenths, seq 7
        let frame = ZclFrame {
            header: ZclHeader {
                frame_control: FrameControl::request(FrameType::ClusterSpecific),
                manufacturer_code: None,
                transaction_sequence: 7,
                command_id: 0x00,
            },
            payload: Bytes::from_static(&[0x80, 0x0A, 0x00]),
        };
        assert_eq!(
            frame.encode().as_ref(),
            &[0x01, 0x07, 0x00, 0x80, 0x0A, 0x00]
        );
    }

    #[test]
    fn test_decode_manufacturer_specific() {
        let raw = Bytes::from_static(&[0x1C, 0x5F, 0x11, 0x2A, 0x0B, 0x02, 0x00]);
        let frame = ZclFrame::decode(raw).unwrap();
        assert_eq!(frame.header.manufacturer_code, Some(0x115F));
        assert_eq!(frame.header.transaction_sequence, 0x2A);
        assert_eq!(frame.header.command_id, 0x0B);
        assert_eq!(frame.header.frame_control.direction, Direction::ServerToClient);
        assert_eq!(frame.payload.as_ref(), &[0x02, 0x00]);
    }

    #[test]
    fn test_truncated_header_is_malformed() {
        let err = ZclFrame::decode(Bytes::from_static(&[0x08, 0x01])).unwrap_err();
        assert!(matches!(err, DeviceError::MalformedResponse(_)));
    }
}
