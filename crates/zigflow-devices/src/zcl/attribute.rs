/*!
 * Cluster attributes and ZCL data types.
 */
use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use zigflow_core::types::ExtendedAddress;

use crate::device::{DeviceError, Result};
use crate::zcl::codec::{ZclReader, ZclWriter};

/// Attribute identifier within a cluster
pub type AttributeId = u16;

/// ZCL data type identifiers understood by the framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Boolean (0x10)
    Bool,
    /// 8-bit bitmap (0x18)
    Bitmap8,
    /// 16-bit bitmap (0x19)
    Bitmap16,
    /// Unsigned 8-bit integer (0x20)
    Uint8,
    /// Unsigned 16-bit integer (0x21)
    Uint16,
    /// Unsigned 24-bit integer (0x22)
    Uint24,
    /// Unsigned 32-bit integer (0x23)
    Uint32,
    /// Signed 8-bit integer (0x28)
    Int8,
    /// Signed 16-bit integer (0x29)
    Int16,
    /// Signed 32-bit integer (0x2B)
    Int32,
    /// 8-bit enumeration (0x30)
    Enum8,
    /// 16-bit enumeration (0x31)
    Enum16,
    /// Character string (0x42)
    CharString,
    /// IEEE address (0xF0)
    IeeeAddress,
}

impl DataType {
    /// Wire identifier
    pub fn code(self) -> u8 {
        match self {
            DataType::Bool => 0x10,
            DataType::Bitmap8 => 0x18,
            DataType::Bitmap16 => 0x19,
            DataType::Uint8 => 0x20,
            DataType::Uint16 => 0x21,
            DataType::Uint24 => 0x22,
            DataType::Uint32 => 0x23,
            DataType::Int8 => 0x28,
            DataType::Int16 => 0x29,
            DataType::Int32 => 0x2B,
            DataType::Enum8 => 0x30,
            DataType::Enum16 => 0x31,
            DataType::CharString => 0x42,
            DataType::IeeeAddress => 0xF0,
        }
    }

    /// Look up a wire identifier
    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0x10 => DataType::Bool,
            0x18 => DataType::Bitmap8,
            0x19 => DataType::Bitmap16,
            0x20 => DataType::Uint8,
            0x21 => DataType::Uint16,
            0x22 => DataType::Uint24,
            0x23 => DataType::Uint32,
            0x28 => DataType::Int8,
            0x29 => DataType::Int16,
            0x2B => DataType::Int32,
            0x30 => DataType::Enum8,
            0x31 => DataType::Enum16,
            0x42 => DataType::CharString,
            0xF0 => DataType::IeeeAddress,
            other => {
                return Err(DeviceError::malformed(format!(
                    "unsupported data type 0x{:02X}",
                    other
                )))
            }
        })
    }

    /// Analog types carry a reportable-change field in reporting configuration
    pub fn is_analog(self) -> bool {
        matches!(
            self,
            DataType::Uint8
                | DataType::Uint16
                | DataType::Uint24
                | DataType::Uint32
                | DataType::Int8
                | DataType::Int16
                | DataType::Int32
        )
    }

    /// Read one value of this type
    pub fn read_value(self, reader: &mut ZclReader) -> Result<AttributeValue> {
        Ok(match self {
            DataType::Bool => AttributeValue::Bool(reader.read_u8()? != 0),
            DataType::Bitmap8 => AttributeValue::Bitmap8(reader.read_u8()?),
            DataType::Bitmap16 => AttributeValue::Bitmap16(reader.read_u16()?),
            DataType::Uint8 => AttributeValue::U8(reader.read_u8()?),
            DataType::Uint16 => AttributeValue::U16(reader.read_u16()?),
            DataType::Uint24 => AttributeValue::U24(reader.read_u24()?),
            DataType::Uint32 => AttributeValue::U32(reader.read_u32()?),
            DataType::Int8 => AttributeValue::I8(reader.read_i8()?),
            DataType::Int16 => AttributeValue::I16(reader.read_i16()?),
            DataType::Int32 => AttributeValue::I32(reader.read_i32()?),
            DataType::Enum8 => AttributeValue::Enum8(reader.read_u8()?),
            DataType::Enum16 => AttributeValue::Enum16(reader.read_u16()?),
            DataType::CharString => AttributeValue::String(reader.read_string()?),
            DataType::IeeeAddress => AttributeValue::Ieee(reader.read_ieee()?),
        })
    }
}

/// A decoded attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// Boolean
    Bool(bool),
    /// 8-bit bitmap
    Bitmap8(u8),
    /// 16-bit bitmap
    Bitmap16(u16),
    /// Unsigned 8-bit
    U8(u8),
    /// Unsigned 16-bit
    U16(u16),
    /// Unsigned 24-bit
    U24(u32),
    /// Unsigned 32-bit
    U32(u32),
    /// Signed 8-bit
    I8(i8),
    /// Signed 16-bit
    I16(i16),
    /// Signed 32-bit
    I32(i32),
    /// 8-bit enumeration
    Enum8(u8),
    /// 16-bit enumeration
    Enum16(u16),
    /// Character string
    String(String),
    /// IEEE address
    Ieee(ExtendedAddress),
}

impl AttributeValue {
    /// The data type this value is encoded as
    pub fn data_type(&self) -> DataType {
        match self {
            AttributeValue::Bool(_) => DataType::Bool,
            AttributeValue::Bitmap8(_) => DataType::Bitmap8,
            AttributeValue::Bitmap16(_) => DataType::Bitmap16,
            AttributeValue::U8(_) => DataType::Uint8,
            AttributeValue::U16(_) => DataType::Uint16,
            AttributeValue::U24(_) => DataType::Uint24,
            AttributeValue::U32(_) => DataType::Uint32,
            AttributeValue::I8(_) => DataType::Int8,
            AttributeValue::I16(_) => DataType::Int16,
            AttributeValue::I32(_) => DataType::Int32,
            AttributeValue::Enum8(_) => DataType::Enum8,
            AttributeValue::Enum16(_) => DataType::Enum16,
            AttributeValue::String(_) => DataType::CharString,
            AttributeValue::Ieee(_) => DataType::IeeeAddress,
        }
    }

    /// Append the value without its type tag
    pub fn write(&self, writer: &mut ZclWriter) {
        match self {
            AttributeValue::Bool(v) => {
                writer.write_u8(u8::from(*v));
            }
            AttributeValue::Bitmap8(v) | AttributeValue::U8(v) | AttributeValue::Enum8(v) => {
                writer.write_u8(*v);
            }
            AttributeValue::Bitmap16(v) | AttributeValue::U16(v) | AttributeValue::Enum16(v) => {
                writer.write_u16(*v);
            }
            AttributeValue::U24(v) => {
                writer.write_u24(*v);
            }
            AttributeValue::U32(v) => {
                writer.write_u32(*v);
            }
            AttributeValue::I8(v) => {
                writer.write_i8(*v);
            }
            AttributeValue::I16(v) => {
                writer.write_i16(*v);
            }
            AttributeValue::I32(v) => {
                writer.write_i32(*v);
            }
            AttributeValue::String(v) => {
                writer.write_string(v);
            }
            AttributeValue::Ieee(v) => {
                writer.write_ieee(*v);
            }
        }
    }

    /// Numeric view of integer-like values
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            AttributeValue::Bool(v) => Some(u32::from(*v)),
            AttributeValue::Bitmap8(v) | AttributeValue::U8(v) | AttributeValue::Enum8(v) => {
                Some(u32::from(*v))
            }
            AttributeValue::Bitmap16(v) | AttributeValue::U16(v) | AttributeValue::Enum16(v) => {
                Some(u32::from(*v))
            }
            AttributeValue::U24(v) | AttributeValue::U32(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::Bitmap8(v) => write!(f, "0b{:08b}", v),
            AttributeValue::Bitmap16(v) => write!(f, "0b{:016b}", v),
            AttributeValue::I8(v) => write!(f, "{}", v),
            AttributeValue::I16(v) => write!(f, "{}", v),
            AttributeValue::I32(v) => write!(f, "{}", v),
            AttributeValue::String(v) => write!(f, "{:?}", v),
            AttributeValue::Ieee(v) => write!(f, "{}", v),
            other => match other.as_u32() {
                Some(v) => write!(f, "{}", v),
                None => write!(f, "{:?}", other),
            },
        }
    }
}

/// Attribute access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    /// Read-only attribute
    ReadOnly,
    /// Write-only attribute
    WriteOnly,
    /// Read-write attribute
    ReadWrite,
}

impl Access {
    /// Whether reads are allowed
    pub fn is_readable(self) -> bool {
        !matches!(self, Access::WriteOnly)
    }

    /// Whether writes are allowed
    pub fn is_writable(self) -> bool {
        !matches!(self, Access::ReadOnly)
    }
}

/// Static description of an attribute, part of a cluster descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeDescriptor {
    /// Attribute id
    pub id: AttributeId,
    /// Attribute name
    pub name: &'static str,
    /// Declared data type
    pub data_type: DataType,
    /// Access mode
    pub access: Access,
    /// Whether the device may report it
    pub reportable: bool,
}

/// Live attribute owned by a cluster proxy
#[derive(Debug)]
pub struct Attribute {
    descriptor: AttributeDescriptor,
    current: RwLock<Option<(AttributeValue, DateTime<Utc>)>>,
}

impl Attribute {
    /// Create an attribute with no known value
    pub fn new(descriptor: AttributeDescriptor) -> Self {
        Self {
            descriptor,
            current: RwLock::new(None),
        }
    }

    /// Attribute id
    pub fn id(&self) -> AttributeId {
        self.descriptor.id
    }

    /// Attribute name
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Declared data type
    pub fn data_type(&self) -> DataType {
        self.descriptor.data_type
    }

    /// Access mode
    pub fn access(&self) -> Access {
        self.descriptor.access
    }

    /// Whether the device may report it
    pub fn is_reportable(&self) -> bool {
        self.descriptor.reportable
    }

    /// Static description
    pub fn descriptor(&self) -> &AttributeDescriptor {
        &self.descriptor
    }

    /// Last value read or reported
    pub fn value(&self) -> Option<AttributeValue> {
        self.current
            .read()
            .ok()
            .and_then(|current| current.as_ref().map(|(value, _)| value.clone()))
    }

    /// When the value was last updated
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.current
            .read()
            .ok()
            .and_then(|current| current.as_ref().map(|(_, at)| *at))
    }

    /// Store a new value; it must have the declared type
    pub(crate) fn update(&self, value: AttributeValue) -> Result<Option<AttributeValue>> {
        if value.data_type() != self.descriptor.data_type {
            return Err(DeviceError::malformed(format!(
                "attribute {} expects {:?}, got {:?}",
                self.descriptor.name,
                self.descriptor.data_type,
                value.data_type()
            )));
        }
        let mut current = self
            .current
            .write()
            .map_err(|_| DeviceError::Other("attribute lock poisoned".to_string()))?;
        let previous = current.replace((value, Utc::now())).map(|(value, _)| value);
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    const CURRENT_LEVEL: AttributeDescriptor = AttributeDescriptor {
        id: 0x0000,
        name: "CurrentLevel",
        data_type: DataType::Uint8,
        access: Access::ReadOnly,
        reportable: true,
    };

    #[test]
    fn test_data_type_codes_round_trip() {
        for dt in [
            DataType::Bool,
            DataType::Bitmap16,
            DataType::Uint24,
            DataType::Int32,
            DataType::Enum16,
            DataType::CharString,
            DataType::IeeeAddress,
        ] {
            assert_eq!(DataType::from_code(dt.code()).unwrap(), dt);
        }
        assert!(DataType::from_code(0xE2).is_err());
    }

    #[test]
    fn test_read_value_by_type() {
        let mut reader = ZclReader::new(Bytes::from_static(&[0x34, 0x12, 0xFE]));
        assert_eq!(
            DataType::Bitmap16.read_value(&mut reader).unwrap(),
            AttributeValue::Bitmap16(0x1234)
        );
        assert_eq!(
            DataType::Int8.read_value(&mut reader).unwrap(),
            AttributeValue::I8(-2)
        );
    }

    #[test]
    fn test_attribute_update_checks_type() {
        let attr = Attribute::new(CURRENT_LEVEL);
        assert_eq!(attr.value(), None);
        assert_eq!(attr.update(AttributeValue::U8(10)).unwrap(), None);
        assert_eq!(
            attr.update(AttributeValue::U8(20)).unwrap(),
            Some(AttributeValue::U8(10))
        );
        assert!(attr.update(AttributeValue::U16(1)).is_err());
        assert_eq!(attr.value(), Some(AttributeValue::U8(20)));
        assert!(attr.updated_at().is_some());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(AttributeValue::U16(300).to_string(), "300");
        assert_eq!(AttributeValue::Bitmap8(0b101).to_string(), "0b00000101");
    }
}
