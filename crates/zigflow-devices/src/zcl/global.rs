/*!
 * Profile-wide commands: read and write attributes, configure reporting
 * and the inbound attribute report.
 */
use crate::device::{DeviceError, Result};
use crate::zcl::attribute::{AttributeId, AttributeValue, DataType};
use crate::zcl::codec::{ZclReader, ZclWriter};
use crate::zcl::command::{CommandPayload, ResponsePayload};
use crate::zcl::frame::FrameType;
use crate::zcl::status::Status;

/// Read Attributes command id
pub const READ_ATTRIBUTES: u8 = 0x00;
/// Read Attributes Response command id
pub const READ_ATTRIBUTES_RESPONSE: u8 = 0x01;
/// Write Attributes command id
pub const WRITE_ATTRIBUTES: u8 = 0x02;
/// Write Attributes Response command id
pub const WRITE_ATTRIBUTES_RESPONSE: u8 = 0x04;
/// Configure Reporting command id
pub const CONFIGURE_REPORTING: u8 = 0x06;
/// Configure Reporting Response command id
pub const CONFIGURE_REPORTING_RESPONSE: u8 = 0x07;
/// Report Attributes command id
pub const REPORT_ATTRIBUTES: u8 = 0x0A;

/// Read Attributes request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadAttributes {
    /// Attributes to read
    pub attributes: Vec<AttributeId>,
}

impl CommandPayload for ReadAttributes {
    fn encode(&self, writer: &mut ZclWriter) {
        for id in &self.attributes {
            writer.write_u16(*id);
        }
    }
}

/// One record of a Read Attributes Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadAttributeRecord {
    /// Attribute id
    pub attribute_id: AttributeId,
    /// Per-attribute status
    pub status: Status,
    /// Value, present on success
    pub value: Option<AttributeValue>,
}

/// Read Attributes Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadAttributesResponse {
    /// One record per requested attribute
    pub records: Vec<ReadAttributeRecord>,
}

impl ReadAttributesResponse {
    /// Record for `attribute_id`
    pub fn record(&self, attribute_id: AttributeId) -> Option<&ReadAttributeRecord> {
        self.records.iter().find(|r| r.attribute_id == attribute_id)
    }
}

impl ResponsePayload for ReadAttributesResponse {
    const COMMAND_ID: u8 = READ_ATTRIBUTES_RESPONSE;
    const FRAME_TYPE: FrameType = FrameType::Global;

    fn decode(reader: &mut ZclReader) -> Result<Self> {
        let mut records = Vec::new();
        while !reader.is_exhausted() {
            let attribute_id = reader.read_u16()?;
            let status = Status::from_code(reader.read_u8()?);
            let value = if status.is_success() {
                let data_type = DataType::from_code(reader.read_u8()?)?;
                Some(data_type.read_value(reader)?)
            } else {
                None
            };
            records.push(ReadAttributeRecord {
                attribute_id,
                status,
                value,
            });
        }
        Ok(Self { records })
    }
}

/// Write Attributes request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAttributes {
    /// (attribute, new value)
    pub records: Vec<(AttributeId, AttributeValue)>,
}

impl CommandPayload for WriteAttributes {
    fn encode(&self, writer: &mut ZclWriter) {
        for (attribute_id, value) in &self.records {
            writer
                .write_u16(*attribute_id)
                .write_u8(value.data_type().code());
            value.write(writer);
        }
    }
}

/// Write Attributes Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAttributesResponse {
    /// Rejected records as (status, attribute); empty when every write succeeded
    pub failures: Vec<(Status, AttributeId)>,
}

impl ResponsePayload for WriteAttributesResponse {
    const COMMAND_ID: u8 = WRITE_ATTRIBUTES_RESPONSE;
    const FRAME_TYPE: FrameType = FrameType::Global;

    fn decode(reader: &mut ZclReader) -> Result<Self> {
        if reader.remaining() == 1 {
            let status = Status::from_code(reader.read_u8()?);
            if !status.is_success() {
                return Err(DeviceError::malformed(format!(
                    "single-status write attributes response with {}",
                    status
                )));
            }
            return Ok(Self {
                failures: Vec::new(),
            });
        }
        let mut failures = Vec::new();
        while !reader.is_exhausted() {
            let status = Status::from_code(reader.read_u8()?);
            let attribute_id = reader.read_u16()?;
            failures.push((status, attribute_id));
        }
        Ok(Self { failures })
    }

    fn status(&self) -> Status {
        self.failures
            .iter()
            .map(|(status, _)| *status)
            .find(|status| !status.is_success())
            .unwrap_or(Status::Success)
    }
}

/// Reporting parameters for one attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingConfiguration {
    /// Minimum seconds between reports
    pub min_interval: u16,
    /// Maximum seconds between reports; 0xFFFF disables periodic reports
    pub max_interval: u16,
    /// Smallest change that triggers a report (analog types only)
    pub reportable_change: u32,
}

impl Default for ReportingConfiguration {
    fn default() -> Self {
        Self {
            min_interval: 1,
            max_interval: 300,
            reportable_change: 1,
        }
    }
}

/// Configure Reporting request for attributes reported by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureReporting {
    /// (attribute, declared type, parameters)
    pub records: Vec<(AttributeId, DataType, ReportingConfiguration)>,
}

fn write_change(writer: &mut ZclWriter, data_type: DataType, change: u32) {
    match data_type {
        DataType::Uint8 | DataType::Int8 => {
            writer.write_u8(change as u8);
        }
        DataType::Uint16 | DataType::Int16 => {
            writer.write_u16(change as u16);
        }
        DataType::Uint24 => {
            writer.write_u24(change);
        }
        DataType::Uint32 | DataType::Int32 => {
            writer.write_u32(change);
        }
        _ => {}
    }
}

impl CommandPayload for ConfigureReporting {
    fn encode(&self, writer: &mut ZclWriter) {
        for (attribute_id, data_type, config) in &self.records {
            // direction 0x00: the device sends the reports
            writer
                .write_u8(0x00)
                .write_u16(*attribute_id)
                .write_u8(data_type.code())
                .write_u16(config.min_interval)
                .write_u16(config.max_interval);
            if data_type.is_analog() {
                write_change(writer, *data_type, config.reportable_change);
            }
        }
    }
}

/// Configure Reporting Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureReportingResponse {
    /// Failed records as (status, attribute); empty when every record succeeded
    pub failures: Vec<(Status, AttributeId)>,
}

impl ResponsePayload for ConfigureReportingResponse {
    const COMMAND_ID: u8 = CONFIGURE_REPORTING_RESPONSE;
    const FRAME_TYPE: FrameType = FrameType::Global;

    fn decode(reader: &mut ZclReader) -> Result<Self> {
        // A lone status byte means all records succeeded
        if reader.remaining() == 1 {
            let status = Status::from_code(reader.read_u8()?);
            if !status.is_success() {
                return Err(DeviceError::malformed(format!(
                    "single-status configure reporting response with {}",
                    status
                )));
            }
            return Ok(Self {
                failures: Vec::new(),
            });
        }
        let mut failures = Vec::new();
        while !reader.is_exhausted() {
            let status = Status::from_code(reader.read_u8()?);
            let _direction = reader.read_u8()?;
            let attribute_id = reader.read_u16()?;
            if !status.is_success() {
                failures.push((status, attribute_id));
            }
        }
        Ok(Self { failures })
    }

    fn status(&self) -> Status {
        self.failures
            .first()
            .map(|(status, _)| *status)
            .unwrap_or(Status::Success)
    }
}

/// Inbound Report Attributes command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeReport {
    /// Reported values in frame order
    pub records: Vec<(AttributeId, AttributeValue)>,
}

impl ResponsePayload for AttributeReport {
    const COMMAND_ID: u8 = REPORT_ATTRIBUTES;
    const FRAME_TYPE: FrameType = FrameType::Global;

    fn decode(reader: &mut ZclReader) -> Result<Self> {
        let mut records = Vec::new();
        while !reader.is_exhausted() {
            let attribute_id = reader.read_u16()?;
            let data_type = DataType::from_code(reader.read_u8()?)?;
            records.push((attribute_id, data_type.read_value(reader)?));
        }
        Ok(Self { records })
    }
}
