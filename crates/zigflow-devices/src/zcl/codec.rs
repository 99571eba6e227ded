/*!
 * Fixed-width binary serializer and deserializer for ZCL payloads.
 *
 * ZigBee puts every multi-byte field on the air least significant byte
 * first. Field widths are whatever the command layout declares; the reader
 * fails with [`DeviceError::MalformedResponse`] instead of panicking when
 * the payload is shorter than the layout.
 */
use bytes::{Buf, BufMut, Bytes, BytesMut};

use zigflow_core::types::ExtendedAddress;

use crate::device::{DeviceError, Result};

/// Positional payload writer
#[derive(Debug, Default)]
pub struct ZclWriter {
    buf: BytesMut,
}

impl ZclWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Append an 8-bit field
    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    /// Append a signed 8-bit field
    pub fn write_i8(&mut self, value: i8) -> &mut Self {
        self.buf.put_i8(value);
        self
    }

    /// Append a 16-bit field
    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    /// Append a signed 16-bit field
    pub fn write_i16(&mut self, value: i16) -> &mut Self {
        self.buf.put_i16_le(value);
        self
    }

    /// Append a 24-bit field (upper byte of `value` is ignored)
    pub fn write_u24(&mut self, value: u32) -> &mut Self {
        self.buf.put_uint_le(u64::from(value & 0x00FF_FFFF), 3);
        self
    }

    /// Append a 32-bit field
    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    /// Append a signed 32-bit field
    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32_le(value);
        self
    }

    /// Append a 64-bit field
    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64_le(value);
        self
    }

    /// Append an IEEE address
    pub fn write_ieee(&mut self, address: ExtendedAddress) -> &mut Self {
        self.write_u64(address.raw())
    }

    /// Append a length-prefixed character string
    ///
    /// Strings longer than 254 bytes are truncated; 0xFF is the invalid-string marker.
    pub fn write_string(&mut self, value: &str) -> &mut Self {
        let bytes = value.as_bytes();
        let len = bytes.len().min(0xFE);
        self.buf.put_u8(len as u8);
        self.buf.put_slice(&bytes[..len]);
        self
    }

    /// Append raw bytes
    pub fn write_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_slice(value);
        self
    }

    /// Number of bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish and take the payload
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Positional payload reader
#[derive(Debug, Clone)]
pub struct ZclReader {
    buf: Bytes,
    consumed: usize,
}

impl ZclReader {
    /// Read from the start of `payload`
    pub fn new(payload: Bytes) -> Self {
        Self {
            buf: payload,
            consumed: 0,
        }
    }

    fn ensure(&self, width: usize, field: &str) -> Result<()> {
        if self.buf.remaining() < width {
            return Err(DeviceError::malformed(format!(
                "payload too short for {} at offset {}: need {} byte(s), {} left",
                field,
                self.consumed,
                width,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn advance(&mut self, width: usize) {
        self.consumed += width;
    }

    /// Read an 8-bit field
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1, "u8")?;
        self.advance(1);
        Ok(self.buf.get_u8())
    }

    /// Read a signed 8-bit field
    pub fn read_i8(&mut self) -> Result<i8> {
        self.ensure(1, "i8")?;
        self.advance(1);
        Ok(self.buf.get_i8())
    }

    /// Read a 16-bit field
    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2, "u16")?;
        self.advance(2);
        Ok(self.buf.get_u16_le())
    }

    /// Read a signed 16-bit field
    pub fn read_i16(&mut self) -> Result<i16> {
        self.ensure(2, "i16")?;
        self.advance(2);
        Ok(self.buf.get_i16_le())
    }

    /// Read a 24-bit field
    pub fn read_u24(&mut self) -> Result<u32> {
        self.ensure(3, "u24")?;
        self.advance(3);
        Ok(self.buf.get_uint_le(3) as u32)
    }

    /// Read a 32-bit field
    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4, "u32")?;
        self.advance(4);
        Ok(self.buf.get_u32_le())
    }

    /// Read a signed 32-bit field
    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4, "i32")?;
        self.advance(4);
        Ok(self.buf.get_i32_le())
    }

    /// Read a 64-bit field
    pub fn read_u64(&mut self) -> Result<u64> {
        self.ensure(8, "u64")?;
        self.advance(8);
        Ok(self.buf.get_u64_le())
    }

    /// Read an IEEE address
    pub fn read_ieee(&mut self) -> Result<ExtendedAddress> {
        self.read_u64().map(ExtendedAddress)
    }

    /// Read a length-prefixed character string
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u8()?;
        if len == 0xFF {
            return Ok(String::new());
        }
        let raw = self.read_bytes(len as usize)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| DeviceError::malformed(format!("invalid character string: {}", e)))
    }

    /// Read `len` raw bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len, "byte run")?;
        self.advance(len);
        Ok(self.buf.split_to(len))
    }

    /// Everything not read yet
    pub fn rest(&mut self) -> Bytes {
        let len = self.buf.remaining();
        self.advance(len);
        self.buf.split_to(len)
    }

    /// Number of unread bytes
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Whether every byte has been read
    pub fn is_exhausted(&self) -> bool {
        !self.buf.has_remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_is_little_endian() {
        let mut writer = ZclWriter::new();
        writer
            .write_u8(0xAB)
            .write_u16(0x1234)
            .write_u24(0x00ABCDEF)
            .write_u32(0xDEADBEEF);
        assert_eq!(
            writer.finish().as_ref(),
            &[0xAB, 0x34, 0x12, 0xEF, 0xCD, 0xAB, 0xEF, 0xBE, 0xAD, 0xDE]
        );
    }

    #[test]
    fn test_reader_reads_declared_widths() {
        let mut reader = ZclReader::new(Bytes::from_static(&[
            0x00, 0x34, 0x12, 0x07, 0x03, b'a', b'b', b'c',
        ]));
        assert_eq!(reader.read_u8().unwrap(), 0x00);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u8().unwrap(), 0x07);
        assert_eq!(reader.read_string().unwrap(), "abc");
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_short_payload_is_malformed() {
        let mut reader = ZclReader::new(Bytes::from_static(&[0x01]));
        let err = reader.read_u16().unwrap_err();
        assert!(matches!(err, DeviceError::MalformedResponse(_)));
        // The failed read did not consume anything
        assert_eq!(reader.read_u8().unwrap(), 0x01);
    }

    #[test]
    fn test_ieee_address() {
        let addr = ExtendedAddress(0x0011_2233_4455_6677);
        let mut writer = ZclWriter::new();
        writer.write_ieee(addr);
        let payload = writer.finish();
        assert_eq!(payload[0], 0x77);
        assert_eq!(ZclReader::new(payload).read_ieee().unwrap(), addr);
    }

    #[test]
    fn test_invalid_string_marker_reads_empty() {
        let mut reader = ZclReader::new(Bytes::from_static(&[0xFF, 0x05]));
        assert_eq!(reader.read_string().unwrap(), "");
        assert_eq!(reader.read_u8().unwrap(), 0x05);
    }
}
