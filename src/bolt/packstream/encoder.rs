//! PackStream encoder.

use bytes::{BufMut, BytesMut};

use super::marker::*;
use super::types::{PackStreamMap, PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Largest size a 32-bit size header may carry (sizes are signed on the wire).
const MAX_SIZE_32: usize = i32::MAX as usize;

/// Marker family used when writing a size header.
#[derive(Clone, Copy)]
struct SizedMarkers {
    name: &'static str,
    tiny: Option<u8>,
    size_8: u8,
    size_16: u8,
    size_32: u8,
}

const BYTES_MARKERS: SizedMarkers = SizedMarkers {
    name: "bytes",
    tiny: None,
    size_8: BYTES_8,
    size_16: BYTES_16,
    size_32: BYTES_32,
};

const STRING_MARKERS: SizedMarkers = SizedMarkers {
    name: "string",
    tiny: Some(TINY_STRING),
    size_8: STRING_8,
    size_16: STRING_16,
    size_32: STRING_32,
};

const LIST_MARKERS: SizedMarkers = SizedMarkers {
    name: "list",
    tiny: Some(TINY_LIST),
    size_8: LIST_8,
    size_16: LIST_16,
    size_32: LIST_32,
};

const MAP_MARKERS: SizedMarkers = SizedMarkers {
    name: "map",
    tiny: Some(TINY_MAP),
    size_8: MAP_8,
    size_16: MAP_16,
    size_32: MAP_32,
};

/// PackStream encoder that writes values to a byte buffer.
///
/// Always picks the most compact marker for integers and sizes.
pub struct PackStreamEncoder {
    buffer: BytesMut,
}

impl Default for PackStreamEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PackStreamEncoder {
    /// Create a new encoder with default buffer capacity.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new encoder with specified buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Consume the encoder and return the bytes.
    pub fn into_bytes(self) -> BytesMut {
        self.buffer
    }

    /// Get the bytes as a slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Encode a PackStreamValue.
    pub fn encode(&mut self, value: &PackStreamValue) -> Result<(), PackStreamError> {
        match value {
            PackStreamValue::Null => self.buffer.put_u8(NULL),
            PackStreamValue::Boolean(b) => self.encode_bool(*b),
            PackStreamValue::Integer(i) => self.encode_int(*i),
            PackStreamValue::Float(f) => self.encode_float(*f),
            PackStreamValue::Bytes(b) => self.encode_bytes(b)?,
            PackStreamValue::String(s) => self.encode_string(s)?,
            PackStreamValue::List(l) => self.encode_list(l)?,
            PackStreamValue::Map(m) => self.encode_map(m)?,
            PackStreamValue::Structure(s) => self.encode_structure(s)?,
        }
        Ok(())
    }

    /// Encode a boolean.
    pub fn encode_bool(&mut self, value: bool) {
        self.buffer.put_u8(if value { TRUE } else { FALSE });
    }

    /// Encode an integer using the smallest representation.
    pub fn encode_int(&mut self, value: i64) {
        if can_encode_tiny_int(value) {
            self.buffer.put_i8(value as i8);
        } else if let Ok(v) = i8::try_from(value) {
            self.buffer.put_u8(INT_8);
            self.buffer.put_i8(v);
        } else if let Ok(v) = i16::try_from(value) {
            self.buffer.put_u8(INT_16);
            self.buffer.put_i16(v);
        } else if let Ok(v) = i32::try_from(value) {
            self.buffer.put_u8(INT_32);
            self.buffer.put_i32(v);
        } else {
            self.buffer.put_u8(INT_64);
            self.buffer.put_i64(value);
        }
    }

    /// Encode a float (always 64-bit, NaN included).
    pub fn encode_float(&mut self, value: f64) {
        self.buffer.put_u8(FLOAT_64);
        self.buffer.put_f64(value);
    }

    /// Encode a byte array.
    pub fn encode_bytes(&mut self, value: &[u8]) -> Result<(), PackStreamError> {
        self.write_size_header(BYTES_MARKERS, value.len())?;
        self.buffer.put_slice(value);
        Ok(())
    }

    /// Encode a string.
    pub fn encode_string(&mut self, value: &str) -> Result<(), PackStreamError> {
        self.write_size_header(STRING_MARKERS, value.len())?;
        self.buffer.put_slice(value.as_bytes());
        Ok(())
    }

    /// Encode a list.
    pub fn encode_list(&mut self, values: &[PackStreamValue]) -> Result<(), PackStreamError> {
        self.write_size_header(LIST_MARKERS, values.len())?;
        for value in values {
            self.encode(value)?;
        }
        Ok(())
    }

    /// Encode a map, preserving key order.
    pub fn encode_map(&mut self, map: &PackStreamMap) -> Result<(), PackStreamError> {
        self.write_size_header(MAP_MARKERS, map.len())?;
        for (key, value) in map {
            self.encode_string(key)?;
            self.encode(value)?;
        }
        Ok(())
    }

    /// Encode a structure.
    pub fn encode_structure(&mut self, s: &PackStreamStructure) -> Result<(), PackStreamError> {
        let len = s.fields.len();
        if len <= TINY_MAX_SIZE {
            self.buffer.put_u8(TINY_STRUCT | len as u8);
        } else if len <= u8::MAX as usize {
            self.buffer.put_u8(STRUCT_8);
            self.buffer.put_u8(len as u8);
        } else if len <= u16::MAX as usize {
            self.buffer.put_u8(STRUCT_16);
            self.buffer.put_u16(len as u16);
        } else {
            return Err(PackStreamError::ValueTooLarge("structure", len));
        }
        self.buffer.put_u8(s.tag);
        for field in &s.fields {
            self.encode(field)?;
        }
        Ok(())
    }

    /// Open a list stream. Items follow; close it with [`end_stream`](Self::end_stream).
    pub fn begin_list_stream(&mut self) {
        self.buffer.put_u8(LIST_STREAM);
    }

    /// Open a map stream. Key/value pairs follow; close it with [`end_stream`](Self::end_stream).
    pub fn begin_map_stream(&mut self) {
        self.buffer.put_u8(MAP_STREAM);
    }

    /// Close a list or map stream.
    pub fn end_stream(&mut self) {
        self.buffer.put_u8(END_OF_STREAM);
    }

    fn write_size_header(&mut self, markers: SizedMarkers, len: usize) -> Result<(), PackStreamError> {
        match markers.tiny {
            Some(tiny) if len <= TINY_MAX_SIZE => {
                self.buffer.put_u8(tiny | len as u8);
            }
            _ if len <= u8::MAX as usize => {
                self.buffer.put_u8(markers.size_8);
                self.buffer.put_u8(len as u8);
            }
            _ if len <= u16::MAX as usize => {
                self.buffer.put_u8(markers.size_16);
                self.buffer.put_u16(len as u16);
            }
            _ if len <= MAX_SIZE_32 => {
                self.buffer.put_u8(markers.size_32);
                self.buffer.put_u32(len as u32);
            }
            _ => return Err(PackStreamError::ValueTooLarge(markers.name, len)),
        }
        Ok(())
    }
}

/// Encode a single value to bytes.
pub fn encode(value: &PackStreamValue) -> Result<BytesMut, PackStreamError> {
    let mut encoder = PackStreamEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of(value: impl Into<PackStreamValue>) -> Vec<u8> {
        encode(&value.into()).unwrap().to_vec()
    }

    #[test]
    fn test_encode_tiny_int_bounds() {
        assert_eq!(bytes_of(0i64), vec![0x00]);
        assert_eq!(bytes_of(127i64), vec![0x7F]);
        assert_eq!(bytes_of(-16i64), vec![0xF0]);
        assert_eq!(bytes_of(-1i64), vec![0xFF]);
    }

    #[test]
    fn test_encode_int_tiers() {
        assert_eq!(bytes_of(-17i64), vec![INT_8, 0xEF]);
        assert_eq!(bytes_of(-128i64), vec![INT_8, 0x80]);
        assert_eq!(bytes_of(128i64), vec![INT_16, 0x00, 0x80]);
        assert_eq!(bytes_of(1000i64), vec![INT_16, 0x03, 0xE8]);
        assert_eq!(bytes_of(32768i64), vec![INT_32, 0x00, 0x00, 0x80, 0x00]);
        assert_eq!(
            bytes_of(2_147_483_648i64),
            vec![INT_64, 0x00, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_encode_float() {
        assert_eq!(
            bytes_of(1.1f64),
            vec![FLOAT_64, 0x3F, 0xF1, 0x99, 0x99, 0x99, 0x99, 0x99, 0x9A]
        );
    }

    #[test]
    fn test_encode_string_sizes() {
        assert_eq!(bytes_of(""), vec![0x80]);
        assert_eq!(bytes_of("A"), vec![0x81, 0x41]);
        let s16 = "a".repeat(16);
        assert_eq!(&bytes_of(s16.as_str())[..2], &[STRING_8, 16]);
        let s256 = "a".repeat(256);
        assert_eq!(&bytes_of(s256.as_str())[..3], &[STRING_16, 0x01, 0x00]);
    }

    #[test]
    fn test_encode_bytes_has_no_tiny_form() {
        assert_eq!(bytes_of(vec![1u8, 2, 3]), vec![BYTES_8, 3, 1, 2, 3]);
    }

    #[test]
    fn test_encode_list_boundaries() {
        let list15 = PackStreamValue::List(vec![PackStreamValue::Null; 15]);
        assert_eq!(encode(&list15).unwrap()[0], 0x9F);
        let list16 = PackStreamValue::List(vec![PackStreamValue::Null; 16]);
        assert_eq!(&encode(&list16).unwrap()[..2], &[LIST_8, 16]);
        let list256 = PackStreamValue::List(vec![PackStreamValue::Null; 256]);
        assert_eq!(&encode(&list256).unwrap()[..3], &[LIST_16, 0x01, 0x00]);
    }

    #[test]
    fn test_encode_map_in_insertion_order() {
        let mut map = PackStreamMap::new();
        map.insert("b".into(), 1i64.into());
        map.insert("a".into(), 2i64.into());
        assert_eq!(
            bytes_of(map),
            vec![0xA2, 0x81, b'b', 0x01, 0x81, b'a', 0x02]
        );
    }

    #[test]
    fn test_encode_structure() {
        let s = PackStreamStructure::new(0x70, vec![PackStreamValue::Map(PackStreamMap::new())]);
        assert_eq!(bytes_of(s), vec![0xB1, 0x70, 0xA0]);
    }

    #[test]
    fn test_structure_field_limit() {
        let fields = vec![PackStreamValue::Null; 65_535];
        let encoded = encode(&PackStreamStructure::new(0x01, fields).into()).unwrap();
        assert_eq!(&encoded[..4], &[STRUCT_16, 0xFF, 0xFF, 0x01]);

        let fields = vec![PackStreamValue::Null; 65_536];
        assert_eq!(
            encode(&PackStreamStructure::new(0x01, fields).into()),
            Err(PackStreamError::ValueTooLarge("structure", 65_536))
        );
    }

    #[test]
    fn test_encode_stream_markers() {
        let mut encoder = PackStreamEncoder::new();
        encoder.begin_list_stream();
        encoder.encode_int(1);
        encoder.end_stream();
        assert_eq!(encoder.as_bytes(), &[LIST_STREAM, 0x01, END_OF_STREAM]);
    }
}
