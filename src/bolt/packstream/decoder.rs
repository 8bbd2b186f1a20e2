//! PackStream decoder.

use bytes::Buf;

use super::marker::*;
use super::types::{PackStreamMap, PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Deepest container nesting the decoder accepts.
pub const MAX_NESTING_DEPTH: usize = 256;

/// One decoded item: either a value or the end-of-stream terminator.
enum Item {
    Value(PackStreamValue),
    EndOfStream,
}

/// PackStream decoder that reads values from a byte buffer.
///
/// The cursor is local to the decoder; every `decode` call consumes exactly
/// one value and advances past it.
pub struct PackStreamDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> PackStreamDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    /// Get the current position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Get remaining bytes count.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Check if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Decode the next value.
    ///
    /// An end-of-stream marker here is an error: it is only valid inside a
    /// list or map stream.
    pub fn decode(&mut self) -> Result<PackStreamValue, PackStreamError> {
        match self.decode_item()? {
            Item::Value(value) => Ok(value),
            Item::EndOfStream => Err(PackStreamError::UnexpectedEndOfStream),
        }
    }

    fn decode_item(&mut self) -> Result<Item, PackStreamError> {
        let marker = self.read_u8()?;

        if is_tiny_int(marker) {
            return Ok(Item::Value(PackStreamValue::Integer(marker as i8 as i64)));
        }

        let value = match high_nibble(marker) {
            TINY_STRING => self.read_string(tiny_size(marker))?,
            TINY_LIST => self.nested(|d| d.read_list(tiny_size(marker)))?,
            TINY_MAP => self.nested(|d| d.read_map(tiny_size(marker)))?,
            TINY_STRUCT => self.nested(|d| d.read_struct(tiny_size(marker)))?,
            _ => match marker {
                NULL => PackStreamValue::Null,
                TRUE => PackStreamValue::Boolean(true),
                FALSE => PackStreamValue::Boolean(false),
                FLOAT_64 => PackStreamValue::Float(self.read_f64()?),

                INT_8 => PackStreamValue::Integer(self.read_u8()? as i8 as i64),
                INT_16 => PackStreamValue::Integer(self.read_i16()? as i64),
                INT_32 => PackStreamValue::Integer(self.read_i32()? as i64),
                INT_64 => PackStreamValue::Integer(self.read_i64()?),

                BYTES_8 => {
                    let len = self.read_u8()? as usize;
                    PackStreamValue::Bytes(self.read_bytes(len)?.to_vec())
                }
                BYTES_16 => {
                    let len = self.read_u16()? as usize;
                    PackStreamValue::Bytes(self.read_bytes(len)?.to_vec())
                }
                BYTES_32 => {
                    let len = self.read_size_32("bytes")?;
                    PackStreamValue::Bytes(self.read_bytes(len)?.to_vec())
                }

                STRING_8 => {
                    let len = self.read_u8()? as usize;
                    self.read_string(len)?
                }
                STRING_16 => {
                    let len = self.read_u16()? as usize;
                    self.read_string(len)?
                }
                STRING_32 => {
                    let len = self.read_size_32("string")?;
                    self.read_string(len)?
                }

                LIST_8 => {
                    let len = self.read_u8()? as usize;
                    self.nested(|d| d.read_list(len))?
                }
                LIST_16 => {
                    let len = self.read_u16()? as usize;
                    self.nested(|d| d.read_list(len))?
                }
                LIST_32 => {
                    let len = self.read_size_32("list")?;
                    self.nested(|d| d.read_list(len))?
                }
                LIST_STREAM => self.nested(|d| d.read_list_stream())?,

                MAP_8 => {
                    let len = self.read_u8()? as usize;
                    self.nested(|d| d.read_map(len))?
                }
                MAP_16 => {
                    let len = self.read_u16()? as usize;
                    self.nested(|d| d.read_map(len))?
                }
                MAP_32 => {
                    let len = self.read_size_32("map")?;
                    self.nested(|d| d.read_map(len))?
                }
                MAP_STREAM => self.nested(|d| d.read_map_stream())?,

                STRUCT_8 => {
                    let len = self.read_u8()? as usize;
                    self.nested(|d| d.read_struct(len))?
                }
                STRUCT_16 => {
                    let len = self.read_u16()? as usize;
                    self.nested(|d| d.read_struct(len))?
                }

                END_OF_STREAM => return Ok(Item::EndOfStream),

                _ => return Err(PackStreamError::UnknownMarker(marker)),
            },
        };

        Ok(Item::Value(value))
    }

    fn nested<F>(&mut self, read: F) -> Result<PackStreamValue, PackStreamError>
    where
        F: FnOnce(&mut Self) -> Result<PackStreamValue, PackStreamError>,
    {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(PackStreamError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        self.depth += 1;
        let value = read(self);
        self.depth -= 1;
        value
    }

    fn read_string(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let bytes = self.read_bytes(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|e| PackStreamError::InvalidUtf8(e.to_string()))?;
        Ok(PackStreamValue::String(s.to_string()))
    }

    fn read_list(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(self.decode()?);
        }
        Ok(PackStreamValue::List(items))
    }

    fn read_list_stream(&mut self) -> Result<PackStreamValue, PackStreamError> {
        let mut items = Vec::new();
        loop {
            match self.decode_item()? {
                Item::Value(value) => items.push(value),
                Item::EndOfStream => return Ok(PackStreamValue::List(items)),
            }
        }
    }

    fn read_map(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let mut map = PackStreamMap::with_capacity(len.min(1024));
        for _ in 0..len {
            let key = self.read_map_key()?;
            let value = self.decode()?;
            map.insert(key, value);
        }
        Ok(PackStreamValue::Map(map))
    }

    fn read_map_stream(&mut self) -> Result<PackStreamValue, PackStreamError> {
        let mut map = PackStreamMap::new();
        loop {
            let key = match self.decode_item()? {
                Item::Value(PackStreamValue::String(key)) => key,
                Item::Value(_) => return Err(PackStreamError::InvalidMapKey),
                Item::EndOfStream => return Ok(PackStreamValue::Map(map)),
            };
            let value = self.decode()?;
            map.insert(key, value);
        }
    }

    fn read_map_key(&mut self) -> Result<String, PackStreamError> {
        match self.decode()? {
            PackStreamValue::String(s) => Ok(s),
            _ => Err(PackStreamError::InvalidMapKey),
        }
    }

    fn read_struct(&mut self, field_count: usize) -> Result<PackStreamValue, PackStreamError> {
        let tag = self.read_u8()?;
        let mut fields = Vec::with_capacity(field_count.min(64));
        for _ in 0..field_count {
            fields.push(self.decode()?);
        }
        Ok(PackStreamValue::Structure(PackStreamStructure::new(tag, fields)))
    }

    // Low-level read methods

    fn ensure(&self, n: usize) -> Result<(), PackStreamError> {
        if self.remaining() < n {
            return Err(PackStreamError::UnexpectedEof);
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, PackStreamError> {
        self.ensure(1)?;
        let value = self.data[self.pos];
        self.pos += 1;
        Ok(value)
    }

    fn read_u16(&mut self) -> Result<u16, PackStreamError> {
        self.ensure(2)?;
        let value = (&self.data[self.pos..]).get_u16();
        self.pos += 2;
        Ok(value)
    }

    fn read_i16(&mut self) -> Result<i16, PackStreamError> {
        self.ensure(2)?;
        let value = (&self.data[self.pos..]).get_i16();
        self.pos += 2;
        Ok(value)
    }

    fn read_i32(&mut self) -> Result<i32, PackStreamError> {
        self.ensure(4)?;
        let value = (&self.data[self.pos..]).get_i32();
        self.pos += 4;
        Ok(value)
    }

    fn read_i64(&mut self) -> Result<i64, PackStreamError> {
        self.ensure(8)?;
        let value = (&self.data[self.pos..]).get_i64();
        self.pos += 8;
        Ok(value)
    }

    fn read_f64(&mut self) -> Result<f64, PackStreamError> {
        self.ensure(8)?;
        let value = (&self.data[self.pos..]).get_f64();
        self.pos += 8;
        Ok(value)
    }

    /// 32-bit sizes are signed on the wire.
    fn read_size_32(&mut self, what: &'static str) -> Result<usize, PackStreamError> {
        let size = self.read_i32()?;
        usize::try_from(size).map_err(|_| PackStreamError::ValueTooLarge(what, size as u32 as usize))
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], PackStreamError> {
        self.ensure(len)?;
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }
}

/// Convenience function to decode a single value from bytes.
pub fn decode(data: &[u8]) -> Result<PackStreamValue, PackStreamError> {
    let mut decoder = PackStreamDecoder::new(data);
    decoder.decode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_scalars() {
        assert!(decode(&[0xC0]).unwrap().is_null());
        assert_eq!(decode(&[0xC3]).unwrap(), PackStreamValue::Boolean(true));
        assert_eq!(decode(&[0xC2]).unwrap(), PackStreamValue::Boolean(false));
        assert_eq!(decode(&[0xF0]).unwrap(), PackStreamValue::Integer(-16));
        assert_eq!(decode(&[0xC8, 0x80]).unwrap(), PackStreamValue::Integer(-128));
        assert_eq!(decode(&[0xC9, 0x03, 0xE8]).unwrap(), PackStreamValue::Integer(1000));
    }

    #[test]
    fn test_decode_advances_cursor() {
        let data = [0x81, b'a', 0x01, 0xC0];
        let mut decoder = PackStreamDecoder::new(&data);
        assert_eq!(decoder.decode().unwrap(), PackStreamValue::String("a".into()));
        assert_eq!(decoder.position(), 2);
        assert_eq!(decoder.decode().unwrap(), PackStreamValue::Integer(1));
        assert_eq!(decoder.decode().unwrap(), PackStreamValue::Null);
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_decode_list_stream() {
        let data = [LIST_STREAM, 0x01, 0x81, b'x', END_OF_STREAM];
        assert_eq!(
            decode(&data).unwrap(),
            PackStreamValue::List(vec![
                PackStreamValue::Integer(1),
                PackStreamValue::String("x".into()),
            ])
        );
    }

    #[test]
    fn test_decode_map_stream_keeps_order() {
        let data = [MAP_STREAM, 0x81, b'k', 0x02, 0x81, b'a', 0xC0, END_OF_STREAM];
        let value = decode(&data).unwrap();
        let map = value.as_map().unwrap();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["k", "a"]);
        assert_eq!(map["k"], PackStreamValue::Integer(2));
    }

    #[test]
    fn test_decode_nested_streams() {
        let data = [LIST_STREAM, LIST_STREAM, 0x01, END_OF_STREAM, 0x02, END_OF_STREAM];
        assert_eq!(
            decode(&data).unwrap(),
            PackStreamValue::List(vec![
                PackStreamValue::List(vec![PackStreamValue::Integer(1)]),
                PackStreamValue::Integer(2),
            ])
        );
    }

    #[test]
    fn test_end_of_stream_outside_stream() {
        assert!(matches!(
            decode(&[END_OF_STREAM]),
            Err(PackStreamError::UnexpectedEndOfStream)
        ));
        // Inside a sized list the terminator is still out of place.
        assert!(matches!(
            decode(&[0x92, 0x01, END_OF_STREAM]),
            Err(PackStreamError::UnexpectedEndOfStream)
        ));
    }

    #[test]
    fn test_unknown_marker() {
        for marker in [0xC4, 0xC7, 0xCF, 0xD3, 0xDE, 0xE0, 0xEF] {
            assert!(
                matches!(decode(&[marker]), Err(PackStreamError::UnknownMarker(m)) if m == marker),
                "marker 0x{:02X}",
                marker
            );
        }
    }

    #[test]
    fn test_truncated_input() {
        assert!(matches!(decode(&[0xC9, 0x01]), Err(PackStreamError::UnexpectedEof)));
        assert!(matches!(decode(&[0x85, b'a', b'b']), Err(PackStreamError::UnexpectedEof)));
        assert!(matches!(decode(&[0x92, 0x01]), Err(PackStreamError::UnexpectedEof)));
        assert!(matches!(decode(&[LIST_STREAM, 0x01]), Err(PackStreamError::UnexpectedEof)));
        assert!(matches!(decode(&[]), Err(PackStreamError::UnexpectedEof)));
    }

    #[test]
    fn test_non_string_map_key() {
        assert!(matches!(decode(&[0xA1, 0x01, 0x02]), Err(PackStreamError::InvalidMapKey)));
    }

    #[test]
    fn test_invalid_utf8() {
        assert!(matches!(decode(&[0x82, 0xC3, 0x28]), Err(PackStreamError::InvalidUtf8(_))));
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let mut data = vec![0x91; 1_000_000];
        data.push(0xC0);
        assert_eq!(
            decode(&data),
            Err(PackStreamError::NestingTooDeep(MAX_NESTING_DEPTH))
        );

        let mut streams = vec![LIST_STREAM; MAX_NESTING_DEPTH + 1];
        streams.push(END_OF_STREAM);
        assert_eq!(
            decode(&streams),
            Err(PackStreamError::NestingTooDeep(MAX_NESTING_DEPTH))
        );

        // Exactly at the limit is still fine.
        let mut data = vec![0x91; MAX_NESTING_DEPTH];
        data.push(0xC0);
        let mut value = decode(&data).unwrap();
        for _ in 0..MAX_NESTING_DEPTH {
            let PackStreamValue::List(mut items) = value else {
                panic!("expected a list");
            };
            value = items.remove(0);
        }
        assert!(value.is_null());
    }

    #[test]
    fn test_negative_32_bit_size() {
        for marker in [BYTES_32, STRING_32, LIST_32, MAP_32] {
            let data = [marker, 0x80, 0x00, 0x00, 0x00];
            assert!(
                matches!(decode(&data), Err(PackStreamError::ValueTooLarge(_, _))),
                "marker 0x{:02X}",
                marker
            );
        }
    }

    #[test]
    fn test_decode_structure() {
        let data = [0xB3, 0x4E, 0x01, 0x90, 0xA0];
        let value = decode(&data).unwrap();
        let s = value.as_structure().unwrap();
        assert_eq!(s.tag, 0x4E);
        assert_eq!(s.fields.len(), 3);
    }
}
