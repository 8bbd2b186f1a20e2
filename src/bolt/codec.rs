//! Bolt message framing.
//!
//! Every message is split into chunks, each preceded by a 2-byte big-endian
//! length, and terminated by a zero-length chunk (`00 00`). A zero-length
//! chunk with no preceding data is a NOOP (keep-alive) and is skipped.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::message::{BoltRequest, BoltResponse};
use super::packstream::{decode, PackStreamEncoder, PackStreamValue};
use super::BoltError;

/// Maximum chunk size (16KB)
pub const MAX_CHUNK_SIZE: usize = 16384;

/// Default upper bound for one reassembled message (16MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// End of message marker (0x00 0x00)
pub const END_MARKER: [u8; 2] = [0x00, 0x00];

// ============================================================================
// Outgoing chunks
// ============================================================================

/// Accreting chunk writer.
///
/// Bytes written between two [`end_message`](Self::end_message) calls form
/// one message. Several messages may accumulate before the buffer is taken
/// and flushed in a single write.
#[derive(Debug)]
pub struct ChunkWriter {
    buffer: BytesMut,
    max_chunk_size: usize,
    /// Offset of the open chunk's header, if any.
    open_chunk: Option<usize>,
}

impl Default for ChunkWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkWriter {
    /// Create a writer using [`MAX_CHUNK_SIZE`].
    pub fn new() -> Self {
        Self::with_max_chunk_size(MAX_CHUNK_SIZE)
    }

    /// Create a writer with a custom chunk size (clamped to `1..=65535`).
    pub fn with_max_chunk_size(max_chunk_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            max_chunk_size: max_chunk_size.clamp(1, u16::MAX as usize),
            open_chunk: None,
        }
    }

    /// Append message bytes to the open chunk, opening new chunks as needed.
    pub fn write(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let header = match self.open_chunk {
                Some(header) => header,
                None => {
                    let header = self.buffer.len();
                    self.buffer.put_u16(0);
                    self.open_chunk = Some(header);
                    header
                }
            };
            let used = self.buffer.len() - header - 2;
            let room = self.max_chunk_size - used;
            let n = room.min(data.len());
            self.buffer.put_slice(&data[..n]);
            data = &data[n..];
            self.patch_header(header);
            if used + n == self.max_chunk_size {
                self.open_chunk = None;
            }
        }
    }

    /// Close the current message.
    pub fn end_message(&mut self) {
        self.open_chunk = None;
        self.buffer.put_slice(&END_MARKER);
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Take all buffered bytes, leaving the writer empty.
    pub fn take(&mut self) -> Bytes {
        self.open_chunk = None;
        self.buffer.split().freeze()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.open_chunk = None;
        self.buffer.clear();
    }

    fn patch_header(&mut self, header: usize) {
        let size = (self.buffer.len() - header - 2) as u16;
        self.buffer[header..header + 2].copy_from_slice(&size.to_be_bytes());
    }
}

/// Frame one payload into chunks of at most `max_chunk_size` bytes.
pub fn chunk(payload: &[u8], max_chunk_size: usize) -> Bytes {
    let mut writer = ChunkWriter::with_max_chunk_size(max_chunk_size);
    writer.write(payload);
    writer.end_message();
    writer.take()
}

/// Reassemble the payload of one framed message.
///
/// Leading NOOP chunks are skipped. Returns `None` if the message is not
/// complete.
pub fn unchunk(mut framed: &[u8]) -> Option<Vec<u8>> {
    let mut payload = Vec::with_capacity(framed.len());
    let mut seen_data = false;
    loop {
        if framed.len() < 2 {
            return None;
        }
        let size = framed.get_u16() as usize;
        if size == 0 {
            if seen_data {
                return Some(payload);
            }
            continue;
        }
        if framed.len() < size {
            return None;
        }
        payload.extend_from_slice(&framed[..size]);
        framed.advance(size);
        seen_data = true;
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Bolt message codec for framing.
///
/// Decodes one PackStream value per message and encodes values into chunks.
#[derive(Debug)]
pub struct BoltCodec {
    /// Maximum message size
    max_message_size: usize,
    /// Buffer for accumulating chunks
    message_buffer: BytesMut,
    /// Chunk size used when encoding
    max_chunk_size: usize,
}

impl BoltCodec {
    /// Create a new codec with default settings.
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a codec with custom max message size.
    pub fn with_max_size(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            message_buffer: BytesMut::with_capacity(4096),
            max_chunk_size: MAX_CHUNK_SIZE,
        }
    }

    /// Use a custom chunk size when encoding.
    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size.clamp(1, u16::MAX as usize);
        self
    }

    /// Whether part of a message has been received.
    pub fn in_message(&self) -> bool {
        !self.message_buffer.is_empty()
    }

    fn decode_payload(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, BoltError> {
        loop {
            // Need at least 2 bytes for chunk header
            if src.len() < 2 {
                return Ok(None);
            }

            let chunk_size = u16::from_be_bytes([src[0], src[1]]) as usize;

            if chunk_size == 0 {
                src.advance(2);
                if self.message_buffer.is_empty() {
                    // NOOP chunk
                    continue;
                }
                return Ok(Some(self.message_buffer.split()));
            }

            if src.len() < 2 + chunk_size {
                return Ok(None);
            }

            if self.message_buffer.len() + chunk_size > self.max_message_size {
                return Err(BoltError::MessageTooLarge {
                    size: self.message_buffer.len() + chunk_size,
                    max: self.max_message_size,
                });
            }

            src.advance(2);
            self.message_buffer.extend_from_slice(&src[..chunk_size]);
            src.advance(chunk_size);
        }
    }
}

impl Default for BoltCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for BoltCodec {
    type Item = PackStreamValue;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode_payload(src)? {
            Some(payload) => Ok(Some(decode(&payload)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<PackStreamValue> for BoltCodec {
    type Error = BoltError;

    fn encode(&mut self, item: PackStreamValue, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut encoder = PackStreamEncoder::new();
        encoder.encode(&item)?;
        dst.extend_from_slice(&chunk(encoder.as_bytes(), self.max_chunk_size));
        Ok(())
    }
}

/// Client-side codec: decodes server responses, encodes requests.
#[derive(Debug, Default)]
pub struct BoltResponseCodec {
    inner: BoltCodec,
}

impl BoltResponseCodec {
    /// Create a new response codec.
    pub fn new() -> Self {
        Self {
            inner: BoltCodec::new(),
        }
    }

    /// Create a response codec with a custom max message size.
    pub fn with_max_size(max_message_size: usize) -> Self {
        Self {
            inner: BoltCodec::with_max_size(max_message_size),
        }
    }
}

impl Decoder for BoltResponseCodec {
    type Item = BoltResponse;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(PackStreamValue::Structure(structure)) => {
                Ok(Some(BoltResponse::from_structure(structure)?))
            }
            Some(other) => Err(BoltError::Protocol(format!(
                "Expected message structure, received {}",
                other.type_name()
            ))),
            None => Ok(None),
        }
    }
}

impl Encoder<&BoltRequest> for BoltResponseCodec {
    type Error = BoltError;

    fn encode(&mut self, item: &BoltRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let value = PackStreamValue::Structure(item.to_structure());
        self.inner.encode(value, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::message::tag;
    use crate::bolt::packstream::{encode, PackStreamMap, PackStreamStructure};

    #[test]
    fn test_chunk_unchunk_sizes() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        for size in [1usize, 2, 7, 100, 999, 1000, 1001, MAX_CHUNK_SIZE] {
            let framed = chunk(&payload, size);
            assert_eq!(unchunk(&framed).unwrap(), payload, "chunk size {}", size);
        }
    }

    #[test]
    fn test_chunk_exact_multiple() {
        let payload = [1u8, 2, 3, 4];
        let framed = chunk(&payload, 2);
        assert_eq!(&framed[..], &[0, 2, 1, 2, 0, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn test_chunk_empty_payload_is_terminator_only() {
        let framed = chunk(&[], 16);
        assert_eq!(&framed[..], &END_MARKER);
    }

    #[test]
    fn test_unchunk_skips_leading_noop() {
        let framed = [0, 0, 0, 0, 0, 1, 0xC0, 0, 0];
        assert_eq!(unchunk(&framed).unwrap(), vec![0xC0]);
    }

    #[test]
    fn test_unchunk_incomplete() {
        assert!(unchunk(&[0, 3, 1, 2]).is_none());
        assert!(unchunk(&[0, 1, 1]).is_none());
    }

    #[test]
    fn test_writer_accretes_messages() {
        let mut writer = ChunkWriter::with_max_chunk_size(4);
        writer.write(&[1, 2]);
        writer.write(&[3]);
        writer.end_message();
        writer.write(&[4, 5, 6, 7, 8]);
        writer.end_message();
        assert_eq!(
            &writer.take()[..],
            &[0, 3, 1, 2, 3, 0, 0, 0, 4, 4, 5, 6, 7, 0, 1, 8, 0, 0]
        );
        assert!(writer.is_empty());
    }

    #[test]
    fn test_encode_decode_structure() {
        let mut codec = BoltCodec::new();
        let mut buf = BytesMut::new();

        let structure = PackStreamStructure::new(0x70, vec![PackStreamValue::Map(PackStreamMap::new())]);
        codec.encode(PackStreamValue::Structure(structure), &mut buf).unwrap();
        assert_eq!(&buf[..], &[0x00, 0x03, 0xB1, 0x70, 0xA0, 0x00, 0x00]);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert!(decoded.as_structure().is_some());
    }

    #[test]
    fn test_chunked_large_message() {
        let mut codec = BoltCodec::new();
        let mut buf = BytesMut::new();

        let large_data = "x".repeat(MAX_CHUNK_SIZE * 2 + 100);
        codec
            .encode(PackStreamValue::String(large_data.clone()), &mut buf)
            .unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.as_str().unwrap(), large_data);
    }

    #[test]
    fn test_partial_chunk() {
        let mut codec = BoltCodec::new().with_max_chunk_size(1);
        let mut full = BytesMut::new();
        codec.encode(PackStreamValue::Integer(1000), &mut full).unwrap();

        // Feed one byte at a time, as a slow socket would.
        let mut buf = BytesMut::new();
        let mut decoded = None;
        for byte in full.iter() {
            buf.put_u8(*byte);
            if let Some(value) = codec.decode(&mut buf).unwrap() {
                decoded = Some(value);
            }
        }
        assert_eq!(decoded, Some(PackStreamValue::Integer(1000)));
        assert!(!codec.in_message());
    }

    #[test]
    fn test_message_too_large() {
        let mut codec = BoltCodec::with_max_size(100);
        let mut buf = BytesMut::new();

        buf.put_u16(200);
        buf.extend_from_slice(&[0u8; 200]);

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(BoltError::MessageTooLarge { .. })));
    }

    #[test]
    fn test_empty_message_skipped() {
        let mut codec = BoltCodec::new();
        let mut buf = BytesMut::new();

        buf.put_slice(&END_MARKER);
        let encoded = encode(&PackStreamValue::Boolean(true)).unwrap();
        buf.put_u16(encoded.len() as u16);
        buf.put_slice(&encoded);
        buf.put_slice(&END_MARKER);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.as_bool(), Some(true));
    }

    #[test]
    fn test_multiple_messages() {
        let mut codec = BoltCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(PackStreamValue::Integer(1), &mut buf).unwrap();
        codec.encode(PackStreamValue::Integer(2), &mut buf).unwrap();
        codec.encode(PackStreamValue::Integer(3), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_int(), Some(1));
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_int(), Some(2));
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_int(), Some(3));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_response_codec_rejects_non_structure() {
        let mut codec = BoltResponseCodec::new();
        let mut buf = BytesMut::from(&[0x00, 0x01, 0x01, 0x00, 0x00][..]);
        assert!(matches!(codec.decode(&mut buf), Err(BoltError::Protocol(_))));
    }

    #[test]
    fn test_response_codec_decodes_ignored() {
        let mut codec = BoltResponseCodec::new();
        let mut buf = BytesMut::from(&[0x00, 0x02, 0xB0, tag::IGNORED, 0x00, 0x00][..]);
        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(BoltResponse::Ignored)
        ));
    }
}
