//! Bolt protocol handshake.
//!
//! The Bolt handshake consists of:
//! 1. Client sends 4-byte magic number (0x6060B017)
//! 2. Client sends 4 x 4-byte version proposals (most preferred first)
//! 3. Server responds with 4 bytes: the agreed version, zeroes if none, or
//!    a manifest marker (`xx xx 01 FF`) announcing a list of offerings
//!
//! Everything in here is pure; the socket side lives in the driver.

mod version;

pub use version::{BoltVersion, Capabilities};

pub use super::error::HandshakeError;

/// Bolt protocol magic number: 0x6060B017
/// This identifies a Bolt connection.
pub const BOLT_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// Size of the complete handshake message from client (magic + 4 versions)
pub const HANDSHAKE_SIZE: usize = 20;

/// Size of server response (negotiated version)
pub const HANDSHAKE_RESPONSE_SIZE: usize = 4;

/// Proposals sent after the magic number.
///
/// Manifest v1 first, then 5.2 down to 5.0, then 4.4 down to 4.0.
pub const VERSION_PROPOSALS: [[u8; 4]; 4] = [
    [0x00, 0x00, 0x01, 0xFF],
    [0x00, 0x02, 0x02, 0x05],
    [0x00, 0x04, 0x04, 0x04],
    [0x00, 0x00, 0x00, 0x00],
];

/// Build the 20-byte client handshake.
pub fn handshake_request() -> [u8; HANDSHAKE_SIZE] {
    let mut request = [0u8; HANDSHAKE_SIZE];
    request[..4].copy_from_slice(&BOLT_MAGIC);
    for (i, proposal) in VERSION_PROPOSALS.iter().enumerate() {
        let start = 4 + i * 4;
        request[start..start + 4].copy_from_slice(proposal);
    }
    request
}

/// Server's first 4-byte reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeResponse {
    /// Server picked a version directly
    Version(BoltVersion),
    /// Manifest v1: offerings follow
    ManifestV1,
}

impl HandshakeResponse {
    /// Interpret the first 4 bytes of the server's reply.
    pub fn parse(response: [u8; 4]) -> Result<Self, HandshakeError> {
        if &response == b"HTTP" {
            return Err(HandshakeError::LooksLikeHttp);
        }
        if response[3] == 0xFF {
            return match response[2] {
                0x01 => Ok(HandshakeResponse::ManifestV1),
                other => Err(HandshakeError::UnsupportedManifest(other)),
            };
        }
        BoltVersion::from_bytes(response)
            .map(HandshakeResponse::Version)
            .ok_or(HandshakeError::NoCompatibleVersion { response })
    }
}

/// One version range offered in a manifest v1 reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offering {
    /// Major version
    pub major: u8,
    /// Highest minor version offered
    pub minor: u8,
    /// How many minor versions below `minor` are also offered
    pub range: u8,
}

impl Offering {
    /// Parse `[_, range, minor, major]`.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            major: bytes[3],
            minor: bytes[2],
            range: bytes[1],
        }
    }

    /// Check whether `version` falls inside this offering.
    pub fn contains(&self, version: BoltVersion) -> bool {
        version.major() == self.major
            && version.minor() <= self.minor
            && version.minor() >= self.minor.saturating_sub(self.range)
    }
}

/// Pick the highest supported version covered by any offering.
pub fn choose_version(offerings: &[Offering]) -> Option<BoltVersion> {
    BoltVersion::ALL
        .iter()
        .copied()
        .find(|v| offerings.iter().any(|o| o.contains(*v)))
}

/// Encode a handshake varint (7 bits per byte, little-endian groups).
pub fn encode_varint(mut n: u64) -> Vec<u8> {
    let mut out = Vec::new();
    while n >= 0x80 {
        out.push((n as u8 & 0x7F) | 0x80);
        n >>= 7;
    }
    out.push(n as u8);
    out
}

/// Incremental varint decoder, fed one byte at a time from the socket.
#[derive(Debug, Default)]
pub struct VarintDecoder {
    value: u64,
    shift: u32,
}

impl VarintDecoder {
    /// Feed the next byte. Returns the value once the last byte is seen.
    pub fn push(&mut self, byte: u8) -> Result<Option<u64>, HandshakeError> {
        if self.shift >= 64 {
            return Err(HandshakeError::InvalidData("varint too long".to_string()));
        }
        self.value |= ((byte & 0x7F) as u64) << self.shift;
        self.shift += 7;
        if byte & 0x80 == 0 {
            Ok(Some(self.value))
        } else {
            Ok(None)
        }
    }
}
