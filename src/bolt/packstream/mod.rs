//! PackStream serialization format.
//!
//! PackStream is the binary serialization format used by the Bolt protocol
//! to encode values for transmission between client and server.
//!
//! # Supported Types
//!
//! - **Null**: Single byte marker
//! - **Boolean**: True/False markers
//! - **Integer**: Variable-length encoding (-2^63 to 2^63-1)
//! - **Float**: 64-bit IEEE 754
//! - **String**: UTF-8 encoded, variable length prefix
//! - **Bytes**: Raw bytes, variable length prefix
//! - **List**: Heterogeneous collections, sized or streamed
//! - **Map**: String keys to arbitrary values, sized or streamed
//! - **Structure**: Signature byte plus fields, opaque to the codec

pub mod decoder;
pub mod encoder;
pub mod marker;
pub mod types;

pub use decoder::{decode, PackStreamDecoder, MAX_NESTING_DEPTH};
pub use encoder::{encode, PackStreamEncoder};
pub use types::{PackStreamMap, PackStreamStructure, PackStreamValue};

use std::fmt;

/// PackStream errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamError {
    /// Unexpected end of input
    UnexpectedEof,
    /// Unknown marker byte
    UnknownMarker(u8),
    /// End-of-stream marker outside a list or map stream
    UnexpectedEndOfStream,
    /// Invalid UTF-8 in string
    InvalidUtf8(String),
    /// Invalid map key (must be string)
    InvalidMapKey,
    /// Value too large to encode
    ValueTooLarge(&'static str, usize),
    /// Invalid structure format
    InvalidStructure(String),
    /// Containers nested deeper than the decoder allows
    NestingTooDeep(usize),
}

impl fmt::Display for PackStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackStreamError::UnexpectedEof => write!(f, "Unexpected end of PackStream data"),
            PackStreamError::UnknownMarker(m) => write!(f, "Unknown PackStream marker: 0x{:02X}", m),
            PackStreamError::UnexpectedEndOfStream => {
                write!(f, "End-of-stream marker outside of a list or map stream")
            }
            PackStreamError::InvalidUtf8(e) => write!(f, "Invalid UTF-8 in string: {}", e),
            PackStreamError::InvalidMapKey => write!(f, "Map keys must be strings"),
            PackStreamError::ValueTooLarge(t, s) => write!(f, "{} too large: {} entries", t, s),
            PackStreamError::InvalidStructure(msg) => write!(f, "Invalid structure: {}", msg),
            PackStreamError::NestingTooDeep(limit) => {
                write!(f, "PackStream value nested deeper than {} levels", limit)
            }
        }
    }
}

impl std::error::Error for PackStreamError {}
