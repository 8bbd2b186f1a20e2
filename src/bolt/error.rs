//! Bolt protocol error types.

use std::fmt;
use std::io;

use super::packstream::PackStreamError;

/// Result type for Bolt operations.
pub type BoltResult<T> = Result<T, BoltError>;

/// Wire-level Bolt errors.
///
/// Everything here means the byte stream can no longer be trusted; the
/// driver layer turns these into connection failures.
#[derive(Debug)]
pub enum BoltError {
    /// I/O error
    Io(io::Error),

    /// Handshake error
    Handshake(HandshakeError),

    /// PackStream serialization error
    PackStream(PackStreamError),

    /// Protocol error (invalid message format, etc.)
    Protocol(String),

    /// Response message with an unknown signature
    UnexpectedMessage(u8),

    /// Message too large
    MessageTooLarge { size: usize, max: usize },

    /// Connection closed
    ConnectionClosed,
}

impl fmt::Display for BoltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoltError::Io(e) => write!(f, "I/O error: {}", e),
            BoltError::Handshake(e) => write!(f, "Handshake error: {}", e),
            BoltError::PackStream(e) => write!(f, "PackStream error: {}", e),
            BoltError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            BoltError::UnexpectedMessage(tag) => {
                write!(f, "Unexpected response message with signature {:02X}", tag)
            }
            BoltError::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max: {})", size, max)
            }
            BoltError::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for BoltError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BoltError::Io(e) => Some(e),
            BoltError::Handshake(e) => Some(e),
            BoltError::PackStream(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BoltError {
    fn from(err: io::Error) -> Self {
        BoltError::Io(err)
    }
}

impl From<HandshakeError> for BoltError {
    fn from(err: HandshakeError) -> Self {
        BoltError::Handshake(err)
    }
}

impl From<PackStreamError> for BoltError {
    fn from(err: PackStreamError) -> Self {
        BoltError::PackStream(err)
    }
}

/// Handshake-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The endpoint answered with `HTTP`
    LooksLikeHttp,

    /// Manifest-style response with a manifest version we do not speak
    UnsupportedManifest(u8),

    /// No compatible protocol version found
    NoCompatibleVersion { response: [u8; 4] },

    /// Invalid handshake data (wrong size, etc.)
    InvalidData(String),

    /// Connection closed during handshake
    ConnectionClosed,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::LooksLikeHttp => write!(f, "Non-Bolt endpoint (looks like HTTP)"),
            HandshakeError::UnsupportedManifest(v) => {
                write!(f, "Unsupported Bolt handshake manifest version {}", v)
            }
            HandshakeError::NoCompatibleVersion { response } => {
                write!(
                    f,
                    "No compatible protocol version found (server replied {:02X?})",
                    response
                )
            }
            HandshakeError::InvalidData(msg) => {
                write!(f, "Invalid handshake data: {}", msg)
            }
            HandshakeError::ConnectionClosed => {
                write!(f, "Connection closed with incomplete handshake response")
            }
        }
    }
}

impl std::error::Error for HandshakeError {}
