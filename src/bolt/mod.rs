//! # Bolt Protocol Implementation
//!
//! Low-level, socket-free side of the Bolt protocol.
//!
//! ## Overview
//!
//! The Bolt protocol is a binary protocol used for communication between
//! clients and graph database servers. This module provides:
//!
//! - **PackStream** - Binary serialization format for all data types
//! - **Codec** - Chunked message framing, usable as a Tokio codec
//! - **Handshake** - Protocol version negotiation
//! - **Message Types** - Request/response message layout
//!
//! ## Protocol Versions
//!
//! Bolt 4.0 through 4.4 and 5.0 through 5.2 are negotiated. What differs
//! between them is recorded in [`handshake::Capabilities`].
//!
//! ## Submodules
//!
//! - [`packstream`] - Binary serialization/deserialization
//! - [`codec`] - Chunking and the Tokio codec
//! - [`handshake`] - Version negotiation
//! - [`message`] - Bolt message types (HELLO, RUN, PULL, etc.)
//! - [`error`] - Protocol error types
//!
//! ## Note
//!
//! Connections, pools and routing live in [`crate::driver`].

pub mod codec;
pub mod error;
pub mod handshake;
pub mod message;
pub mod packstream;

pub use codec::{BoltCodec, BoltResponseCodec, ChunkWriter};
pub use error::{BoltError, BoltResult, HandshakeError};
pub use handshake::{BoltVersion, Capabilities, BOLT_MAGIC, HANDSHAKE_RESPONSE_SIZE};
pub use message::{
    AccessMode, BeginMessage, BoltRequest, BoltResponse, FailureMessage, HelloMessage,
    LogonMessage, PullMessage, RecordMessage, RouteDatabase, RouteMessage, RoutingInfo,
    RunMessage, ServerRole, SuccessMessage, TransactionExtra,
};
pub use packstream::{
    PackStreamDecoder, PackStreamEncoder, PackStreamError, PackStreamMap, PackStreamStructure,
    PackStreamValue,
};
