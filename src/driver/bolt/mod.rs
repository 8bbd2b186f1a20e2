//! Bolt connections for the driver.
//!
//! This module holds the socket side of the Bolt protocol: opening a
//! transport, negotiating the version, and the per-connection request
//! pipeline.
//!
//! # Architecture
//!
//! ```text
//! open()
//!   ├── Resolver / TcpSocket / TlsConfig
//!   ├── handshake()          (version negotiation)
//!   └── Connection::hello()  (HELLO, LOGON)
//!
//! Connection
//!   ├── Protocol             (per-version request layout)
//!   ├── ChunkWriter          (outbox, flushed by send_all)
//!   ├── VecDeque<Response>   (FIFO of expected replies)
//!   └── ServerState          (pure transition function)
//! ```

pub mod connection;
pub mod open;
pub mod protocol;
pub mod response;
pub mod state;

#[cfg(test)]
pub(crate) mod stub;

pub use connection::{BoltStream, Connection, PoolFeedback};
pub use open::{establish, handshake, open};
pub use protocol::{Protocol, RouteRequest};
pub use response::{Response, ResponseHandle, ResponseHandlers, ResponseKind};
pub use state::{transition, ServerState};
