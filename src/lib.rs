//! # Bolt Driver Core
//!
//! The connection core of a Bolt graph database client: wire codec,
//! per-connection protocol state machine, connection pooling and
//! cluster routing.
//!
//! ## Features
//!
//! - **PackStream** - Binary serialization of every Bolt value type
//! - **Bolt 4.0 - 5.2** - Version negotiation, including manifest-style handshakes
//! - **Pipelining** - Requests are queued and flushed together; replies are
//!   matched to requests strictly in order
//! - **Connection Pooling** - Per-address pools with deadlines, liveness checks
//!   and lifetime limits
//! - **Routing** - Per-database routing tables with TTL, failure feedback and
//!   least-connected server selection
//! - **TLS** - rustls with system, custom or permissive trust
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bolt_driver_core::driver::{Address, AuthToken, ConnectionPool, PoolConfig};
//! use bolt_driver_core::driver::bolt::ResponseHandlers;
//! use bolt_driver_core::bolt::{PackStreamMap, TransactionExtra};
//! use bolt_driver_core::driver::NotificationFilter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PoolConfig::builder()
//!         .auth(AuthToken::basic("neo4j", "password"))
//!         .build();
//!     let pool = ConnectionPool::direct(Address::new("localhost", 7687), config);
//!
//!     let mut connection = pool.acquire_direct(pool.acquisition_deadline(), None).await?;
//!     connection.run(
//!         "RETURN 1 AS n",
//!         PackStreamMap::new(),
//!         &TransactionExtra::default(),
//!         &NotificationFilter::default(),
//!         ResponseHandlers::new(),
//!     )?;
//!     let pull = connection.pull(-1, -1, ResponseHandlers::new())?;
//!     connection.send_all().await?;
//!     connection.fetch_all().await?;
//!
//!     for record in pull.take_records() {
//!         println!("{:?}", record);
//!     }
//!
//!     connection.release().await;
//!     pool.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Routing
//!
//! ```rust,no_run
//! use bolt_driver_core::bolt::AccessMode;
//! use bolt_driver_core::driver::{Address, Deadline, PoolConfig, RoutingPool};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = RoutingPool::new(Address::new("cluster.example.com", 7687), PoolConfig::default())?;
//! let deadline = Deadline::after(Duration::from_secs(30));
//!
//! // Goes to a writer of the `movies` database
//! let connection = pool
//!     .acquire(AccessMode::Write, Some("movies"), &[], deadline, None)
//!     .await?;
//! connection.release().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Everything above the wire layer returns [`DriverResult`]. Connectivity
//! problems surface as [`DriverError::ServiceUnavailable`] (or
//! [`DriverError::SessionExpired`] for routed connections), server failures
//! as [`DriverError::Server`] with a classified [`driver::ServerError`].
//!
//! ## Modules
//!
//! - [`bolt`] - Socket-free wire layer: PackStream, chunking, handshake, messages
//! - [`driver`] - Connections, pools and routing on top of Tokio
//!

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bolt;
pub mod driver;

// Re-exports for convenience
pub use driver::{
    Address, AuthToken, ConnectionConfig, ConnectionPool, Deadline, DriverError, DriverResult,
    PoolConfig, PooledConnection, RoutingPool, ServerError,
};

pub use bolt::{BoltError, BoltVersion, PackStreamValue};
