//! 라우팅 모듈
//!
//! 클러스터 환경에서 자동 라우팅을 지원합니다.
//!
//! # 개요
//!
//! 라우팅 풀은 데이터베이스별 라우팅 테이블을 유지합니다. 읽기 요청은
//! 리더로, 쓰기 요청은 라이터로 분배되며, 테이블이 오래되면 라우터에게서
//! 새 테이블을 받아 통째로 교체합니다.
//!
//! # 예시
//!
//! ```ignore
//! use bolt_driver_core::bolt::message::AccessMode;
//! use bolt_driver_core::driver::{Address, Deadline, PoolConfig};
//! use bolt_driver_core::driver::routing::RoutingPool;
//!
//! let pool = RoutingPool::new(Address::new("cluster.local", 7687), PoolConfig::default())?;
//!
//! // 쓰기 연결 (라이터로 라우팅)
//! let connection = pool
//!     .acquire(AccessMode::Write, Some("movies"), &[], Deadline::after(timeout), None)
//!     .await?;
//! connection.release().await;
//!
//! pool.close().await;
//! ```

mod policy;
mod pool;
mod table;

pub use policy::{select_address, RoutingPolicy, ServerSelector};
pub use pool::RoutingPool;
pub use table::{RoutingTable, ROUTING_TABLE_PURGE_DELAY};

pub use crate::bolt::message::ServerRole;
