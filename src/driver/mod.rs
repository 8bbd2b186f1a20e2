//! Driver Module
//!
//! 소켓을 다루는 드라이버 계층 (tokio 기반)
//!
//! # 구성
//!
//! - `bolt`: 연결, 버전별 프로토콜, 서버 상태, 응답 큐
//! - `pool`: 주소별 연결 풀 (ConnectionPool, PooledConnection)
//! - `routing`: 라우팅 테이블과 클러스터 풀 (RoutingTable, RoutingPool)
//! - `config`: 연결/풀 설정 (ConnectionConfig, PoolConfig, AuthToken)
//! - `error`: 에러 분류 (DriverError, ServerError)
//! - `address`, `deadline`, `tls`: 주소 해석, 마감 시각, TLS 설정
//!
//! # Example
//!
//! ```ignore
//! use bolt_driver_core::driver::{Address, AuthToken, ConnectionPool, PoolConfig};
//!
//! // 단일 서버 풀
//! let config = PoolConfig::builder()
//!     .auth(AuthToken::basic("neo4j", "password"))
//!     .build();
//! let pool = ConnectionPool::direct(Address::new("localhost", 7687), config);
//!
//! // 연결 획득 후 쿼리 실행
//! let mut connection = pool.acquire_direct(pool.acquisition_deadline(), None).await?;
//! let run = connection.run("RETURN 1", Default::default(), &Default::default(), &Default::default(), Default::default())?;
//! let pull = connection.pull(-1, -1, Default::default())?;
//! connection.send_all().await?;
//! connection.fetch_all().await?;
//! println!("{:?}", pull.take_records());
//!
//! // 반환
//! connection.release().await;
//! pool.close().await;
//! ```

pub mod address;
pub mod bolt;
pub mod config;
pub mod deadline;
pub mod error;
pub mod pool;
pub mod routing;
pub mod tls;

// Re-exports
pub use address::{Address, CustomResolver, DnsResolver, Resolver, DEFAULT_PORT};
pub use config::{
    default_user_agent, AuthToken, ConnectionConfig, NotificationFilter, PoolConfig,
    PoolConfigBuilder,
};
pub use deadline::Deadline;
pub use error::{
    BoxError, DriverError, DriverResult, ErrorClassification, ServerError, ServerErrorKind,
};
pub use pool::{BoltOpener, ConnectionOpener, ConnectionPool, PoolListener, PooledConnection};
pub use routing::{RoutingPolicy, RoutingPool, RoutingTable};
pub use tls::{TlsConfig, TrustStrategy};
