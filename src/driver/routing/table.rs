//! 라우팅 테이블
//!
//! 데이터베이스 하나의 서버 역할별 목록을 관리합니다.

use std::time::Duration;

use indexmap::IndexSet;
use tokio::time::Instant;

use crate::bolt::message::{RoutingInfo, RoutingServer, ServerRole};
use crate::driver::address::{Address, DEFAULT_PORT};
use crate::driver::error::{DriverError, DriverResult};

/// TTL 이 지난 뒤 테이블을 메모리에서 제거하기까지의 유예 시간
pub const ROUTING_TABLE_PURGE_DELAY: Duration = Duration::from_secs(30);

/// 라우팅 테이블
///
/// 역할별 주소는 서버가 보낸 순서를 유지한다.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    /// 데이터베이스 이름 (`None` 은 기본 데이터베이스)
    pub database: Option<String>,
    /// 테이블 생성 시 주어진 라우터
    pub initial_routers: IndexSet<Address>,
    /// 라우터 목록 (라우팅 테이블 조회용)
    pub routers: IndexSet<Address>,
    /// 리더 목록 (읽기 트랜잭션용)
    pub readers: IndexSet<Address>,
    /// 라이터 목록 (쓰기 트랜잭션용)
    pub writers: IndexSet<Address>,
    /// 마지막 갱신 시점에 라이터가 없었는지 여부
    pub initialized_without_writers: bool,
    /// 마지막 갱신 시각
    pub last_updated_time: Instant,
    /// TTL
    pub ttl: Duration,
}

impl RoutingTable {
    /// 초기 라우터로 테이블 생성 (TTL 0, 즉시 갱신 필요)
    pub fn new(database: Option<String>, routers: impl IntoIterator<Item = Address>) -> Self {
        Self::with_servers(database, routers, [], [], Duration::ZERO)
    }

    fn with_servers(
        database: Option<String>,
        routers: impl IntoIterator<Item = Address>,
        readers: impl IntoIterator<Item = Address>,
        writers: impl IntoIterator<Item = Address>,
        ttl: Duration,
    ) -> Self {
        let routers: IndexSet<Address> = routers.into_iter().collect();
        let writers: IndexSet<Address> = writers.into_iter().collect();
        Self {
            database,
            initial_routers: routers.clone(),
            routers,
            readers: readers.into_iter().collect(),
            initialized_without_writers: writers.is_empty(),
            writers,
            last_updated_time: Instant::now(),
            ttl,
        }
    }

    /// 서버가 보낸 라우팅 정보로 테이블 생성
    ///
    /// 포트가 없는 주소는 7687 을 쓴다. 알 수 없는 역할은 이미 무시된 상태다.
    pub fn parse_routing_info(
        database: Option<String>,
        servers: &[RoutingServer],
        ttl: i64,
    ) -> DriverResult<Self> {
        let mut routers = Vec::new();
        let mut readers = Vec::new();
        let mut writers = Vec::new();

        for server in servers {
            let target = match server.role {
                ServerRole::Route => &mut routers,
                ServerRole::Read => &mut readers,
                ServerRole::Write => &mut writers,
            };
            for address in &server.addresses {
                let address = Address::parse(address, DEFAULT_PORT).map_err(|e| {
                    DriverError::protocol(format!("Cannot parse routing info: {}", e))
                })?;
                target.push(address);
            }
        }

        let ttl = Duration::from_secs(u64::try_from(ttl).unwrap_or(0));
        Ok(Self::with_servers(database, routers, readers, writers, ttl))
    }

    /// 라우팅 응답 행으로 테이블 생성
    ///
    /// 응답에 `db` 가 있으면 그 이름을, 없으면 요청한 이름을 쓴다.
    pub fn from_routing_info(info: &RoutingInfo, requested: Option<&str>) -> DriverResult<Self> {
        let database = info
            .db
            .clone()
            .or_else(|| requested.map(str::to_string));
        Self::parse_routing_info(database, &info.servers, info.ttl)
    }

    /// 주소가 어떤 역할로든 포함되어 있는지 확인
    pub fn contains(&self, address: &Address) -> bool {
        self.routers.contains(address)
            || self.readers.contains(address)
            || self.writers.contains(address)
    }

    /// 요청 모드에 대해 테이블을 그대로 써도 되는지 확인
    ///
    /// 만료되지 않았고, 라우터가 있고, 모드에 맞는 서버가 있어야 한다.
    pub fn is_fresh(&self, readonly: bool) -> bool {
        let expired = self
            .valid_until(Duration::ZERO)
            .is_some_and(|until| until <= Instant::now());
        let has_server_for_mode = if readonly {
            !self.readers.is_empty()
        } else {
            !self.writers.is_empty()
        };
        let fresh = !expired && !self.routers.is_empty() && has_server_for_mode;
        tracing::debug!(
            "[#0000]  _: <ROUTING> checking table freshness (readonly={}): table expired={}, has_server_for_mode={}, table routers={:?} => {}",
            readonly,
            expired,
            has_server_for_mode,
            self.routers,
            fresh
        );
        fresh
    }

    /// TTL 과 유예 시간이 모두 지났는지 확인
    pub fn should_be_purged(&self) -> bool {
        let purge = self
            .valid_until(ROUTING_TABLE_PURGE_DELAY)
            .is_some_and(|until| until <= Instant::now());
        tracing::debug!(
            "[#0000]  _: <ROUTING> purge check: age={:?}, ttl={:?} => {}",
            self.age(),
            self.ttl,
            purge
        );
        purge
    }

    /// TTL 에 `grace` 를 더한 만료 시각. 표현할 수 없을 만큼 멀면 `None` (만료되지 않음).
    fn valid_until(&self, grace: Duration) -> Option<Instant> {
        self.last_updated_time
            .checked_add(self.ttl)?
            .checked_add(grace)
    }

    /// 새 라우팅 정보로 갱신
    ///
    /// 초기 라우터는 유지한다.
    pub fn update(&mut self, new: &RoutingTable) {
        self.routers = new.routers.clone();
        self.readers = new.readers.clone();
        self.writers = new.writers.clone();
        self.initialized_without_writers = self.writers.is_empty();
        self.last_updated_time = Instant::now();
        self.ttl = new.ttl;
        tracing::debug!("[#0000]  _: <ROUTING> updated table={:?}", self);
    }

    /// 모든 역할의 주소 합집합
    pub fn servers(&self) -> IndexSet<Address> {
        self.routers
            .iter()
            .chain(&self.writers)
            .chain(&self.readers)
            .cloned()
            .collect()
    }

    /// 마지막 갱신 이후 경과 시간
    pub fn age(&self) -> Duration {
        self.last_updated_time.elapsed()
    }

    /// 주소를 모든 역할에서 제거
    pub fn discard(&mut self, address: &Address) {
        self.routers.shift_remove(address);
        self.readers.shift_remove(address);
        self.writers.shift_remove(address);
    }

    /// 주소를 라이터에서만 제거
    pub fn discard_writer(&mut self, address: &Address) {
        self.writers.shift_remove(address);
    }

    /// 역할별 주소 목록
    pub fn addresses(&self, role: ServerRole) -> &IndexSet<Address> {
        match role {
            ServerRole::Route => &self.routers,
            ServerRole::Read => &self.readers,
            ServerRole::Write => &self.writers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn addr(s: &str) -> Address {
        Address::parse(s, DEFAULT_PORT).unwrap()
    }

    fn server(role: ServerRole, addresses: &[&str]) -> RoutingServer {
        RoutingServer {
            role,
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn cluster(ttl: i64) -> RoutingTable {
        RoutingTable::parse_routing_info(
            Some("movies".to_string()),
            &[
                server(ServerRole::Route, &["r1:7687", "r2:7687"]),
                server(ServerRole::Read, &["r2:7687", "r3"]),
                server(ServerRole::Write, &["r1:7687"]),
            ],
            ttl,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_parse_routing_info() {
        let table = cluster(300);
        assert_eq!(table.database.as_deref(), Some("movies"));
        assert_eq!(
            table.routers.iter().cloned().collect::<Vec<_>>(),
            vec![addr("r1:7687"), addr("r2:7687")]
        );
        assert_eq!(
            table.readers.iter().cloned().collect::<Vec<_>>(),
            vec![addr("r2:7687"), addr("r3:7687")]
        );
        assert_eq!(
            table.writers.iter().cloned().collect::<Vec<_>>(),
            vec![addr("r1:7687")]
        );
        assert_eq!(table.ttl, Duration::from_secs(300));
        assert!(!table.initialized_without_writers);
    }

    #[tokio::test]
    async fn test_parse_routing_info_rejects_bad_address() {
        let err = RoutingTable::parse_routing_info(
            None,
            &[server(ServerRole::Route, &["r1:notaport"])],
            300,
        )
        .unwrap_err();
        assert!(matches!(err, DriverError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_from_routing_info_database_name() {
        let info = RoutingInfo {
            ttl: 10,
            servers: vec![server(ServerRole::Route, &["r1"])],
            db: None,
        };
        let table = RoutingTable::from_routing_info(&info, Some("people")).unwrap();
        assert_eq!(table.database.as_deref(), Some("people"));

        let info = RoutingInfo {
            db: Some("neo4j".to_string()),
            ..info
        };
        let table = RoutingTable::from_routing_info(&info, None).unwrap();
        assert_eq!(table.database.as_deref(), Some("neo4j"));
    }

    #[tokio::test]
    async fn test_initial_table_is_not_fresh() {
        let table = RoutingTable::new(None, [addr("seed")]);
        assert!(table.initialized_without_writers);
        assert!(!table.is_fresh(true));
        assert!(!table.is_fresh(false));
        assert_eq!(table.initial_routers, table.routers);
    }

    #[tokio::test(start_paused = true)]
    async fn test_freshness_by_mode_and_ttl() {
        let table = cluster(10);
        assert!(table.is_fresh(true));
        assert!(table.is_fresh(false));

        let mut no_writers = table.clone();
        no_writers.discard_writer(&addr("r1"));
        assert!(no_writers.is_fresh(true));
        assert!(!no_writers.is_fresh(false));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!table.is_fresh(true));
    }

    #[tokio::test]
    async fn test_zero_ttl_is_never_fresh() {
        let table = cluster(0);
        assert!(!table.is_fresh(true));
        assert!(!table.is_fresh(false));
    }

    #[tokio::test]
    async fn test_negative_ttl_is_zero() {
        assert_eq!(cluster(-5).ttl, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let table = cluster(i64::MAX);
        assert_eq!(table.ttl, Duration::from_secs(i64::MAX as u64));
        assert!(table.is_fresh(true));
        assert!(table.is_fresh(false));
        assert!(!table.should_be_purged());
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_be_purged() {
        let table = cluster(10);
        tokio::time::advance(Duration::from_secs(39)).await;
        assert!(!table.should_be_purged());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(table.should_be_purged());
        assert_eq!(table.age(), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_keeps_initial_routers() {
        let mut table = RoutingTable::new(Some("movies".to_string()), [addr("seed")]);
        tokio::time::advance(Duration::from_secs(5)).await;

        table.update(&cluster(300));
        assert_eq!(table.age(), Duration::ZERO);
        assert_eq!(table.ttl, Duration::from_secs(300));
        assert!(!table.initialized_without_writers);
        assert!(table.initial_routers.contains(&addr("seed")));
        assert!(!table.routers.contains(&addr("seed")));
    }

    #[tokio::test]
    async fn test_servers_and_discard() {
        let mut table = cluster(300);
        assert_eq!(table.servers().len(), 3);

        table.discard(&addr("r2"));
        assert!(!table.contains(&addr("r2")));
        assert_eq!(table.servers().len(), 2);

        table.discard_writer(&addr("r1"));
        assert!(table.writers.is_empty());
        assert!(table.routers.contains(&addr("r1")));
    }
}
