//! 라우팅 풀
//!
//! 데이터베이스별 라우팅 테이블을 유지하며 역할에 맞는 서버로 연결을
//! 분배하는 클러스터 연결 풀입니다.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::policy::{RoutingPolicy, ServerSelector};
use super::table::RoutingTable;
use crate::bolt::message::{AccessMode, RoutingInfo, ServerRole};
use crate::bolt::packstream::PackStreamMap;
use crate::driver::address::Address;
use crate::driver::config::{ConnectionConfig, PoolConfig};
use crate::driver::deadline::Deadline;
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::pool::{BoltOpener, ConnectionOpener, ConnectionPool, PoolListener, PooledConnection};

/// 라우팅 컨텍스트에서 예약된 키
const RESERVED_CONTEXT_KEY: &str = "address";

// ============================================================================
// RoutingTables - 데이터베이스별 테이블
// ============================================================================

/// 데이터베이스별 라우팅 테이블 모음
///
/// 테이블은 `Arc` 로 공유하고 수정할 때는 복사 후 교체한다. 읽는 쪽은
/// 부분적으로 갱신된 테이블을 보지 않는다.
struct RoutingTables {
    initial_address: Address,
    tables: Mutex<HashMap<Option<String>, Arc<RoutingTable>>>,
}

impl RoutingTables {
    fn get(&self, database: Option<&str>) -> Option<Arc<RoutingTable>> {
        self.tables.lock().get(&database.map(str::to_string)).cloned()
    }

    fn get_or_create(&self, database: Option<&str>) -> Arc<RoutingTable> {
        let key = database.map(str::to_string);
        self.tables
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RoutingTable::new(key, [self.initial_address.clone()])))
            .clone()
    }

    fn store(&self, key: Option<String>, new: &RoutingTable) {
        let mut tables = self.tables.lock();
        let entry = tables
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RoutingTable::new(key, [self.initial_address.clone()])));
        Arc::make_mut(entry).update(new);
    }

    fn purge(&self) {
        self.tables.lock().retain(|database, table| {
            let purge = table.should_be_purged();
            if purge {
                tracing::debug!(
                    "[#0000]  _: <POOL> dropping routing table for database={:?}",
                    database
                );
            }
            !purge
        });
    }

    fn servers(&self) -> HashSet<Address> {
        self.tables
            .lock()
            .values()
            .flat_map(|table| table.servers())
            .collect()
    }

    fn remove_address(&self, address: &Address) {
        for table in self.tables.lock().values_mut() {
            if table.contains(address) {
                Arc::make_mut(table).discard(address);
            }
        }
    }

    fn remove_writer(&self, address: &Address, database: Option<&str>) {
        let mut tables = self.tables.lock();
        if let Some(table) = tables.get_mut(&database.map(str::to_string)) {
            if table.writers.contains(address) {
                Arc::make_mut(table).discard_writer(address);
            }
        }
    }
}

impl PoolListener for RoutingTables {
    fn on_deactivate(&self, address: &Address) {
        tracing::debug!("[#0000]  _: <POOL> deactivating address {}", address);
        self.remove_address(address);
    }

    fn on_write_failure(&self, address: &Address, database: Option<&str>) {
        tracing::debug!(
            "[#0000]  _: <POOL> removing writer {} for database {:?}",
            address,
            database
        );
        self.remove_writer(address, database);
    }
}

// ============================================================================
// RoutingPool - 클러스터 연결 풀
// ============================================================================

/// 라우팅 풀
///
/// 복제하면 같은 풀을 공유한다.
#[derive(Clone)]
pub struct RoutingPool {
    inner: Arc<RoutingInner>,
}

struct RoutingInner {
    pool: ConnectionPool,
    tables: Arc<RoutingTables>,
    routing_context: PackStreamMap,
    refresh_lock: tokio::sync::Mutex<()>,
    selector: ServerSelector,
}

impl RoutingPool {
    /// 초기 라우터 주소와 설정으로 라우팅 풀 생성
    pub fn new(address: Address, config: PoolConfig) -> DriverResult<Self> {
        Self::with_policy(address, config, RoutingPolicy::default())
    }

    /// 서버 선택 정책을 지정해 생성
    pub fn with_policy(
        address: Address,
        mut config: PoolConfig,
        policy: RoutingPolicy,
    ) -> DriverResult<Self> {
        config.connection = routing_connection_config(&address, config.connection)?;
        let opener = Arc::new(BoltOpener::new(config.connection.clone()));
        Ok(Self::build(address, opener, config, policy))
    }

    /// opener 를 지정해 생성
    pub fn with_opener(
        address: Address,
        opener: Arc<dyn ConnectionOpener>,
        mut config: PoolConfig,
    ) -> DriverResult<Self> {
        config.connection = routing_connection_config(&address, config.connection)?;
        Ok(Self::build(address, opener, config, RoutingPolicy::default()))
    }

    fn build(
        address: Address,
        opener: Arc<dyn ConnectionOpener>,
        config: PoolConfig,
        policy: RoutingPolicy,
    ) -> Self {
        let routing_context = config.connection.routing_context_map().unwrap_or_default();
        let tables = Arc::new(RoutingTables {
            initial_address: address.clone(),
            tables: Mutex::new(HashMap::new()),
        });
        let pool = ConnectionPool::with_listener(opener, config, tables.clone());
        tracing::debug!("[#0000]  _: <POOL> created, routing address {}", address);

        Self {
            inner: Arc::new(RoutingInner {
                pool,
                tables,
                routing_context,
                refresh_lock: tokio::sync::Mutex::new(()),
                selector: ServerSelector::new(policy),
            }),
        }
    }

    /// 초기 라우터 주소
    pub fn initial_address(&self) -> &Address {
        &self.inner.tables.initial_address
    }

    /// 주소별 연결 풀
    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    /// 데이터베이스의 라우팅 테이블 스냅샷
    pub fn routing_table(&self, database: Option<&str>) -> Option<Arc<RoutingTable>> {
        self.inner.tables.get(database)
    }

    // ------------------------------------------------------------------
    // 연결 획득
    // ------------------------------------------------------------------

    /// 모드에 맞는 서버로 연결 획득
    ///
    /// 테이블을 필요하면 갱신한 뒤, 사용 중인 연결이 가장 적은 주소를
    /// 고른다. 연결할 수 없는 주소는 비활성화하고 다음 주소를 시도한다.
    pub async fn acquire(
        &self,
        mode: AccessMode,
        database: Option<&str>,
        bookmarks: &[String],
        deadline: Deadline,
        liveness_check_timeout: Option<Duration>,
    ) -> DriverResult<PooledConnection> {
        tracing::debug!(
            "[#0000]  _: <POOL> acquire routing connection, access_mode={}, database={:?}",
            mode,
            database
        );
        self.ensure_routing_table_is_fresh(mode, database, None, bookmarks, deadline)
            .await?;

        loop {
            let Some(address) = self.select_address(mode, database) else {
                return Err(DriverError::session_expired(format!(
                    "Failed to obtain connection towards '{}' server.",
                    mode
                )));
            };

            tracing::debug!(
                "[#0000]  _: <POOL> acquire address, database={:?} address={}",
                database,
                address
            );
            match self
                .inner
                .pool
                .acquire(&address, deadline, liveness_check_timeout)
                .await
            {
                Ok(connection) => return Ok(connection),
                Err(e) if e.is_unavailable() => {
                    tracing::debug!("[#0000]  _: <POOL> failed to acquire from {}: {}", address, e);
                    self.deactivate(&address).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn select_address(&self, mode: AccessMode, database: Option<&str>) -> Option<Address> {
        let table = self.inner.tables.get(database)?;
        let candidates: Vec<Address> = match mode {
            AccessMode::Read => table.readers.iter().cloned().collect(),
            AccessMode::Write => table.writers.iter().cloned().collect(),
        };
        self.inner
            .selector
            .select(&candidates, |address| self.inner.pool.in_use_connection_count(address))
    }

    // ------------------------------------------------------------------
    // 라우팅 테이블 갱신
    // ------------------------------------------------------------------

    /// 테이블이 오래되었으면 갱신
    ///
    /// 갱신했으면 `true`. 갱신에 실패해도 기존 테이블에 요청 역할의 서버가
    /// 남아 있으면 그 테이블을 그대로 쓰고 `false`.
    pub async fn ensure_routing_table_is_fresh(
        &self,
        mode: AccessMode,
        database: Option<&str>,
        imp_user: Option<&str>,
        bookmarks: &[String],
        deadline: Deadline,
    ) -> DriverResult<bool> {
        let _guard = self.inner.refresh_lock.lock().await;

        self.inner.tables.purge();

        let table = self.inner.tables.get_or_create(database);
        if table.is_fresh(mode == AccessMode::Read) {
            tracing::debug!("[#0000]  _: <POOL> using existing routing table {:?}", table);
            return Ok(false);
        }

        if let Err(e) = self.refresh(database, imp_user, bookmarks, deadline).await {
            // 라우터가 모두 응답하지 않아도 오래된 테이블에 역할 서버가 남아 있으면 쓴다
            let role = match mode {
                AccessMode::Read => ServerRole::Read,
                AccessMode::Write => ServerRole::Write,
            };
            let usable = matches!(e, DriverError::Routing(_))
                && self
                    .inner
                    .tables
                    .get(database)
                    .is_some_and(|table| !table.addresses(role).is_empty());
            if !usable {
                return Err(e);
            }
            tracing::warn!(
                "[#0000]  _: <POOL> using stale routing table for database={:?}: {}",
                database,
                e
            );
            return Ok(false);
        }
        self.update_connection_pool().await;
        Ok(true)
    }

    /// 라우터에게서 테이블을 새로 받아 교체
    pub async fn update_routing_table(
        &self,
        database: Option<&str>,
        imp_user: Option<&str>,
        bookmarks: &[String],
        deadline: Deadline,
    ) -> DriverResult<()> {
        let _guard = self.inner.refresh_lock.lock().await;
        self.refresh(database, imp_user, bookmarks, deadline).await
    }

    /// 갱신 잠금을 잡은 상태에서 호출
    ///
    /// 시도 순서: 라이터 없이 초기화된 테이블이면 초기 라우터 먼저, 다음으로
    /// 알려진 다른 라우터, 마지막으로 아직 시도하지 않은 초기 라우터.
    async fn refresh(
        &self,
        database: Option<&str>,
        imp_user: Option<&str>,
        bookmarks: &[String],
        deadline: Deadline,
    ) -> DriverResult<()> {
        let table = self.inner.tables.get_or_create(database);
        let initial = self.initial_address().clone();
        let prefer_initial = table.initialized_without_writers;
        let others: Vec<Address> = table
            .routers
            .iter()
            .filter(|router| **router != initial)
            .cloned()
            .collect();

        let request = RefreshRequest {
            database,
            imp_user,
            bookmarks,
            deadline,
        };

        if prefer_initial && self.update_from(std::slice::from_ref(&initial), &request).await? {
            return Ok(());
        }
        if self.update_from(&others, &request).await? {
            return Ok(());
        }
        if !prefer_initial && self.update_from(std::slice::from_ref(&initial), &request).await? {
            return Ok(());
        }

        tracing::error!("Unable to retrieve routing information");
        Err(DriverError::routing("Unable to retrieve routing information"))
    }

    /// 라우터를 순서대로 시도. 테이블을 갱신했으면 `true`.
    async fn update_from(&self, routers: &[Address], request: &RefreshRequest<'_>) -> DriverResult<bool> {
        if !routers.is_empty() {
            tracing::debug!(
                "[#0000]  _: <POOL> attempting to update routing table from {:?}",
                routers
            );
        }

        let resolver = self.inner.pool.config().connection.resolver.clone();
        for router in routers {
            // 리졸버가 펼친 주소를 하나씩 시도한다
            for candidate in resolver.expand(router) {
                let Some(new_table) = self.fetch_routing_table(&candidate, request).await? else {
                    continue;
                };
                let requested = request.database.map(str::to_string);
                if new_table.database != requested {
                    self.inner.tables.store(new_table.database.clone(), &new_table);
                }
                self.inner.tables.store(requested, &new_table);
                tracing::debug!(
                    "[#0000]  _: <POOL> update routing table from address={} ({:?})",
                    candidate,
                    new_table
                );
                return Ok(true);
            }
            self.deactivate(router).await;
        }
        Ok(false)
    }

    /// 라우터 하나에서 테이블 조회
    ///
    /// 라우터가 쓸 만한 정보를 주지 못하면 `None`. 탐색 중 치명적인 서버
    /// 에러는 그대로 전파한다.
    async fn fetch_routing_table(
        &self,
        router: &Address,
        request: &RefreshRequest<'_>,
    ) -> DriverResult<Option<RoutingTable>> {
        let rows = match self.fetch_routing_info(router, request).await {
            Ok(rows) => rows,
            Err(e) => match e.server_error() {
                Some(server) if server.is_fatal_during_discovery() => return Err(e),
                Some(_) => Vec::new(),
                None if e.is_unavailable() => Vec::new(),
                None => return Err(e),
            },
        };

        let Some(info) = rows.first() else {
            tracing::debug!("[#0000]  _: <POOL> failed to fetch routing info from {}", router);
            return Ok(None);
        };
        let table = RoutingTable::from_routing_info(info, request.database)?;

        if table.routers.is_empty() {
            tracing::debug!("[#0000]  _: <POOL> no routing servers returned from server {}", router);
            return Ok(None);
        }
        if table.readers.is_empty() {
            tracing::debug!("[#0000]  _: <POOL> no read servers returned from server {}", router);
            return Ok(None);
        }
        // 라이터가 없는 것은 리더 교체 중인 일시적 상태일 수 있다
        Ok(Some(table))
    }

    async fn fetch_routing_info(
        &self,
        router: &Address,
        request: &RefreshRequest<'_>,
    ) -> DriverResult<Vec<RoutingInfo>> {
        tracing::debug!(
            "[#0000]  _: <POOL> acquire router connection, database={:?}, address={}",
            request.database,
            router
        );
        let mut connection = self.inner.pool.acquire(router, request.deadline, None).await?;
        connection.set_deadline(request.deadline);
        let result = connection
            .route(
                self.inner.routing_context.clone(),
                request.bookmarks,
                request.database,
                request.imp_user,
            )
            .await;
        connection.set_deadline(Deadline::never());
        connection.release().await;
        result
    }

    /// 어떤 테이블에도 없는 주소의 연결을 정리
    async fn update_connection_pool(&self) {
        let servers = self.inner.tables.servers();
        for address in self.inner.pool.addresses() {
            if !servers.contains(&address) {
                self.inner.pool.deactivate(&address).await;
            }
        }
    }

    // ------------------------------------------------------------------
    // 피드백
    // ------------------------------------------------------------------

    /// 주소를 모든 테이블에서 제거하고 풀에서 비활성화
    pub async fn deactivate(&self, address: &Address) {
        self.inner.tables.on_deactivate(address);
        self.inner.pool.deactivate(address).await;
    }

    /// 주소를 `database` 의 라이터에서 제거
    pub fn on_write_failure(&self, address: &Address, database: Option<&str>) {
        self.inner.tables.on_write_failure(address, database);
    }

    /// 풀 닫기
    pub async fn close(&self) {
        self.inner.pool.close().await;
    }
}

impl fmt::Debug for RoutingPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingPool")
            .field("address", self.initial_address())
            .finish_non_exhaustive()
    }
}

/// 한 번의 갱신 요청
struct RefreshRequest<'a> {
    database: Option<&'a str>,
    imp_user: Option<&'a str>,
    bookmarks: &'a [String],
    deadline: Deadline,
}

/// 라우팅 컨텍스트에 초기 라우터 주소를 넣은 연결 설정
fn routing_connection_config(
    address: &Address,
    mut config: ConnectionConfig,
) -> DriverResult<ConnectionConfig> {
    let mut context = config.routing_context.take().unwrap_or_default();
    if context.contains_key(RESERVED_CONTEXT_KEY) {
        return Err(DriverError::configuration(
            "The key 'address' is reserved for routing context.",
        ));
    }
    context.insert(RESERVED_CONTEXT_KEY.to_string(), address.to_string());
    config.routing_context = Some(context);
    Ok(config)
}

// ============================================================================
// Tests
// ============================================================================
