//! Connection Pool
//!
//! 주소별 연결 풀링
//!
//! 풀은 주소마다 유휴 연결 큐와 사용 중/예약 카운트를 가진다. 잠금은
//! `parking_lot::Mutex` 이며 `.await` 를 넘어 보유하지 않는다. 새 연결은
//! 예약(reservation)을 잡은 뒤 잠금 밖에서 연다.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::address::Address;
use super::bolt::{self, Connection, PoolFeedback};
use super::config::{ConnectionConfig, PoolConfig};
use super::deadline::Deadline;
use super::error::{DriverError, DriverResult};

// ============================================================================
// ConnectionOpener - 연결 생성
// ============================================================================

/// 새 연결을 여는 방법
#[async_trait]
pub trait ConnectionOpener: Send + Sync {
    /// `address` 로 HELLO 까지 끝난 연결을 연다
    async fn open(&self, address: &Address, deadline: Deadline) -> DriverResult<Connection>;
}

/// 실제 소켓을 여는 opener
#[derive(Debug, Clone)]
pub struct BoltOpener {
    config: ConnectionConfig,
}

impl BoltOpener {
    /// 연결 설정으로 생성
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionOpener for BoltOpener {
    async fn open(&self, address: &Address, deadline: Deadline) -> DriverResult<Connection> {
        bolt::open(address, &self.config, deadline).await
    }
}

// ============================================================================
// PoolListener - 피드백 수신
// ============================================================================

/// 반환된 연결의 피드백을 풀 밖에서 받는 쪽 (라우팅 테이블)
pub trait PoolListener: Send + Sync {
    /// 주소 비활성화
    fn on_deactivate(&self, address: &Address);
    /// 주소가 `database` 의 writer 가 아님
    fn on_write_failure(&self, address: &Address, database: Option<&str>);
}

// ============================================================================
// Slot - 주소별 상태
// ============================================================================

#[derive(Default)]
struct Slot {
    idle: VecDeque<Connection>,
    in_use: usize,
    reservations: usize,
    generation: u64,
}

impl Slot {
    fn size(&self) -> usize {
        self.idle.len() + self.in_use + self.reservations
    }
}

struct PoolInner {
    opener: Arc<dyn ConnectionOpener>,
    config: PoolConfig,
    direct_address: Option<Address>,
    listener: Option<Arc<dyn PoolListener>>,
    slots: Mutex<HashMap<Address, Slot>>,
    notify: Notify,
    closed: AtomicBool,
}

impl PoolInner {
    /// 연결 반환. 닫아야 할 연결들을 돌려준다.
    fn check_in(&self, mut connection: Connection) -> Vec<Connection> {
        let address = connection.address().clone();
        let feedback = connection.take_feedback();
        let mut to_close = Vec::new();

        {
            let mut slots = self.slots.lock();
            match slots.get_mut(&address) {
                Some(slot) => {
                    slot.in_use = slot.in_use.saturating_sub(1);
                    let reusable = !self.closed.load(Ordering::Acquire)
                        && !connection.closed()
                        && !connection.defunct()
                        && !connection.stale()
                        && connection.pending_responses() == 0
                        && connection.is_reset()
                        && connection.generation() == slot.generation;
                    if reusable {
                        slot.idle.push_back(connection);
                    } else {
                        to_close.push(connection);
                    }
                }
                None => to_close.push(connection),
            }
        }

        to_close.extend(self.apply_feedback(&address, feedback));
        self.notify.notify_waiters();
        to_close
    }

    fn apply_feedback(&self, address: &Address, feedback: Vec<PoolFeedback>) -> Vec<Connection> {
        let mut to_close = Vec::new();
        for item in feedback {
            match item {
                PoolFeedback::Deactivate => {
                    tracing::debug!("[#0000]  _: <POOL> deactivating address {}", address);
                    if let Some(listener) = &self.listener {
                        listener.on_deactivate(address);
                    }
                    to_close.extend(self.detach(address));
                }
                PoolFeedback::WriteFailure { database } => {
                    if let Some(listener) = &self.listener {
                        listener.on_write_failure(address, database.as_deref());
                    }
                }
                PoolFeedback::InvalidateAll => self.mark_all_stale(),
            }
        }
        to_close
    }

    /// 주소의 유휴 연결을 떼어내고 세대를 올린다
    fn detach(&self, address: &Address) -> Vec<Connection> {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(address) else {
            return Vec::new();
        };
        slot.generation += 1;
        let idle: Vec<Connection> = slot.idle.drain(..).collect();
        if slot.in_use == 0 && slot.reservations == 0 {
            slots.remove(address);
        }
        idle
    }

    fn mark_all_stale(&self) {
        let mut slots = self.slots.lock();
        for slot in slots.values_mut() {
            slot.generation += 1;
        }
    }

    fn generation(&self, address: &Address) -> Option<u64> {
        self.slots.lock().get(address).map(|slot| slot.generation)
    }
}

// ============================================================================
// PooledConnection - 풀링된 연결
// ============================================================================

/// 풀에서 빌린 연결
///
/// [`release`](Self::release) 로 돌려준다. 그냥 drop 하면 깨끗한 연결은
/// 유휴 큐로, 그렇지 않은 연결은 끊고 카운트만 정리한다.
pub struct PooledConnection {
    connection: Option<Connection>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    fn new(connection: Connection, pool: Arc<PoolInner>) -> Self {
        Self {
            connection: Some(connection),
            pool,
        }
    }

    /// 풀로 반환
    ///
    /// 리셋이 필요하면 RESET 을 보낸다. 리셋 실패는 로그만 남긴다.
    pub async fn release(mut self) {
        if let Some(connection) = self.connection.as_mut() {
            if !connection.defunct() && !connection.closed() {
                let result = if !connection.is_reset() {
                    connection.reset().await
                } else if connection.pending_responses() > 0 {
                    connection.fetch_all().await.map(|_| ())
                } else {
                    Ok(())
                };
                if let Err(e) = result {
                    tracing::debug!(
                        "[#{:04X}]  _: <POOL> failed to reset connection on release: {}",
                        connection.id(),
                        e
                    );
                }
            }
        }
        if let Some(connection) = self.connection.take() {
            for mut stale in self.pool.check_in(connection) {
                stale.close().await;
            }
        }
    }

    /// 연결을 끊고 반환
    pub fn kill_and_release(mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.kill();
            for mut stale in self.pool.check_in(connection) {
                stale.kill();
            }
        }
    }

    async fn close_and_release(mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
            for mut stale in self.pool.check_in(connection) {
                stale.close().await;
            }
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection
            .as_ref()
            .expect("pooled connection used after release")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection
            .as_mut()
            .expect("pooled connection used after release")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            // 비동기 리셋이 불가능하므로 깨끗하지 않은 연결은 끊는다
            if connection.pending_responses() > 0 || !connection.is_reset() {
                connection.kill();
            }
            for mut stale in self.pool.check_in(connection) {
                stale.kill();
            }
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("connection", &self.connection)
            .finish()
    }
}

/// 여는 중인 연결 자리
///
/// 열기가 실패하거나 취소되면 drop 에서 자리를 반납한다.
struct Reservation {
    pool: Arc<PoolInner>,
    address: Address,
    generation: u64,
    active: bool,
}

impl Reservation {
    fn fulfil(mut self, mut connection: Connection) -> PooledConnection {
        {
            let mut slots = self.pool.slots.lock();
            let slot = slots.entry(self.address.clone()).or_default();
            slot.reservations = slot.reservations.saturating_sub(1);
            slot.in_use += 1;
        }
        self.active = false;
        connection.set_generation(self.generation);
        PooledConnection::new(connection, self.pool.clone())
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        {
            let mut slots = self.pool.slots.lock();
            if let Some(slot) = slots.get_mut(&self.address) {
                slot.reservations = slot.reservations.saturating_sub(1);
                if slot.size() == 0 && slot.generation != self.generation {
                    slots.remove(&self.address);
                }
            }
        }
        self.pool.notify.notify_waiters();
    }
}

// ============================================================================
// ConnectionPool - 연결 풀
// ============================================================================

/// 연결 풀
///
/// 복제하면 같은 풀을 공유한다.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    fn build(
        opener: Arc<dyn ConnectionOpener>,
        config: PoolConfig,
        direct_address: Option<Address>,
        listener: Option<Arc<dyn PoolListener>>,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                opener,
                config,
                direct_address,
                listener,
                slots: Mutex::new(HashMap::new()),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// 단일 서버 풀 (실제 소켓)
    pub fn direct(address: Address, config: PoolConfig) -> Self {
        let opener = Arc::new(BoltOpener::new(config.connection.clone()));
        Self::build(opener, config, Some(address), None)
    }

    /// 단일 서버 풀 (opener 지정)
    pub fn direct_with_opener(
        address: Address,
        opener: Arc<dyn ConnectionOpener>,
        config: PoolConfig,
    ) -> Self {
        Self::build(opener, config, Some(address), None)
    }

    /// 라우팅 풀이 쓰는 풀. 피드백은 `listener` 로도 전달된다.
    pub(crate) fn with_listener(
        opener: Arc<dyn ConnectionOpener>,
        config: PoolConfig,
        listener: Arc<dyn PoolListener>,
    ) -> Self {
        Self::build(opener, config, None, Some(listener))
    }

    /// 풀 설정
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// 설정된 획득 타임아웃으로 만든 마감
    pub fn acquisition_deadline(&self) -> Deadline {
        Deadline::from_timeout(self.inner.config.connection_acquisition_timeout)
    }

    /// 단일 서버 주소로 연결 획득
    pub async fn acquire_direct(
        &self,
        deadline: Deadline,
        liveness_check_timeout: Option<Duration>,
    ) -> DriverResult<PooledConnection> {
        let Some(address) = self.inner.direct_address.clone() else {
            return Err(DriverError::configuration(
                "acquire_direct requires a pool created for a single address",
            ));
        };
        self.acquire(&address, deadline, liveness_check_timeout).await
    }

    /// `address` 로 연결 획득
    ///
    /// 유휴 연결을 검사해 재사용하고, 여유가 있으면 새로 열고, 아니면
    /// 마감까지 반환을 기다린다.
    pub async fn acquire(
        &self,
        address: &Address,
        deadline: Deadline,
        liveness_check_timeout: Option<Duration>,
    ) -> DriverResult<PooledConnection> {
        loop {
            if self.inner.closed.load(Ordering::Acquire) {
                return Err(DriverError::service_unavailable("Connection pool is closed"));
            }

            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            while let Some(mut pooled) = self.take_idle(address) {
                if self
                    .is_healthy(address, &mut pooled, deadline, liveness_check_timeout)
                    .await
                {
                    return Ok(pooled);
                }
                pooled.close_and_release().await;
            }

            if let Some(reservation) = self.reserve(address) {
                return self.open_reserved(address, reservation, deadline).await;
            }

            tracing::debug!("[#0000]  _: <POOL> waiting for a connection to {}", address);
            if deadline.run(notified).await.is_none() {
                return Err(DriverError::PoolExhausted(format!(
                    "failed to obtain a connection from the pool within {:?} (timeout)",
                    deadline.original_timeout().unwrap_or_default()
                )));
            }
        }
    }

    fn take_idle(&self, address: &Address) -> Option<PooledConnection> {
        let connection = {
            let mut slots = self.inner.slots.lock();
            let slot = slots.get_mut(address)?;
            let connection = slot.idle.pop_front()?;
            slot.in_use += 1;
            connection
        };
        Some(PooledConnection::new(connection, self.inner.clone()))
    }

    async fn is_healthy(
        &self,
        address: &Address,
        pooled: &mut PooledConnection,
        deadline: Deadline,
        liveness_check_timeout: Option<Duration>,
    ) -> bool {
        let generation = self.inner.generation(address);
        if pooled.closed()
            || pooled.defunct()
            || pooled.stale()
            || Some(pooled.generation()) != generation
        {
            return false;
        }

        if let Some(timeout) = liveness_check_timeout {
            if pooled.is_idle_for(timeout) {
                tracing::debug!("[#{:04X}]  _: <POOL> liveness check", pooled.id());
                pooled.set_deadline(deadline);
                let result = pooled.reset().await;
                pooled.set_deadline(Deadline::never());
                if let Err(e) = result {
                    tracing::debug!(
                        "[#{:04X}]  _: <POOL> failed liveness check: {}",
                        pooled.id(),
                        e
                    );
                    return false;
                }
            }
        }
        true
    }

    fn reserve(&self, address: &Address) -> Option<Reservation> {
        let mut slots = self.inner.slots.lock();
        let slot = slots.entry(address.clone()).or_default();
        if let Some(max) = self.inner.config.max_size() {
            if slot.size() >= max {
                return None;
            }
        }
        slot.reservations += 1;
        Some(Reservation {
            pool: self.inner.clone(),
            address: address.clone(),
            generation: slot.generation,
            active: true,
        })
    }

    async fn open_reserved(
        &self,
        address: &Address,
        reservation: Reservation,
        deadline: Deadline,
    ) -> DriverResult<PooledConnection> {
        match self.inner.opener.open(address, deadline).await {
            Ok(mut connection) => {
                connection.set_routing(self.inner.listener.is_some());
                Ok(reservation.fulfil(connection))
            }
            Err(e) => {
                drop(reservation);
                if matches!(e, DriverError::ServiceUnavailable { .. }) {
                    self.deactivate(address).await;
                }
                Err(e)
            }
        }
    }

    /// 주소 비활성화
    ///
    /// 유휴 연결은 닫고, 사용 중인 연결은 반환될 때 버려진다.
    pub async fn deactivate(&self, address: &Address) {
        for mut connection in self.inner.detach(address) {
            connection.close().await;
        }
    }

    /// 모든 연결을 오래된 것으로 표시
    pub fn mark_all_stale(&self) {
        self.inner.mark_all_stale();
    }

    /// 주소별 사용 중인 연결 수
    pub fn in_use_connection_count(&self, address: &Address) -> usize {
        self.inner
            .slots
            .lock()
            .get(address)
            .map(|slot| slot.in_use)
            .unwrap_or(0)
    }

    /// 주소별 유휴 연결 수
    pub fn idle_count(&self, address: &Address) -> usize {
        self.inner
            .slots
            .lock()
            .get(address)
            .map(|slot| slot.idle.len())
            .unwrap_or(0)
    }

    /// 풀이 알고 있는 주소들
    pub fn addresses(&self) -> Vec<Address> {
        self.inner.slots.lock().keys().cloned().collect()
    }

    /// 풀 닫기
    ///
    /// 유휴 연결을 닫는다. 사용 중인 연결은 반환될 때 닫힌다.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let idle: Vec<Connection> = {
            let mut slots = self.inner.slots.lock();
            slots
                .values_mut()
                .flat_map(|slot| slot.idle.drain(..).collect::<Vec<_>>())
                .collect()
        };
        for mut connection in idle {
            connection.close().await;
        }
        self.inner.notify.notify_waiters();
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("direct_address", &self.inner.direct_address)
            .field("addresses", &self.addresses())
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bolt::handshake::BoltVersion;
    use crate::bolt::message::TransactionExtra;
    use crate::bolt::packstream::PackStreamMap;
    use crate::driver::bolt::stub::StubServer;
    use crate::driver::bolt::{establish, ResponseHandlers};
    use crate::driver::config::NotificationFilter;
    use std::sync::atomic::AtomicUsize;

    /// 인메모리 서버로 연결하는 opener
    #[derive(Default)]
    pub(crate) struct StubOpener {
        pub(crate) opened: AtomicUsize,
        pub(crate) refuse: AtomicBool,
        pub(crate) hang_up_after_hello: AtomicBool,
    }

    #[async_trait]
    impl ConnectionOpener for StubOpener {
        async fn open(&self, address: &Address, deadline: Deadline) -> DriverResult<Connection> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(DriverError::service_unavailable(format!(
                    "Couldn't connect to {}",
                    address
                )));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            let (client, mut server) = StubServer::pair();
            if self.hang_up_after_hello.load(Ordering::SeqCst) {
                tokio::spawn(async move {
                    server.handshake(BoltVersion::V5_0).await;
                    server.accept_hello().await;
                });
            } else {
                tokio::spawn(server.serve(BoltVersion::V5_0));
            }
            establish(
                Box::new(client),
                address.clone(),
                None,
                &ConnectionConfig::default(),
                deadline,
            )
            .await
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        deactivated: Mutex<Vec<Address>>,
        write_failures: Mutex<Vec<(Address, Option<String>)>>,
    }

    impl PoolListener for RecordingListener {
        fn on_deactivate(&self, address: &Address) {
            self.deactivated.lock().push(address.clone());
        }

        fn on_write_failure(&self, address: &Address, database: Option<&str>) {
            self.write_failures
                .lock()
                .push((address.clone(), database.map(str::to_string)));
        }
    }

    fn address() -> Address {
        Address::new("db1", 7687)
    }

    fn pool_with(max: i64) -> (ConnectionPool, Arc<StubOpener>) {
        let opener = Arc::new(StubOpener::default());
        let config = PoolConfig::builder().max_connection_pool_size(max).build();
        (
            ConnectionPool::direct_with_opener(address(), opener.clone(), config),
            opener,
        )
    }

    #[tokio::test]
    async fn test_release_and_reuse() {
        let (pool, opener) = pool_with(10);

        let conn = pool.acquire_direct(Deadline::never(), None).await.unwrap();
        let id = conn.id();
        assert_eq!(pool.in_use_connection_count(&address()), 1);
        conn.release().await;
        assert_eq!(pool.in_use_connection_count(&address()), 0);
        assert_eq!(pool.idle_count(&address()), 1);

        let conn = pool.acquire_direct(Deadline::never(), None).await.unwrap();
        assert_eq!(conn.id(), id);
        assert_eq!(opener.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let (pool, _opener) = pool_with(1);
        let first = pool.acquire_direct(Deadline::never(), None).await.unwrap();
        let first_id = first.id();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let conn = pool
                    .acquire_direct(Deadline::after(Duration::from_secs(30)), None)
                    .await
                    .unwrap();
                conn.id()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        first.release().await;
        assert_eq!(waiter.await.unwrap(), first_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_exhausted() {
        let (pool, _opener) = pool_with(1);
        let _held = pool.acquire_direct(Deadline::never(), None).await.unwrap();

        let err = pool
            .acquire_direct(Deadline::after(Duration::from_secs(1)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::PoolExhausted(_)));
        assert!(err.to_string().contains("within 1s (timeout)"));
        // 대기 실패는 카운트를 바꾸지 않는다
        assert_eq!(pool.in_use_connection_count(&address()), 1);
    }

    #[tokio::test]
    async fn test_negative_max_is_unlimited() {
        let (pool, opener) = pool_with(-1);
        let mut held = Vec::new();
        for _ in 0..5 {
            held.push(pool.acquire_direct(Deadline::never(), None).await.unwrap());
        }
        assert_eq!(pool.in_use_connection_count(&address()), 5);
        assert_eq!(opener.opened.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_deactivate_drops_idle_and_in_use() {
        let (pool, _opener) = pool_with(10);
        let a = pool.acquire_direct(Deadline::never(), None).await.unwrap();
        let b = pool.acquire_direct(Deadline::never(), None).await.unwrap();
        a.release().await;
        assert_eq!(pool.idle_count(&address()), 1);

        pool.deactivate(&address()).await;
        assert_eq!(pool.idle_count(&address()), 0);

        // 이전 세대 연결은 반환 시 버려진다
        b.release().await;
        assert_eq!(pool.idle_count(&address()), 0);
        assert_eq!(pool.in_use_connection_count(&address()), 0);
    }

    #[tokio::test]
    async fn test_mark_all_stale() {
        let (pool, opener) = pool_with(10);
        pool.acquire_direct(Deadline::never(), None)
            .await
            .unwrap()
            .release()
            .await;
        pool.mark_all_stale();

        let conn = pool.acquire_direct(Deadline::never(), None).await.unwrap();
        assert_eq!(opener.opened.load(Ordering::SeqCst), 2);
        conn.release().await;
        assert_eq!(pool.idle_count(&address()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_check_replaces_dead_connection() {
        let (pool, opener) = pool_with(10);
        opener.hang_up_after_hello.store(true, Ordering::SeqCst);
        pool.acquire_direct(Deadline::never(), None)
            .await
            .unwrap()
            .release()
            .await;
        assert_eq!(pool.idle_count(&address()), 1);

        opener.hang_up_after_hello.store(false, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(2)).await;
        let conn = pool
            .acquire_direct(Deadline::never(), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(opener.opened.load(Ordering::SeqCst), 2);
        assert!(!conn.defunct());
    }

    #[tokio::test]
    async fn test_opener_failure_releases_reservation() {
        let (pool, opener) = pool_with(1);
        opener.refuse.store(true, Ordering::SeqCst);
        let err = pool.acquire_direct(Deadline::never(), None).await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(pool.addresses().is_empty());

        // 자리가 반납되어 다시 열 수 있다
        opener.refuse.store(false, Ordering::SeqCst);
        assert!(pool.acquire_direct(Deadline::never(), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_defunct_connection_feedback() {
        let opener = Arc::new(StubOpener::default());
        opener.hang_up_after_hello.store(true, Ordering::SeqCst);
        let listener = Arc::new(RecordingListener::default());
        let pool = ConnectionPool::with_listener(opener, PoolConfig::default(), listener.clone());

        let mut conn = pool
            .acquire(&address(), Deadline::never(), None)
            .await
            .unwrap();
        conn.run(
            "RETURN 1",
            PackStreamMap::new(),
            &TransactionExtra::default(),
            &NotificationFilter::default(),
            ResponseHandlers::new(),
        )
        .unwrap();
        let err = match conn.send_all().await {
            Err(e) => e,
            Ok(()) => conn.fetch_all().await.unwrap_err(),
        };
        // 라우팅 풀의 연결은 SessionExpired
        assert!(matches!(err, DriverError::SessionExpired { .. }));
        conn.release().await;

        assert_eq!(*listener.deactivated.lock(), vec![address()]);
        assert!(pool.addresses().is_empty());
    }

    #[tokio::test]
    async fn test_drop_returns_clean_connection() {
        let (pool, _opener) = pool_with(10);
        let conn = pool.acquire_direct(Deadline::never(), None).await.unwrap();
        drop(conn);
        assert_eq!(pool.in_use_connection_count(&address()), 0);
        assert_eq!(pool.idle_count(&address()), 1);
    }

    #[tokio::test]
    async fn test_kill_and_release() {
        let (pool, _opener) = pool_with(10);
        let conn = pool.acquire_direct(Deadline::never(), None).await.unwrap();
        conn.kill_and_release();
        assert_eq!(pool.in_use_connection_count(&address()), 0);
        assert_eq!(pool.idle_count(&address()), 0);
    }

    #[tokio::test]
    async fn test_closed_pool() {
        let (pool, _opener) = pool_with(10);
        pool.acquire_direct(Deadline::never(), None)
            .await
            .unwrap()
            .release()
            .await;
        pool.close().await;
        assert_eq!(pool.idle_count(&address()), 0);
        assert!(pool.acquire_direct(Deadline::never(), None).await.is_err());
    }
}
