//! Driver Configuration
//!
//! 연결 및 연결 풀 설정, 인증 토큰, 알림 필터

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;

use super::address::{Address, DnsResolver, Resolver};
use super::tls::TlsConfig;
use crate::bolt::message::metadata::{NotificationCategory, NotificationMinimumSeverity};
use crate::bolt::message::REDACTED;
use crate::bolt::packstream::{PackStreamMap, PackStreamValue};

/// 기본 User Agent
pub fn default_user_agent() -> String {
    format!("bolt-driver-core/{}", env!("CARGO_PKG_VERSION"))
}

// ============================================================================
// AuthToken - 인증 토큰
// ============================================================================

/// 인증 토큰
///
/// HELLO(5.1 미만) 또는 LOGON 으로 전송되는 인증 맵의 내용이다.
#[derive(Clone, PartialEq)]
pub struct AuthToken {
    /// 인증 스킴 (`basic`, `bearer`, `kerberos`, `none`, ...)
    pub scheme: String,
    /// 인증 주체
    pub principal: Option<String>,
    /// 자격 증명
    pub credentials: Option<String>,
    /// 인증 제공자
    pub realm: Option<String>,
    /// 추가 파라미터
    pub parameters: PackStreamMap,
}

impl AuthToken {
    /// Basic 인증 토큰 생성 (사용자명/비밀번호)
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::custom("basic", Some(username.into()), Some(password.into()), None)
    }

    /// Basic 인증 토큰 생성 (realm 포함)
    pub fn basic_with_realm(
        username: impl Into<String>,
        password: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self::custom(
            "basic",
            Some(username.into()),
            Some(password.into()),
            Some(realm.into()),
        )
    }

    /// Bearer 토큰 생성
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::custom("bearer", None, Some(token.into()), None)
    }

    /// Kerberos 토큰 생성 (base64 티켓)
    pub fn kerberos(ticket: impl Into<String>) -> Self {
        // 4.4 이전 서버는 principal 필드가 항상 있어야 한다
        Self::custom("kerberos", Some(String::new()), Some(ticket.into()), None)
    }

    /// 인증 없음
    pub fn none() -> Self {
        Self::custom("none", None, None, None)
    }

    /// 커스텀 인증 토큰 생성
    pub fn custom(
        scheme: impl Into<String>,
        principal: Option<String>,
        credentials: Option<String>,
        realm: Option<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            principal,
            credentials,
            realm,
            parameters: PackStreamMap::new(),
        }
    }

    /// 추가 파라미터 설정
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<PackStreamValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// 인증 맵 생성
    ///
    /// principal 은 빈 문자열이어도 포함하고, 나머지는 값이 있을 때만 포함한다.
    pub fn to_map(&self) -> PackStreamMap {
        let mut map = PackStreamMap::new();
        map.insert("scheme".to_string(), self.scheme.as_str().into());
        if let Some(ref principal) = self.principal {
            map.insert("principal".to_string(), principal.as_str().into());
        }
        if let Some(ref credentials) = self.credentials {
            if !credentials.is_empty() {
                map.insert("credentials".to_string(), credentials.as_str().into());
            }
        }
        if let Some(ref realm) = self.realm {
            if !realm.is_empty() {
                map.insert("realm".to_string(), realm.as_str().into());
            }
        }
        if !self.parameters.is_empty() {
            map.insert(
                "parameters".to_string(),
                PackStreamValue::Map(self.parameters.clone()),
            );
        }
        map
    }
}

impl Default for AuthToken {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("scheme", &self.scheme)
            .field("principal", &self.principal)
            .field("credentials", &self.credentials.as_ref().map(|_| REDACTED))
            .field("realm", &self.realm)
            .field("parameters", &self.parameters)
            .finish()
    }
}

// ============================================================================
// NotificationFilter - 알림 필터
// ============================================================================

/// 알림 필터 (Bolt 5.2+)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationFilter {
    /// 최소 심각도
    pub minimum_severity: Option<NotificationMinimumSeverity>,
    /// 비활성화할 카테고리
    pub disabled_categories: Option<Vec<NotificationCategory>>,
}

impl NotificationFilter {
    /// 필터 지정 여부
    pub fn is_set(&self) -> bool {
        self.minimum_severity.is_some() || self.disabled_categories.is_some()
    }

    /// HELLO/BEGIN/RUN extra 맵에 필터 항목 추가
    pub fn apply(&self, extra: &mut PackStreamMap) {
        if let Some(severity) = self.minimum_severity {
            extra.insert(
                "notifications_minimum_severity".to_string(),
                severity.as_str().into(),
            );
        }
        if let Some(ref categories) = self.disabled_categories {
            let list = categories
                .iter()
                .map(|c| PackStreamValue::from(c.as_str()))
                .collect::<Vec<_>>();
            extra.insert(
                "notifications_disabled_categories".to_string(),
                PackStreamValue::List(list),
            );
        }
    }
}

// ============================================================================
// ConnectionConfig - 연결 설정
// ============================================================================

/// 단일 연결을 여는 데 필요한 설정
#[derive(Clone)]
pub struct ConnectionConfig {
    /// User Agent
    pub user_agent: String,
    /// 인증 토큰
    pub auth: AuthToken,
    /// 라우팅 컨텍스트 (라우팅 드라이버일 때만)
    pub routing_context: Option<IndexMap<String, String>>,
    /// 알림 필터
    pub notification_filter: NotificationFilter,
    /// TLS 설정 (없으면 평문)
    pub tls: Option<TlsConfig>,
    /// 주소 해석기
    pub resolver: Arc<dyn Resolver>,
    /// TCP 연결 타임아웃
    pub connection_timeout: Duration,
    /// 연결 최대 수명 (`None` 이면 제한 없음)
    pub max_connection_lifetime: Option<Duration>,
    /// TCP Keep-Alive
    pub keep_alive: bool,
}

impl ConnectionConfig {
    /// 라우팅 컨텍스트를 PackStream 맵으로 변환
    pub fn routing_context_map(&self) -> Option<PackStreamMap> {
        self.routing_context.as_ref().map(|ctx| {
            ctx.iter()
                .map(|(k, v)| (k.clone(), PackStreamValue::from(v.as_str())))
                .collect()
        })
    }

    /// 초기 라우터 주소가 담긴 라우팅 컨텍스트 생성
    pub fn routing_context_for(address: &Address) -> IndexMap<String, String> {
        let mut ctx = IndexMap::new();
        ctx.insert("address".to_string(), address.to_string());
        ctx
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            auth: AuthToken::default(),
            routing_context: None,
            notification_filter: NotificationFilter::default(),
            tls: None,
            resolver: Arc::new(DnsResolver),
            connection_timeout: Duration::from_secs(30),
            max_connection_lifetime: Some(Duration::from_secs(3600)),
            keep_alive: true,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("user_agent", &self.user_agent)
            .field("auth", &self.auth)
            .field("routing_context", &self.routing_context)
            .field("notification_filter", &self.notification_filter)
            .field("tls", &self.tls)
            .field("connection_timeout", &self.connection_timeout)
            .field("max_connection_lifetime", &self.max_connection_lifetime)
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PoolConfig - 풀 설정
// ============================================================================

/// 연결 풀 설정
///
/// # 필드
///
/// | 필드 | 기본값 | 설명 |
/// |------|--------|------|
/// | `max_connection_pool_size` | 100 | 주소당 최대 연결 수 (음수면 무제한) |
/// | `connection_acquisition_timeout` | 60초 | 연결 획득 타임아웃 |
/// | `liveness_check_timeout` | 없음 | 이 시간 이상 유휴한 연결은 RESET 으로 확인 |
/// | `connection.connection_timeout` | 30초 | TCP 연결 타임아웃 |
/// | `connection.max_connection_lifetime` | 1시간 | 연결 최대 수명 |
///
/// # 예시
///
/// ```rust,ignore
/// use bolt_driver_core::driver::{AuthToken, PoolConfig};
/// use std::time::Duration;
///
/// let config = PoolConfig::builder()
///     .max_connection_pool_size(50)
///     .connection_acquisition_timeout(Duration::from_secs(10))
///     .auth(AuthToken::basic("neo4j", "password"))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 주소당 최대 연결 수
    pub max_connection_pool_size: i64,
    /// 연결 획득 타임아웃 (`None` 이면 무한 대기)
    pub connection_acquisition_timeout: Option<Duration>,
    /// 유휴 연결 확인 기준 시간
    pub liveness_check_timeout: Option<Duration>,
    /// 연결 설정
    pub connection: ConnectionConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connection_pool_size: 100,
            connection_acquisition_timeout: Some(Duration::from_secs(60)),
            liveness_check_timeout: None,
            connection: ConnectionConfig::default(),
        }
    }
}

impl PoolConfig {
    /// 빌더 패턴으로 풀 설정 생성
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// 최대 연결 수 제한 여부와 값
    pub fn max_size(&self) -> Option<usize> {
        usize::try_from(self.max_connection_pool_size).ok()
    }
}

/// 풀 설정 빌더
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// 최대 연결 수 설정 (음수면 무제한)
    pub fn max_connection_pool_size(mut self, size: i64) -> Self {
        self.config.max_connection_pool_size = size;
        self
    }

    /// 연결 획득 타임아웃 설정
    pub fn connection_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_acquisition_timeout = Some(timeout);
        self
    }

    /// 유휴 연결 확인 기준 시간 설정
    pub fn liveness_check_timeout(mut self, timeout: Duration) -> Self {
        self.config.liveness_check_timeout = Some(timeout);
        self
    }

    /// TCP 연결 타임아웃 설정
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection.connection_timeout = timeout;
        self
    }

    /// 연결 최대 수명 설정 (`None` 이면 제한 없음)
    pub fn max_connection_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.config.connection.max_connection_lifetime = lifetime;
        self
    }

    /// User Agent 설정
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.connection.user_agent = user_agent.into();
        self
    }

    /// 인증 토큰 설정
    pub fn auth(mut self, auth: AuthToken) -> Self {
        self.config.connection.auth = auth;
        self
    }

    /// 라우팅 컨텍스트 설정
    pub fn routing_context(mut self, context: IndexMap<String, String>) -> Self {
        self.config.connection.routing_context = Some(context);
        self
    }

    /// 알림 필터 설정
    pub fn notification_filter(mut self, filter: NotificationFilter) -> Self {
        self.config.connection.notification_filter = filter;
        self
    }

    /// TLS 설정
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.config.connection.tls = Some(tls);
        self
    }

    /// 주소 해석기 설정
    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.config.connection.resolver = resolver;
        self
    }

    /// Keep-Alive 설정
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.config.connection.keep_alive = keep_alive;
        self
    }

    /// 설정 빌드
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connection_pool_size, 100);
        assert_eq!(config.max_size(), Some(100));
        assert_eq!(
            config.connection_acquisition_timeout,
            Some(Duration::from_secs(60))
        );
        assert_eq!(config.liveness_check_timeout, None);
        assert_eq!(config.connection.connection_timeout, Duration::from_secs(30));
        assert_eq!(
            config.connection.max_connection_lifetime,
            Some(Duration::from_secs(3600))
        );
        assert!(config.connection.keep_alive);
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::builder()
            .max_connection_pool_size(-1)
            .connection_acquisition_timeout(Duration::from_secs(5))
            .liveness_check_timeout(Duration::from_secs(1))
            .connection_timeout(Duration::from_secs(2))
            .max_connection_lifetime(None)
            .user_agent("test/1.0")
            .keep_alive(false)
            .build();

        assert_eq!(config.max_size(), None);
        assert_eq!(config.liveness_check_timeout, Some(Duration::from_secs(1)));
        assert_eq!(config.connection.user_agent, "test/1.0");
        assert_eq!(config.connection.max_connection_lifetime, None);
        assert!(!config.connection.keep_alive);
    }

    #[test]
    fn test_auth_token_basic_map() {
        let map = AuthToken::basic("neo4j", "secret").to_map();
        assert_eq!(
            map.keys().collect::<Vec<_>>(),
            vec!["scheme", "principal", "credentials"]
        );
        assert_eq!(map["credentials"].as_str(), Some("secret"));
    }

    #[test]
    fn test_auth_token_variants() {
        let none = AuthToken::none().to_map();
        assert_eq!(none.len(), 1);
        assert_eq!(none["scheme"].as_str(), Some("none"));

        let bearer = AuthToken::bearer("token").to_map();
        assert!(!bearer.contains_key("principal"));

        let kerberos = AuthToken::kerberos("dGlja2V0").to_map();
        assert_eq!(kerberos["principal"].as_str(), Some(""));

        let custom = AuthToken::custom("sso", Some("u".into()), Some("c".into()), Some("r".into()))
            .with_parameter("tenant", "t1")
            .to_map();
        assert_eq!(custom["realm"].as_str(), Some("r"));
        assert_eq!(
            custom["parameters"].as_map().unwrap()["tenant"].as_str(),
            Some("t1")
        );
    }

    #[test]
    fn test_auth_token_debug_redacts() {
        let debug = format!("{:?}", AuthToken::basic("neo4j", "hunter2"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains(REDACTED));
    }

    #[test]
    fn test_notification_filter_apply() {
        let filter = NotificationFilter {
            minimum_severity: Some(NotificationMinimumSeverity::Warning),
            disabled_categories: Some(vec![NotificationCategory::Hint]),
        };
        assert!(filter.is_set());

        let mut extra = PackStreamMap::new();
        filter.apply(&mut extra);
        assert_eq!(
            extra["notifications_minimum_severity"].as_str(),
            Some("WARNING")
        );
        assert_eq!(
            extra["notifications_disabled_categories"],
            PackStreamValue::List(vec!["HINT".into()])
        );

        assert!(!NotificationFilter::default().is_set());
    }

    #[test]
    fn test_routing_context_map() {
        let mut config = ConnectionConfig::default();
        assert!(config.routing_context_map().is_none());

        config.routing_context = Some(ConnectionConfig::routing_context_for(&Address::new(
            "router", 7687,
        )));
        let map = config.routing_context_map().unwrap();
        assert_eq!(map["address"].as_str(), Some("router:7687"));
    }
}
