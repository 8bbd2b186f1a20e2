//! Server Address
//!
//! 서버 주소 및 주소 해석 (DNS, 사용자 정의 리졸버)

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::{DriverError, DriverResult};

/// 기본 Bolt 포트
pub const DEFAULT_PORT: u16 = 7687;

// ============================================================================
// Address - 서버 주소
// ============================================================================

/// 서버 주소
///
/// IPv6 호스트는 대괄호 없이 저장하고 표시할 때 `[::1]:7687` 형태로 감싼다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
}

impl Address {
    /// 새 서버 주소 생성
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let host = match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            Some(inner) => inner.to_string(),
            None => host,
        };
        Self { host, port }
    }

    /// `host:port` 문자열 파싱
    ///
    /// 포트가 없으면 `default_port` 를 사용한다. `[::1]:7687`, `[::1]`, `::1`
    /// 형태의 IPv6 도 허용한다.
    pub fn parse(s: &str, default_port: u16) -> DriverResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DriverError::configuration("Empty server address"));
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| {
                DriverError::configuration(format!("Invalid server address: {}", s))
            })?;
            let port = match tail {
                "" => default_port,
                t => match t.strip_prefix(':') {
                    Some(p) => parse_port(p, s)?,
                    None => {
                        return Err(DriverError::configuration(format!(
                            "Invalid server address: {}",
                            s
                        )))
                    }
                },
            };
            return Ok(Self::new(host, port));
        }

        match s.matches(':').count() {
            0 => Ok(Self::new(s, default_port)),
            1 => {
                let (host, port) = s.split_once(':').unwrap_or((s, ""));
                if host.is_empty() {
                    return Err(DriverError::configuration(format!(
                        "Invalid server address: {}",
                        s
                    )));
                }
                Ok(Self::new(host, parse_port(port, s)?))
            }
            // 대괄호 없는 IPv6
            _ => Ok(Self::new(s, default_port)),
        }
    }

    /// IPv6 호스트 여부
    pub fn is_ipv6(&self) -> bool {
        self.host.contains(':')
    }
}

fn parse_port(port: &str, original: &str) -> DriverResult<u16> {
    port.parse()
        .map_err(|_| DriverError::configuration(format!("Invalid port in address: {}", original)))
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ipv6() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

// ============================================================================
// Resolver - 주소 해석
// ============================================================================

/// 주소 해석기
///
/// 하나의 주소를 실제 접속 가능한 소켓 주소 목록으로 바꾼다.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// 주소 해석
    async fn resolve(&self, address: &Address) -> DriverResult<Vec<SocketAddr>>;

    /// DNS 조회 없이 주소를 접속 후보 주소들로 펼침 (기본값: 주소 그대로)
    fn expand(&self, address: &Address) -> Vec<Address> {
        vec![address.clone()]
    }
}

/// DNS 리졸버 (`tokio::net::lookup_host`)
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(&self, address: &Address) -> DriverResult<Vec<SocketAddr>> {
        let resolved = tokio::net::lookup_host((address.host.as_str(), address.port))
            .await
            .map_err(|e| {
                DriverError::service_unavailable_from(
                    format!("Failed to DNS resolve address {}", address),
                    e,
                )
            })?;
        Ok(resolved.collect())
    }
}

/// 사용자 정의 주소 매핑 함수
pub type ResolverFn = dyn Fn(&Address) -> Vec<Address> + Send + Sync;

/// 사용자 정의 리졸버
///
/// 사용자 함수로 주소를 여러 주소로 펼친 뒤 각각을 DNS 로 해석한다.
#[derive(Clone)]
pub struct CustomResolver {
    mapping: Arc<ResolverFn>,
    dns: DnsResolver,
}

impl CustomResolver {
    /// 새 사용자 정의 리졸버 생성
    pub fn new<F>(mapping: F) -> Self
    where
        F: Fn(&Address) -> Vec<Address> + Send + Sync + 'static,
    {
        Self {
            mapping: Arc::new(mapping),
            dns: DnsResolver,
        }
    }

}

impl fmt::Debug for CustomResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomResolver").finish_non_exhaustive()
    }
}

#[async_trait]
impl Resolver for CustomResolver {
    fn expand(&self, address: &Address) -> Vec<Address> {
        let mut expanded: Vec<Address> = Vec::new();
        for candidate in (self.mapping)(address) {
            if !expanded.contains(&candidate) {
                expanded.push(candidate);
            }
        }
        expanded
    }

    async fn resolve(&self, address: &Address) -> DriverResult<Vec<SocketAddr>> {
        let mut resolved = Vec::new();
        let mut first_error = None;
        for expanded in self.expand(address) {
            match self.dns.resolve(&expanded).await {
                Ok(addrs) => {
                    for addr in addrs {
                        if !resolved.contains(&addr) {
                            resolved.push(addr);
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!("[#0000]  _: <RESOLVE> failed to resolve {}: {}", expanded, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match (resolved.is_empty(), first_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(resolved),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_address_parse() {
        let addr = Address::parse("example.com:7688", DEFAULT_PORT).unwrap();
        assert_eq!(addr.host, "example.com");
        assert_eq!(addr.port, 7688);

        let addr = Address::parse("example.com", DEFAULT_PORT).unwrap();
        assert_eq!(addr.port, 7687);
    }

    #[test]
    fn test_address_parse_ipv6() {
        let addr = Address::parse("[::1]:9000", DEFAULT_PORT).unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.port, 9000);
        assert_eq!(addr.to_string(), "[::1]:9000");

        let addr = Address::parse("[fe80::1]", DEFAULT_PORT).unwrap();
        assert_eq!(addr.port, 7687);

        let addr = Address::parse("::1", DEFAULT_PORT).unwrap();
        assert_eq!(addr.to_string(), "[::1]:7687");
    }

    #[test]
    fn test_address_parse_invalid() {
        assert!(Address::parse("", DEFAULT_PORT).is_err());
        assert!(Address::parse("host:notaport", DEFAULT_PORT).is_err());
        assert!(Address::parse("[::1", DEFAULT_PORT).is_err());
        assert!(Address::parse("[::1]x", DEFAULT_PORT).is_err());
        assert!(Address::parse(":7687", DEFAULT_PORT).is_err());
    }

    #[test]
    fn test_address_new_strips_brackets() {
        assert_eq!(Address::new("[::1]", 1), Address::new("::1", 1));
    }

    #[test]
    fn test_address_from_socket_addr() {
        let v4 = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 7687);
        assert_eq!(Address::from(v4).to_string(), "127.0.0.1:7687");

        let v6 = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 7687);
        assert_eq!(Address::from(v6).to_string(), "[::1]:7687");
    }

    #[tokio::test]
    async fn test_dns_resolver_ip_literal() {
        let resolved = DnsResolver
            .resolve(&Address::new("127.0.0.1", 7687))
            .await
            .unwrap();
        assert_eq!(resolved, vec!["127.0.0.1:7687".parse().unwrap()]);
    }

    #[test]
    fn test_expand_keeps_host_names() {
        let address = Address::new("seed", 7687);
        assert_eq!(DnsResolver.expand(&address), vec![address.clone()]);

        let resolver = CustomResolver::new(|addr: &Address| {
            vec![
                Address::new("s1", addr.port),
                Address::new("s2", addr.port),
                Address::new("s1", addr.port),
            ]
        });
        assert_eq!(
            resolver.expand(&address),
            vec![Address::new("s1", 7687), Address::new("s2", 7687)]
        );
    }

    #[tokio::test]
    async fn test_custom_resolver_expands() {
        let resolver = CustomResolver::new(|addr: &Address| {
            vec![
                Address::new("127.0.0.1", addr.port),
                Address::new("127.0.0.2", addr.port),
                Address::new("127.0.0.1", addr.port),
            ]
        });
        let resolved = resolver
            .resolve(&Address::new("cluster.local", 7000))
            .await
            .unwrap();
        let expected: Vec<SocketAddr> = vec![
            "127.0.0.1:7000".parse().unwrap(),
            "127.0.0.2:7000".parse().unwrap(),
        ];
        assert_eq!(resolved, expected);
    }
}
