//! TLS
//!
//! TLS 신뢰 전략 및 소켓 래핑 (rustls)

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use super::address::Address;
use super::error::{DriverError, DriverResult};

// ============================================================================
// TrustStrategy - TLS 신뢰 전략
// ============================================================================

/// TLS 신뢰 전략
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TrustStrategy {
    /// 시스템 인증서 (`webpki-roots` 번들)
    #[default]
    SystemCas,
    /// 지정한 PEM 파일의 인증서만 신뢰
    CustomCas(Vec<PathBuf>),
    /// 모든 인증서 신뢰 (개발용)
    All,
}

// ============================================================================
// TlsConfig - TLS 설정
// ============================================================================

/// TLS 설정
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// 신뢰 전략
    pub trust: TrustStrategy,
    /// SNI/검증에 사용할 서버 이름 (없으면 주소의 호스트)
    pub server_name_override: Option<String>,
}

impl TlsConfig {
    /// 신뢰 전략으로 생성
    pub fn new(trust: TrustStrategy) -> Self {
        Self {
            trust,
            server_name_override: None,
        }
    }

    /// 서버 이름 지정
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name_override = Some(name.into());
        self
    }

    /// rustls 클라이언트 설정 생성
    pub fn client_config(&self) -> DriverResult<Arc<ClientConfig>> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| DriverError::security("Failed to configure TLS", e))?;

        let config = match &self.trust {
            TrustStrategy::SystemCas => {
                let mut roots = RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                builder.with_root_certificates(roots).with_no_client_auth()
            }
            TrustStrategy::CustomCas(paths) => {
                let mut roots = RootCertStore::empty();
                for path in paths {
                    for cert in load_certs(path)? {
                        roots.add(cert).map_err(|e| {
                            DriverError::security(
                                format!("Invalid certificate in {}", path.display()),
                                e,
                            )
                        })?;
                    }
                }
                builder.with_root_certificates(roots).with_no_client_auth()
            }
            TrustStrategy::All => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate {
                    algorithms: provider.signature_verification_algorithms,
                }))
                .with_no_client_auth(),
        };

        Ok(Arc::new(config))
    }

    /// 주소에 대한 서버 이름
    pub fn server_name(&self, address: &Address) -> DriverResult<ServerName<'static>> {
        let name = self
            .server_name_override
            .clone()
            .unwrap_or_else(|| address.host.clone());
        ServerName::try_from(name.clone())
            .map_err(|e| DriverError::security(format!("Invalid TLS server name {:?}", name), e))
    }

    /// TCP 소켓에 TLS 적용
    pub async fn wrap(&self, address: &Address, stream: TcpStream) -> DriverResult<TlsStream<TcpStream>> {
        let connector = TlsConnector::from(self.client_config()?);
        let server_name = self.server_name(address)?;
        connector.connect(server_name, stream).await.map_err(|e| {
            DriverError::security(
                format!("Failed to establish encrypted connection to {}", address),
                e,
            )
        })
    }
}

fn load_certs(path: &Path) -> DriverResult<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| {
        DriverError::security(
            format!("Failed to open certificate file {}", path.display()),
            e,
        )
    })?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            DriverError::security(
                format!("Failed to parse certificate file {}", path.display()),
                e,
            )
        })?;

    if certs.is_empty() {
        return Err(DriverError::Security {
            message: format!("No certificates found in {}", path.display()),
            source: None,
        });
    }
    Ok(certs)
}

// ============================================================================
// AcceptAnyCertificate - 검증 생략
// ============================================================================

/// 인증서를 검증하지 않는 verifier (`TrustStrategy::All`)
///
/// 핸드셰이크 서명은 그대로 검증한다.
#[derive(Debug)]
struct AcceptAnyCertificate {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

// ============================================================================
// Tests
// ============================================================================
