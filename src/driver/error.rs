//! Driver Error Types
//!
//! 드라이버 에러 정의

use std::io;

use thiserror::Error;

use crate::bolt::message::FailureMessage;
use crate::bolt::BoltError;

/// 원인 에러 (source chain)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ============================================================================
// DriverError - 드라이버 에러
// ============================================================================

/// 드라이버 에러
#[derive(Error, Debug)]
pub enum DriverError {
    /// 서비스 불가 (연결 불가, 연결 끊김)
    #[error("{message}")]
    ServiceUnavailable {
        /// 메시지
        message: String,
        /// 원인
        #[source]
        source: Option<BoxError>,
    },

    /// 세션 만료 (라우팅 대상 서버를 더 이상 사용할 수 없음)
    #[error("{message}")]
    SessionExpired {
        /// 메시지
        message: String,
        /// 원인
        #[source]
        source: Option<BoxError>,
    },

    /// TLS/인증서 에러
    #[error("Security error: {message}")]
    Security {
        /// 메시지
        message: String,
        /// 원인
        #[source]
        source: Option<BoxError>,
    },

    /// 프로토콜 에러
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 인증 에러
    #[error("Authentication error: {0}")]
    Authentication(ServerError),

    /// 커밋 결과를 알 수 없음
    #[error("{message}")]
    IncompleteCommit {
        /// 메시지
        message: String,
        /// 원인
        #[source]
        source: Option<BoxError>,
    },

    /// 서버 에러
    #[error(transparent)]
    Server(#[from] ServerError),

    /// 라우팅 에러
    #[error("Routing error: {0}")]
    Routing(String),

    /// 풀 고갈 (클라이언트 에러)
    #[error("Pool exhausted: {0}")]
    PoolExhausted(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O 에러
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DriverError {
    /// 서비스 불가 에러 생성
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: msg.into(),
            source: None,
        }
    }

    /// 원인을 포함한 서비스 불가 에러 생성
    pub fn service_unavailable_from(msg: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::ServiceUnavailable {
            message: msg.into(),
            source: Some(source.into()),
        }
    }

    /// 세션 만료 에러 생성
    pub fn session_expired(msg: impl Into<String>) -> Self {
        Self::SessionExpired {
            message: msg.into(),
            source: None,
        }
    }

    /// 보안 에러 생성
    pub fn security(msg: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Security {
            message: msg.into(),
            source: Some(source.into()),
        }
    }

    /// 프로토콜 에러 생성
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// 라우팅 에러 생성
    pub fn routing(msg: impl Into<String>) -> Self {
        Self::Routing(msg.into())
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 서버 FAILURE 를 에러로 변환
    ///
    /// 인증 코드는 [`DriverError::Authentication`] 이 된다.
    pub fn from_server(err: ServerError) -> Self {
        match err.kind {
            ServerErrorKind::Auth | ServerErrorKind::TokenExpired => Self::Authentication(err),
            _ => Self::Server(err),
        }
    }

    /// 서버 에러 (인증 에러 포함)
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Self::Server(e) | Self::Authentication(e) => Some(e),
            _ => None,
        }
    }

    /// 재시도 가능 여부
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServiceUnavailable { .. } | Self::SessionExpired { .. } => true,
            Self::Server(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// 연결/서버를 사용할 수 없음을 나타내는 에러 여부
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable { .. } | Self::SessionExpired { .. }
        )
    }
}

/// Wire 레벨 에러 변환
impl From<BoltError> for DriverError {
    fn from(err: BoltError) -> Self {
        match err {
            BoltError::Io(e) => Self::service_unavailable_from("Connection I/O failed", e),
            BoltError::ConnectionClosed => Self::service_unavailable("Connection closed"),
            other => Self::Protocol(other.to_string()),
        }
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// 드라이버 결과 타입
pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// ServerError - 서버 에러 분류
// ============================================================================

/// 코드가 없거나 해석할 수 없을 때 사용하는 코드
pub const UNKNOWN_ERROR_CODE: &str = "Neo.DatabaseError.General.UnknownError";

/// 메시지가 없을 때 사용하는 메시지
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred";

/// 에러 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// 호출자 책임, 재시도하지 않음
    Client,
    /// 재시도 가능
    Transient,
    /// 데이터베이스 에러
    Database,
    /// 알 수 없는 분류
    Unknown,
}

impl ErrorClassification {
    fn parse(s: &str) -> Self {
        match s {
            "ClientError" => Self::Client,
            "TransientError" => Self::Transient,
            "DatabaseError" => Self::Database,
            _ => Self::Unknown,
        }
    }
}

/// 서버 에러 종류 (정적 코드 테이블)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorKind {
    /// 제약 조건 위반
    Constraint,
    /// 쿼리 문법 에러
    CypherSyntax,
    /// 쿼리 타입 에러
    CypherType,
    /// 권한 없음
    Forbidden,
    /// 읽기 전용 데이터베이스에 쓰기 시도
    ForbiddenOnReadOnlyDatabase,
    /// 리더가 아닌 서버에 쓰기 시도
    NotALeader,
    /// 인증 실패
    Auth,
    /// 토큰 만료
    TokenExpired,
    /// 인가 만료 (재인증 필요)
    AuthorizationExpired,
    /// 데이터베이스 사용 불가
    DatabaseUnavailable,
    /// 그 외 ClientError
    Client,
    /// 그 외 TransientError
    Transient,
    /// DatabaseError
    Database,
    /// 분류 불가
    Unknown,
}

impl ServerErrorKind {
    /// 코드와 분류로 종류 결정
    fn lookup(classification: ErrorClassification, code: &str) -> Self {
        match classification {
            ErrorClassification::Client => match code {
                "Neo.ClientError.Schema.ConstraintValidationFailed"
                | "Neo.ClientError.Schema.ConstraintViolation"
                | "Neo.ClientError.Statement.ConstraintVerificationFailed"
                | "Neo.ClientError.Statement.ConstraintViolation" => Self::Constraint,
                "Neo.ClientError.Statement.InvalidSyntax"
                | "Neo.ClientError.Statement.SyntaxError" => Self::CypherSyntax,
                "Neo.ClientError.Procedure.TypeError"
                | "Neo.ClientError.Statement.InvalidType"
                | "Neo.ClientError.Statement.TypeError" => Self::CypherType,
                "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase" => {
                    Self::ForbiddenOnReadOnlyDatabase
                }
                "Neo.ClientError.General.ReadOnly"
                | "Neo.ClientError.Schema.ForbiddenOnConstraintIndex"
                | "Neo.ClientError.Schema.IndexBelongsToConstraint"
                | "Neo.ClientError.Security.Forbidden"
                | "Neo.ClientError.Transaction.ForbiddenDueToTransactionType" => Self::Forbidden,
                "Neo.ClientError.Security.AuthorizationFailed"
                | "Neo.ClientError.Security.Unauthorized" => Self::Auth,
                "Neo.ClientError.Security.TokenExpired" => Self::TokenExpired,
                "Neo.ClientError.Cluster.NotALeader" => Self::NotALeader,
                _ => Self::Client,
            },
            ErrorClassification::Transient => match code {
                "Neo.TransientError.General.DatabaseUnavailable" => Self::DatabaseUnavailable,
                "Neo.ClientError.Security.AuthorizationExpired" => Self::AuthorizationExpired,
                _ => Self::Transient,
            },
            ErrorClassification::Database => Self::Database,
            ErrorClassification::Unknown => Self::Unknown,
        }
    }

    /// 재시도 가능한 종류인지 여부
    ///
    /// NotALeader 와 ForbiddenOnReadOnlyDatabase 는 라우팅 갱신 후 재시도한다.
    fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Transient
                | Self::DatabaseUnavailable
                | Self::AuthorizationExpired
                | Self::NotALeader
                | Self::ForbiddenOnReadOnlyDatabase
        )
    }
}

/// 서버 FAILURE 에서 만든 에러
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{{code: {code}}} {{message: {message}}}")]
pub struct ServerError {
    /// 에러 코드 (재작성 후)
    pub code: String,
    /// 에러 메시지
    pub message: String,
    /// 분류
    pub classification: ErrorClassification,
    /// 카테고리
    pub category: String,
    /// 제목
    pub title: String,
    /// 종류
    pub kind: ServerErrorKind,
}

impl ServerError {
    /// 코드와 메시지로 에러 생성 (없으면 기본값)
    pub fn new(code: Option<&str>, message: Option<&str>) -> Self {
        let mut code = code.unwrap_or(UNKNOWN_ERROR_CODE).to_string();
        let message = message.unwrap_or(UNKNOWN_ERROR_MESSAGE).to_string();

        let parts: Vec<&str> = code.split('.').collect();
        let (classification, category, title) = if parts.len() == 4 {
            let mut classification = ErrorClassification::parse(parts[1]);
            let category = parts[2].to_string();
            let title = parts[3].to_string();
            match code.as_str() {
                "Neo.ClientError.Security.AuthorizationExpired" => {
                    classification = ErrorClassification::Transient;
                }
                "Neo.TransientError.Transaction.Terminated"
                | "Neo.TransientError.Transaction.LockClientStopped" => {
                    classification = ErrorClassification::Client;
                    code = code.replacen("TransientError", "ClientError", 1);
                }
                _ => {}
            }
            (classification, category, title)
        } else {
            (
                ErrorClassification::Database,
                "General".to_string(),
                "UnknownError".to_string(),
            )
        };

        let kind = ServerErrorKind::lookup(classification, &code);
        Self {
            code,
            message,
            classification,
            category,
            title,
            kind,
        }
    }

    /// FAILURE 메시지에서 생성
    pub fn from_failure(failure: &FailureMessage) -> Self {
        Self::new(failure.code(), failure.message())
    }

    /// 재시도 가능 여부
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// 모든 연결의 인증을 무효화해야 하는지 여부
    pub fn invalidates_all_connections(&self) -> bool {
        self.code == "Neo.ClientError.Security.AuthorizationExpired"
    }

    /// 라우팅 탐색 중 즉시 실패해야 하는 에러인지 여부
    pub fn is_fatal_during_discovery(&self) -> bool {
        match self.code.as_str() {
            "Neo.ClientError.Database.DatabaseNotFound"
            | "Neo.ClientError.Transaction.InvalidBookmark"
            | "Neo.ClientError.Transaction.InvalidBookmarkMixture"
            | "Neo.ClientError.Statement.TypeError"
            | "Neo.ClientError.Statement.ArgumentError"
            | "Neo.ClientError.Request.Invalid" => true,
            code => self.has_security_code() && code != "Neo.ClientError.Security.AuthorizationExpired",
        }
    }

    /// 보안 관련 코드 여부
    pub fn has_security_code(&self) -> bool {
        self.code.starts_with("Neo.ClientError.Security.")
    }
}

// ============================================================================
// Tests
// ============================================================================
