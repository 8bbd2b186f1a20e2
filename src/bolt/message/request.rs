//! Bolt protocol request messages.
//!
//! Request messages are sent from the client to the server. Version
//! differences are decided by the caller; these types only lay out fields.

use std::fmt;
use std::time::Duration;

use super::tag;
use crate::bolt::packstream::{PackStreamMap, PackStreamStructure, PackStreamValue};

/// Placeholder written instead of credentials in logs.
pub const REDACTED: &str = "*******";

/// Access mode for transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    /// Read-write access (default)
    #[default]
    Write,
    /// Read-only access
    Read,
}

impl AccessMode {
    /// Convert to string for metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "r",
            AccessMode::Write => "w",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => write!(f, "READ"),
            AccessMode::Write => write!(f, "WRITE"),
        }
    }
}

/// Convert a transaction timeout to whole milliseconds.
///
/// Rounds half to even. A non-zero timeout never becomes 0, since 0 would
/// mean "no timeout" to the server.
pub fn tx_timeout_as_ms(timeout: Duration) -> i64 {
    let nanos = timeout.as_nanos();
    let mut ms = nanos / 1_000_000;
    let rem = nanos % 1_000_000;
    if rem > 500_000 || (rem == 500_000 && ms % 2 == 1) {
        ms += 1;
    }
    if ms == 0 && nanos > 0 {
        ms = 1;
    }
    i64::try_from(ms).unwrap_or(i64::MAX)
}

/// All Bolt request messages a client sends.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltRequest {
    /// HELLO - Initialize connection
    Hello(HelloMessage),
    /// LOGON - Authenticate (Bolt 5.1+)
    Logon(LogonMessage),
    /// GOODBYE - Close connection gracefully
    Goodbye,
    /// RESET - Reset connection state
    Reset,
    /// RUN - Execute a query
    Run(RunMessage),
    /// PULL - Pull results
    Pull(PullMessage),
    /// DISCARD - Discard results
    Discard(PullMessage),
    /// BEGIN - Start transaction
    Begin(BeginMessage),
    /// COMMIT - Commit transaction
    Commit,
    /// ROLLBACK - Rollback transaction
    Rollback,
    /// ROUTE - Request routing information (Bolt 4.3+)
    Route(RouteMessage),
}

impl BoltRequest {
    /// Get the message tag.
    pub fn tag(&self) -> u8 {
        match self {
            BoltRequest::Hello(_) => tag::HELLO,
            BoltRequest::Logon(_) => tag::LOGON,
            BoltRequest::Goodbye => tag::GOODBYE,
            BoltRequest::Reset => tag::RESET,
            BoltRequest::Run(_) => tag::RUN,
            BoltRequest::Pull(_) => tag::PULL,
            BoltRequest::Discard(_) => tag::DISCARD,
            BoltRequest::Begin(_) => tag::BEGIN,
            BoltRequest::Commit => tag::COMMIT,
            BoltRequest::Rollback => tag::ROLLBACK,
            BoltRequest::Route(_) => tag::ROUTE,
        }
    }

    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoltRequest::Hello(_) => "HELLO",
            BoltRequest::Logon(_) => "LOGON",
            BoltRequest::Goodbye => "GOODBYE",
            BoltRequest::Reset => "RESET",
            BoltRequest::Run(_) => "RUN",
            BoltRequest::Pull(_) => "PULL",
            BoltRequest::Discard(_) => "DISCARD",
            BoltRequest::Begin(_) => "BEGIN",
            BoltRequest::Commit => "COMMIT",
            BoltRequest::Rollback => "ROLLBACK",
            BoltRequest::Route(_) => "ROUTE",
        }
    }

    /// Convert to PackStream structure.
    pub fn to_structure(&self) -> PackStreamStructure {
        match self {
            BoltRequest::Hello(msg) => {
                PackStreamStructure::new(tag::HELLO, vec![PackStreamValue::Map(msg.extra.clone())])
            }
            BoltRequest::Logon(msg) => {
                PackStreamStructure::new(tag::LOGON, vec![PackStreamValue::Map(msg.auth.clone())])
            }
            BoltRequest::Goodbye => PackStreamStructure::new(tag::GOODBYE, vec![]),
            BoltRequest::Reset => PackStreamStructure::new(tag::RESET, vec![]),
            BoltRequest::Run(msg) => msg.to_structure(),
            BoltRequest::Pull(msg) => msg.to_structure(tag::PULL),
            BoltRequest::Discard(msg) => msg.to_structure(tag::DISCARD),
            BoltRequest::Begin(msg) => {
                PackStreamStructure::new(tag::BEGIN, vec![PackStreamValue::Map(msg.extra.clone())])
            }
            BoltRequest::Commit => PackStreamStructure::new(tag::COMMIT, vec![]),
            BoltRequest::Rollback => PackStreamStructure::new(tag::ROLLBACK, vec![]),
            BoltRequest::Route(msg) => msg.to_structure(),
        }
    }
}

/// Log form: `NAME field field`, with credentials redacted.
impl fmt::Display for BoltRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        for field in self.to_structure().fields {
            match field {
                PackStreamValue::Map(map) => write!(f, " {}", PackStreamValue::Map(redact(map)))?,
                other => write!(f, " {}", other)?,
            }
        }
        Ok(())
    }
}

fn redact(mut map: PackStreamMap) -> PackStreamMap {
    if let Some(value) = map.get_mut("credentials") {
        *value = PackStreamValue::String(REDACTED.to_string());
    }
    map
}

/// HELLO message - Initialize connection.
#[derive(Clone, PartialEq)]
pub struct HelloMessage {
    /// Extra map, `user_agent` first
    pub extra: PackStreamMap,
}

impl fmt::Debug for HelloMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelloMessage")
            .field("extra", &redact(self.extra.clone()))
            .finish()
    }
}

impl HelloMessage {
    /// Create a new HELLO message.
    pub fn new(user_agent: &str) -> Self {
        let mut extra = PackStreamMap::new();
        extra.insert("user_agent".to_string(), user_agent.into());
        Self { extra }
    }

    /// Merge the entries of an auth map (Bolt < 5.1).
    pub fn with_auth(mut self, auth: &PackStreamMap) -> Self {
        for (k, v) in auth {
            self.extra.insert(k.clone(), v.clone());
        }
        self
    }

    /// Set routing context.
    pub fn with_routing(mut self, routing: PackStreamMap) -> Self {
        self.extra
            .insert("routing".to_string(), PackStreamValue::Map(routing));
        self
    }

    /// Request protocol patches.
    pub fn with_patch_bolt(mut self, patches: &[&str]) -> Self {
        let list = patches.iter().map(|p| PackStreamValue::from(*p)).collect();
        self.extra
            .insert("patch_bolt".to_string(), PackStreamValue::List(list));
        self
    }

    /// Add an arbitrary entry.
    pub fn with_entry(mut self, key: &str, value: PackStreamValue) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}

/// LOGON message (Bolt 5.1+).
#[derive(Clone, PartialEq)]
pub struct LogonMessage {
    /// Auth map
    pub auth: PackStreamMap,
}

impl fmt::Debug for LogonMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogonMessage")
            .field("auth", &redact(self.auth.clone()))
            .finish()
    }
}

/// RUN message - Execute a query.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMessage {
    /// Cypher query string
    pub query: String,
    /// Query parameters
    pub parameters: PackStreamMap,
    /// Extra metadata
    pub extra: PackStreamMap,
}

impl RunMessage {
    /// Create a new RUN message.
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            parameters: PackStreamMap::new(),
            extra: PackStreamMap::new(),
        }
    }

    /// Set query parameters.
    pub fn with_parameters(mut self, params: PackStreamMap) -> Self {
        self.parameters = params;
        self
    }

    /// Set extra metadata.
    pub fn with_extra(mut self, extra: PackStreamMap) -> Self {
        self.extra = extra;
        self
    }

    /// Convert to PackStream structure.
    pub fn to_structure(&self) -> PackStreamStructure {
        PackStreamStructure::new(
            tag::RUN,
            vec![
                PackStreamValue::String(self.query.clone()),
                PackStreamValue::Map(self.parameters.clone()),
                PackStreamValue::Map(self.extra.clone()),
            ],
        )
    }
}

/// BEGIN message - Start a transaction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BeginMessage {
    /// Extra metadata
    pub extra: PackStreamMap,
}

impl BeginMessage {
    /// Create a BEGIN message from a prepared extra map.
    pub fn new(extra: PackStreamMap) -> Self {
        Self { extra }
    }
}

/// PULL/DISCARD body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullMessage {
    /// Number of records (-1 for all)
    pub n: i64,
    /// Query ID (-1 for the last query)
    pub qid: i64,
}

impl PullMessage {
    /// All records of the last query.
    pub fn all() -> Self {
        Self { n: -1, qid: -1 }
    }

    /// Create a message for `n` records.
    pub fn with_n(n: i64) -> Self {
        Self { n, qid: -1 }
    }

    /// Set query ID.
    pub fn with_qid(mut self, qid: i64) -> Self {
        self.qid = qid;
        self
    }

    fn to_structure(self, tag: u8) -> PackStreamStructure {
        let mut extra = PackStreamMap::new();
        extra.insert("n".to_string(), PackStreamValue::Integer(self.n));
        if self.qid != -1 {
            extra.insert("qid".to_string(), PackStreamValue::Integer(self.qid));
        }
        PackStreamStructure::new(tag, vec![PackStreamValue::Map(extra)])
    }
}

impl Default for PullMessage {
    fn default() -> Self {
        Self::all()
    }
}

/// Third ROUTE field.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDatabase {
    /// Bolt 4.3: database name or null
    Name(Option<String>),
    /// Bolt 4.4+: `{db?, imp_user?}`
    Context {
        /// Database name, home database when absent
        db: Option<String>,
        /// User to impersonate
        imp_user: Option<String>,
    },
}

/// ROUTE message - Get routing information (Bolt 4.3+).
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMessage {
    /// Routing context
    pub routing: PackStreamMap,
    /// Bookmarks
    pub bookmarks: Vec<String>,
    /// Database selector
    pub database: RouteDatabase,
}

impl RouteMessage {
    /// Convert to PackStream structure.
    pub fn to_structure(&self) -> PackStreamStructure {
        let db = match &self.database {
            RouteDatabase::Name(name) => PackStreamValue::from(name.clone()),
            RouteDatabase::Context { db, imp_user } => {
                let mut ctx = PackStreamMap::new();
                if let Some(db) = db {
                    ctx.insert("db".to_string(), db.as_str().into());
                }
                if let Some(user) = imp_user {
                    ctx.insert("imp_user".to_string(), user.as_str().into());
                }
                PackStreamValue::Map(ctx)
            }
        };

        PackStreamStructure::new(
            tag::ROUTE,
            vec![
                PackStreamValue::Map(self.routing.clone()),
                PackStreamValue::from(self.bookmarks.clone()),
                db,
            ],
        )
    }
}

/// Extra map shared by RUN (auto-commit) and BEGIN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionExtra {
    /// Access mode; only read access is written (`mode: "r"`)
    pub mode: AccessMode,
    /// Target database, home database when `None`
    pub database: Option<String>,
    /// User to impersonate
    pub imp_user: Option<String>,
    /// Bookmarks the transaction must observe
    pub bookmarks: Vec<String>,
    /// Transaction metadata
    pub tx_metadata: PackStreamMap,
    /// Server-side transaction timeout
    pub tx_timeout: Option<Duration>,
}

impl TransactionExtra {
    /// Lay the extra map out. Empty or default entries are left out.
    pub fn to_map(&self) -> PackStreamMap {
        let mut extra = PackStreamMap::new();
        if self.mode == AccessMode::Read {
            extra.insert("mode".to_string(), "r".into());
        }
        if let Some(ref db) = self.database {
            extra.insert("db".to_string(), db.as_str().into());
        }
        if let Some(ref user) = self.imp_user {
            extra.insert("imp_user".to_string(), user.as_str().into());
        }
        if !self.bookmarks.is_empty() {
            extra.insert("bookmarks".to_string(), self.bookmarks.clone().into());
        }
        if !self.tx_metadata.is_empty() {
            extra.insert(
                "tx_metadata".to_string(),
                PackStreamValue::Map(self.tx_metadata.clone()),
            );
        }
        if let Some(timeout) = self.tx_timeout {
            extra.insert(
                "tx_timeout".to_string(),
                PackStreamValue::Integer(tx_timeout_as_ms(timeout)),
            );
        }
        extra
    }
}
