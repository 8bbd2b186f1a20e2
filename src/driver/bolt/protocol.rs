//! Per-version request layout.
//!
//! [`Protocol`] wraps the negotiated [`BoltVersion`] and builds requests
//! according to its [`Capabilities`]. Everything that differs between
//! versions is decided here; the connection only queues what it is given.

use crate::bolt::handshake::{BoltVersion, Capabilities};
use crate::bolt::message::{
    AccessMode, BeginMessage, BoltRequest, HelloMessage, LogonMessage, PullMessage,
    RouteDatabase, RouteMessage, RunMessage, TransactionExtra,
};
use crate::bolt::packstream::{PackStreamMap, PackStreamValue};
use crate::driver::config::{ConnectionConfig, NotificationFilter};
use crate::driver::error::{DriverError, DriverResult};

/// Database routing tables are fetched from before 4.3.
pub const SYSTEM_DATABASE: &str = "system";

/// Routing procedure without a database argument.
pub const ROUTING_PROCEDURE: &str = "CALL dbms.routing.getRoutingTable($context)";

/// Routing procedure with a database argument.
pub const ROUTING_PROCEDURE_WITH_DATABASE: &str =
    "CALL dbms.routing.getRoutingTable($context, $database)";

/// Requests that fetch a routing table.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteRequest {
    /// Bolt 4.3+: a single ROUTE
    Message(BoltRequest),
    /// Bolt 4.0 - 4.2: RUN of the routing procedure followed by PULL
    Procedure {
        /// RUN of the procedure
        run: BoltRequest,
        /// PULL of all rows
        pull: BoltRequest,
    },
}

/// Request builder for one negotiated protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol {
    version: BoltVersion,
}

impl Protocol {
    /// Create for a negotiated version.
    pub fn new(version: BoltVersion) -> Self {
        Self { version }
    }

    /// Negotiated version.
    pub fn version(&self) -> BoltVersion {
        self.version
    }

    /// Feature table.
    pub fn capabilities(&self) -> &'static Capabilities {
        self.version.capabilities()
    }

    fn check_notification_filter(&self, filter: &NotificationFilter) -> DriverResult<()> {
        if filter.is_set() && !self.capabilities().notification_filters {
            return Err(DriverError::configuration(format!(
                "Notification filtering is not supported for the Bolt Protocol {}",
                self.version
            )));
        }
        Ok(())
    }

    fn check_impersonation(&self, imp_user: Option<&str>) -> DriverResult<()> {
        match imp_user {
            Some(user) if !self.capabilities().impersonation => {
                Err(DriverError::configuration(format!(
                    "Impersonation is not supported in Bolt Protocol {}. Trying to impersonate {:?}.",
                    self.version, user
                )))
            }
            _ => Ok(()),
        }
    }

    /// HELLO, followed by LOGON from 5.1 on.
    pub fn hello(&self, config: &ConnectionConfig) -> DriverResult<Vec<BoltRequest>> {
        let caps = self.capabilities();
        self.check_notification_filter(&config.notification_filter)?;

        let mut hello = HelloMessage::new(&config.user_agent);
        if caps.routing_in_hello {
            if let Some(routing) = config.routing_context_map() {
                hello = hello.with_routing(routing);
            }
        }
        if caps.utc_patch {
            hello = hello.with_patch_bolt(&["utc"]);
        }
        config.notification_filter.apply(&mut hello.extra);

        let auth = config.auth.to_map();
        if caps.logon {
            Ok(vec![
                BoltRequest::Hello(hello),
                BoltRequest::Logon(LogonMessage { auth }),
            ])
        } else {
            Ok(vec![BoltRequest::Hello(hello.with_auth(&auth))])
        }
    }

    fn transaction_extra(
        &self,
        extra: &TransactionExtra,
        filter: &NotificationFilter,
    ) -> DriverResult<PackStreamMap> {
        self.check_impersonation(extra.imp_user.as_deref())?;
        self.check_notification_filter(filter)?;
        let mut map = extra.to_map();
        filter.apply(&mut map);
        Ok(map)
    }

    /// Auto-commit RUN, or RUN inside a transaction when `extra` is default.
    pub fn run(
        &self,
        query: &str,
        parameters: PackStreamMap,
        extra: &TransactionExtra,
        filter: &NotificationFilter,
    ) -> DriverResult<BoltRequest> {
        let extra = self.transaction_extra(extra, filter)?;
        Ok(BoltRequest::Run(
            RunMessage::new(query)
                .with_parameters(parameters)
                .with_extra(extra),
        ))
    }

    /// BEGIN of an explicit transaction.
    pub fn begin(
        &self,
        extra: &TransactionExtra,
        filter: &NotificationFilter,
    ) -> DriverResult<BoltRequest> {
        let extra = self.transaction_extra(extra, filter)?;
        Ok(BoltRequest::Begin(BeginMessage::new(extra)))
    }

    /// PULL of `n` records (-1 for all) of query `qid` (-1 for the last).
    pub fn pull(&self, n: i64, qid: i64) -> BoltRequest {
        BoltRequest::Pull(PullMessage::with_n(n).with_qid(qid))
    }

    /// DISCARD of `n` records (-1 for all) of query `qid` (-1 for the last).
    pub fn discard(&self, n: i64, qid: i64) -> BoltRequest {
        BoltRequest::Discard(PullMessage::with_n(n).with_qid(qid))
    }

    /// Requests fetching the routing table for `database`.
    pub fn route(
        &self,
        routing_context: PackStreamMap,
        bookmarks: &[String],
        database: Option<&str>,
        imp_user: Option<&str>,
    ) -> DriverResult<RouteRequest> {
        let caps = self.capabilities();
        self.check_impersonation(imp_user)?;

        if !caps.route_message {
            let mut parameters = PackStreamMap::new();
            parameters.insert("context".to_string(), PackStreamValue::Map(routing_context));
            let query = match database {
                Some(db) => {
                    parameters.insert("database".to_string(), db.into());
                    ROUTING_PROCEDURE_WITH_DATABASE
                }
                None => ROUTING_PROCEDURE,
            };
            let extra = TransactionExtra {
                mode: AccessMode::Read,
                database: Some(SYSTEM_DATABASE.to_string()),
                bookmarks: bookmarks.to_vec(),
                ..Default::default()
            };
            let run = RunMessage::new(query)
                .with_parameters(parameters)
                .with_extra(extra.to_map());
            return Ok(RouteRequest::Procedure {
                run: BoltRequest::Run(run),
                pull: self.pull(-1, -1),
            });
        }

        let database = if caps.route_db_context {
            RouteDatabase::Context {
                db: database.map(str::to_string),
                imp_user: imp_user.map(str::to_string),
            }
        } else {
            RouteDatabase::Name(database.map(str::to_string))
        };
        Ok(RouteRequest::Message(BoltRequest::Route(RouteMessage {
            routing: routing_context,
            bookmarks: bookmarks.to_vec(),
            database,
        })))
    }
}
