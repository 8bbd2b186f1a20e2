//! Bolt connection.
//!
//! A [`Connection`] owns one transport and pipelines requests over it.
//! Requests are encoded into an outbox and only written by [`send_all`];
//! every request that expects a reply queues a [`Response`], and replies
//! are matched strictly in FIFO order by [`fetch_message`].
//!
//! Failures are never resolved by calling back into the owning pool.
//! Instead the connection records [`PoolFeedback`] which the pool drains
//! when the connection is returned.
//!
//! [`send_all`]: Connection::send_all
//! [`fetch_message`]: Connection::fetch_message

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::codec::Decoder;

use crate::bolt::codec::{BoltResponseCodec, ChunkWriter};
use crate::bolt::handshake::BoltVersion;
use crate::bolt::message::{BoltRequest, BoltResponse, FailureMessage, RoutingInfo, TransactionExtra};
use crate::bolt::packstream::{PackStreamEncoder, PackStreamMap, PackStreamValue};
use crate::driver::address::Address;
use crate::driver::config::{ConnectionConfig, NotificationFilter};
use crate::driver::deadline::Deadline;
use crate::driver::error::{BoxError, DriverError, DriverResult, ServerError, ServerErrorKind};

use super::protocol::{Protocol, RouteRequest};
use super::response::{Response, ResponseHandle, ResponseHandlers, ResponseKind};
use super::state::{transition, ServerState};

/// Byte stream a connection runs over (plain TCP, TLS, or an in-memory pipe).
pub trait BoltStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> BoltStream for T {}

static NEXT_CONNECTION_ID: AtomicU32 = AtomicU32::new(1);

/// Message used when HELLO fails without one.
const INIT_FAILURE_MESSAGE: &str = "Connection initialisation failed due to an unknown error";

/// Hint carrying the server-suggested receive timeout.
const RECV_TIMEOUT_HINT: &str = "connection.recv_timeout_seconds";

/// Something the owning pool should act on once the connection is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolFeedback {
    /// Drop every connection to this address and forget it in routing tables
    Deactivate,
    /// The address can't take writes for `database` (no longer a writer)
    WriteFailure {
        /// Database of the last request, if any
        database: Option<String>,
    },
    /// Every connection of the pool should be closed once idle
    InvalidateAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureAction {
    Reset,
    Kill,
    Close,
}

/// Outcome of dispatching a summary that needs follow-up I/O.
#[derive(Debug)]
struct PendingFailure {
    kind: ResponseKind,
    action: FailureAction,
    error: Option<DriverError>,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Read,
    Write,
}

impl PendingFailure {
    fn close(kind: ResponseKind) -> Self {
        Self {
            kind,
            action: FailureAction::Close,
            error: None,
        }
    }
}

type Fetched = ((usize, usize), Option<PendingFailure>);

// ============================================================================
// Connection
// ============================================================================

/// A Bolt connection after the handshake.
pub struct Connection {
    id: u32,
    address: Address,
    server_address: Option<SocketAddr>,
    protocol: Protocol,
    stream: Option<Box<dyn BoltStream>>,
    codec: BoltResponseCodec,
    read_buffer: BytesMut,
    outbox: ChunkWriter,
    responses: VecDeque<Response>,
    state: ServerState,

    created: Instant,
    idle_since: Instant,
    max_lifetime: Option<Duration>,
    recv_timeout: Option<Duration>,
    deadline: Deadline,

    stale: bool,
    defunct: bool,
    closed: bool,
    closing: bool,
    in_flight: bool,
    routing: bool,
    generation: u64,
    feedback: Vec<PoolFeedback>,

    server_agent: Option<String>,
    connection_id: Option<String>,
    hints: PackStreamMap,
    last_database: Option<String>,
}

impl Connection {
    /// Wrap a transport that has completed the handshake for `version`.
    pub fn new(
        stream: Box<dyn BoltStream>,
        address: Address,
        server_address: Option<SocketAddr>,
        version: BoltVersion,
        max_lifetime: Option<Duration>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed) & 0xFFFF,
            address,
            server_address,
            protocol: Protocol::new(version),
            stream: Some(stream),
            codec: BoltResponseCodec::new(),
            read_buffer: BytesMut::with_capacity(8192),
            outbox: ChunkWriter::new(),
            responses: VecDeque::new(),
            state: ServerState::Connected,
            created: now,
            idle_since: now,
            max_lifetime,
            recv_timeout: None,
            deadline: Deadline::never(),
            stale: false,
            defunct: false,
            closed: false,
            closing: false,
            in_flight: false,
            routing: false,
            generation: 0,
            feedback: Vec::new(),
            server_agent: None,
            connection_id: None,
            hints: PackStreamMap::new(),
            last_database: None,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Local id used in log lines.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Address the connection was opened for (unresolved).
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Resolved peer address.
    pub fn server_address(&self) -> Option<SocketAddr> {
        self.server_address
    }

    /// Request layout of the negotiated version.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Negotiated version.
    pub fn version(&self) -> BoltVersion {
        self.protocol.version()
    }

    /// Believed server state.
    pub fn server_state(&self) -> ServerState {
        self.state
    }

    /// `server` from the HELLO SUCCESS.
    pub fn server_agent(&self) -> Option<&str> {
        self.server_agent.as_deref()
    }

    /// `connection_id` from the HELLO SUCCESS.
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Configuration hints from the HELLO SUCCESS.
    pub fn hints(&self) -> &PackStreamMap {
        &self.hints
    }

    /// Per-read timeout suggested by the server.
    pub fn recv_timeout(&self) -> Option<Duration> {
        self.recv_timeout
    }

    /// Number of responses still expected.
    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }

    /// Bytes queued but not yet written.
    pub fn pending_bytes(&self) -> usize {
        self.outbox.len()
    }

    /// Marked stale, or older than the maximum lifetime.
    pub fn stale(&self) -> bool {
        self.stale
            || matches!(self.max_lifetime, Some(max) if self.created.elapsed() >= max)
    }

    /// Mark stale; it is closed instead of reused.
    pub fn set_stale(&mut self) {
        self.stale = true;
    }

    /// An I/O error or a protocol violation occurred.
    pub fn defunct(&self) -> bool {
        self.defunct
    }

    /// The transport is gone.
    pub fn closed(&self) -> bool {
        self.closed
    }

    /// No traffic for longer than `timeout`.
    pub fn is_idle_for(&self, timeout: Duration) -> bool {
        self.idle_since.elapsed() > timeout
    }

    /// Whether the server is (or will be, once the queued RESET is answered)
    /// in the READY state.
    pub fn is_reset(&self) -> bool {
        match self.responses.back() {
            Some(last) => last.kind() == ResponseKind::Reset,
            None => self.state == ServerState::Ready,
        }
    }

    /// Deadline applied to reads and writes until replaced.
    pub fn set_deadline(&mut self, deadline: Deadline) {
        self.deadline = deadline;
    }

    pub(crate) fn set_routing(&mut self, routing: bool) {
        self.routing = routing;
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub(crate) fn take_feedback(&mut self) -> Vec<PoolFeedback> {
        std::mem::take(&mut self.feedback)
    }

    fn describe(&self) -> String {
        match self.server_address {
            Some(resolved) => format!("{} ({})", self.address, resolved),
            None => self.address.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    fn write_request(&mut self, request: &BoltRequest) -> DriverResult<()> {
        let mut encoder = PackStreamEncoder::new();
        encoder.encode_structure(&request.to_structure()).map_err(|e| {
            DriverError::protocol(format!("Failed to encode {}: {}", request.name(), e))
        })?;
        tracing::debug!("[#{:04X}]  C: {}", self.id, request);
        self.outbox.write(encoder.as_bytes());
        self.outbox.end_message();
        Ok(())
    }

    /// Queue `request` with a response of `kind`. Nothing is written yet.
    pub fn append(
        &mut self,
        request: BoltRequest,
        kind: ResponseKind,
        handlers: ResponseHandlers,
    ) -> DriverResult<ResponseHandle> {
        self.write_request(&request)?;
        let response = Response::new(request.name(), kind, handlers);
        let handle = response.handle();
        self.responses.push_back(response);
        Ok(handle)
    }

    /// HELLO (and LOGON) sent and answered.
    pub async fn hello(&mut self, config: &ConnectionConfig) -> DriverResult<()> {
        for request in self.protocol.hello(config)? {
            let kind = match request {
                BoltRequest::Logon(_) => ResponseKind::Logon,
                _ => ResponseKind::Init,
            };
            self.append(request, kind, ResponseHandlers::new())?;
        }
        self.send_all().await?;
        self.fetch_all().await?;
        Ok(())
    }

    /// Queue a RUN.
    pub fn run(
        &mut self,
        query: &str,
        parameters: PackStreamMap,
        extra: &TransactionExtra,
        filter: &NotificationFilter,
        handlers: ResponseHandlers,
    ) -> DriverResult<ResponseHandle> {
        let request = self.protocol.run(query, parameters, extra, filter)?;
        self.last_database = extra.database.clone();
        self.append(request, ResponseKind::Plain, handlers)
    }

    /// Queue a PULL.
    pub fn pull(&mut self, n: i64, qid: i64, handlers: ResponseHandlers) -> DriverResult<ResponseHandle> {
        let request = self.protocol.pull(n, qid);
        self.append(request, ResponseKind::Plain, handlers)
    }

    /// Queue a DISCARD.
    pub fn discard(&mut self, n: i64, qid: i64, handlers: ResponseHandlers) -> DriverResult<ResponseHandle> {
        let request = self.protocol.discard(n, qid);
        self.append(request, ResponseKind::Plain, handlers)
    }

    /// Queue a BEGIN.
    pub fn begin(
        &mut self,
        extra: &TransactionExtra,
        filter: &NotificationFilter,
        handlers: ResponseHandlers,
    ) -> DriverResult<ResponseHandle> {
        let request = self.protocol.begin(extra, filter)?;
        self.last_database = extra.database.clone();
        self.append(request, ResponseKind::Plain, handlers)
    }

    /// Queue a COMMIT.
    pub fn commit(&mut self, handlers: ResponseHandlers) -> DriverResult<ResponseHandle> {
        self.append(BoltRequest::Commit, ResponseKind::Commit, handlers)
    }

    /// Queue a ROLLBACK.
    pub fn rollback(&mut self, handlers: ResponseHandlers) -> DriverResult<ResponseHandle> {
        self.append(BoltRequest::Rollback, ResponseKind::Plain, handlers)
    }

    /// Fetch the routing table rows for `database`.
    ///
    /// Uses ROUTE from 4.3 on and the routing procedure before that.
    pub async fn route(
        &mut self,
        routing_context: PackStreamMap,
        bookmarks: &[String],
        database: Option<&str>,
        imp_user: Option<&str>,
    ) -> DriverResult<Vec<RoutingInfo>> {
        let invalid = |e| DriverError::protocol(format!("Invalid routing table: {}", e));

        match self.protocol.route(routing_context, bookmarks, database, imp_user)? {
            RouteRequest::Message(request) => {
                let handle = self.append(request, ResponseKind::Plain, ResponseHandlers::new())?;
                self.send_all().await?;
                self.fetch_all().await?;
                let metadata = handle.success().unwrap_or_default();
                let rt = metadata
                    .get("rt")
                    .and_then(|v| v.as_map())
                    .ok_or_else(|| DriverError::protocol("ROUTE response without a routing table"))?;
                Ok(vec![RoutingInfo::from_row(rt).map_err(invalid)?])
            }
            RouteRequest::Procedure { run, pull } => {
                let run = self.append(run, ResponseKind::Plain, ResponseHandlers::new())?;
                let pull = self.append(pull, ResponseKind::Plain, ResponseHandlers::new())?;
                self.send_all().await?;
                self.fetch_all().await?;
                let fields = run.fields();
                pull.take_records()
                    .into_iter()
                    .map(|values| RoutingInfo::from_record(&fields, values).map_err(invalid))
                    .collect()
            }
        }
    }

    /// Bring the server back to READY.
    ///
    /// Any responses still queued ahead of the RESET are drained first.
    pub async fn reset(&mut self) -> DriverResult<()> {
        self.append(BoltRequest::Reset, ResponseKind::Reset, ResponseHandlers::new())?;
        self.send_all().await?;

        while !self.closed && !self.responses.is_empty() {
            let (_, pending) = self.fetch_one().await?;
            let Some(pending) = pending else { continue };
            if pending.kind == ResponseKind::Reset {
                self.kill();
                if let Some(error) = pending.error {
                    return Err(error);
                }
                continue;
            }
            match pending.action {
                // the RESET already queued takes care of it
                FailureAction::Reset => {}
                FailureAction::Kill => self.kill(),
                FailureAction::Close => self.close().await,
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // I/O
    // ------------------------------------------------------------------

    fn check_in_flight(&mut self) {
        if self.in_flight {
            // an earlier read or write was dropped half way
            tracing::debug!("[#{:04X}]  _: <CONNECTION> cancelled during I/O", self.id);
            self.in_flight = false;
            self.defunct = true;
            self.kill();
        }
    }

    fn ensure_usable(&mut self, direction: Direction) -> DriverResult<()> {
        self.check_in_flight();
        let verb = match direction {
            Direction::Read => "read from",
            Direction::Write => "write to",
        };
        if self.defunct {
            return Err(DriverError::service_unavailable(format!(
                "Failed to {} defunct connection {}",
                verb,
                self.describe()
            )));
        }
        if self.closed {
            return Err(DriverError::service_unavailable(format!(
                "Failed to {} closed connection {}",
                verb,
                self.describe()
            )));
        }
        Ok(())
    }

    /// Write everything queued.
    pub async fn send_all(&mut self) -> DriverResult<()> {
        self.ensure_usable(Direction::Write)?;
        self.flush_outbox().await
    }

    async fn flush_outbox(&mut self) -> DriverResult<()> {
        if self.outbox.is_empty() {
            return Ok(());
        }
        let data = self.outbox.take();
        let deadline = self.deadline;

        self.in_flight = true;
        let Some(stream) = self.stream.as_mut() else {
            self.in_flight = false;
            return Err(self.set_defunct(Direction::Write, None));
        };
        let written = deadline
            .run(async {
                match stream.write_all(&data).await {
                    Ok(()) => stream.flush().await,
                    Err(e) => Err(e),
                }
            })
            .await;
        self.in_flight = false;

        match written {
            Some(Ok(())) => {
                self.idle_since = Instant::now();
                Ok(())
            }
            Some(Err(e)) => Err(self.set_defunct(Direction::Write, Some(e))),
            None => Err(self.set_defunct(
                Direction::Write,
                Some(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
            )),
        }
    }

    async fn receive(&mut self) -> DriverResult<BoltResponse> {
        loop {
            match self.codec.decode(&mut self.read_buffer) {
                Ok(Some(message)) => return Ok(message),
                Ok(None) => {}
                Err(e) => {
                    // the byte stream can no longer be trusted
                    self.defunct = true;
                    self.kill();
                    return Err(DriverError::from(e));
                }
            }

            let deadline = Deadline::min(self.deadline, Deadline::from_timeout(self.recv_timeout));
            self.in_flight = true;
            let Some(stream) = self.stream.as_mut() else {
                self.in_flight = false;
                return Err(self.set_defunct(Direction::Read, None));
            };
            let read = deadline.run(stream.read_buf(&mut self.read_buffer)).await;
            self.in_flight = false;

            match read {
                Some(Ok(0)) => {
                    return Err(self.set_defunct(
                        Direction::Read,
                        Some(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer")),
                    ))
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(self.set_defunct(Direction::Read, Some(e))),
                None => {
                    return Err(self.set_defunct(
                        Direction::Read,
                        Some(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
                    ))
                }
            }
        }
    }

    /// Receive and dispatch one message.
    ///
    /// Returns the number of detail (RECORD) and summary messages handled.
    /// A FAILURE resets the connection before its error is returned.
    pub async fn fetch_message(&mut self) -> DriverResult<(usize, usize)> {
        let (counts, pending) = self.fetch_one().await?;
        if let Some(pending) = pending {
            match pending.action {
                FailureAction::Reset => match self.reset().await {
                    Ok(()) => {}
                    Err(e) if e.is_unavailable() => {
                        tracing::debug!("[#{:04X}]  _: <CONNECTION> reset after failure failed: {}", self.id, e);
                    }
                    Err(e) => return Err(e),
                },
                FailureAction::Kill => self.kill(),
                FailureAction::Close => self.close().await,
            }
            if let Some(error) = pending.error {
                return Err(error);
            }
        }
        Ok(counts)
    }

    /// Fetch until no responses are outstanding.
    pub async fn fetch_all(&mut self) -> DriverResult<(usize, usize)> {
        let (mut detail, mut summary) = (0, 0);
        while !self.closed && !self.responses.is_empty() {
            let (d, s) = self.fetch_message().await?;
            detail += d;
            summary += s;
        }
        Ok((detail, summary))
    }

    async fn fetch_one(&mut self) -> DriverResult<Fetched> {
        self.ensure_usable(Direction::Read)?;
        if self.responses.is_empty() {
            return Ok(((0, 0), None));
        }
        let message = self.receive().await?;
        self.idle_since = Instant::now();
        tracing::debug!("[#{:04X}]  S: {}", self.id, message);
        Ok(self.dispatch(message))
    }

    fn dispatch(&mut self, message: BoltResponse) -> Fetched {
        let Some(kind) = self.responses.front().map(Response::kind) else {
            return ((0, 0), None);
        };

        match message {
            BoltResponse::Record(record) => {
                if kind == ResponseKind::Reset {
                    tracing::warn!(
                        "[#{:04X}]  _: <CONNECTION> RESET received RECORD (unexpected response) => dropping connection",
                        self.id
                    );
                    return ((0, 0), Some(PendingFailure::close(kind)));
                }
                if let Some(head) = self.responses.front_mut() {
                    head.on_records(record.fields);
                }
                ((1, 0), None)
            }
            BoltResponse::Success(success) => {
                let Some(mut response) = self.responses.pop_front() else {
                    return ((0, 0), None);
                };
                let has_more = success.has_more();
                self.state = transition(self.state, response.message(), has_more);
                if kind == ResponseKind::Init {
                    self.apply_hello_metadata(&success.metadata);
                }
                response.on_success(&success.metadata);
                ((0, 1), None)
            }
            BoltResponse::Ignored => {
                let Some(mut response) = self.responses.pop_front() else {
                    return ((0, 0), None);
                };
                if kind == ResponseKind::Reset {
                    tracing::warn!(
                        "[#{:04X}]  _: <CONNECTION> RESET received IGNORED (unexpected response) => dropping connection",
                        self.id
                    );
                    response.mark_complete();
                    return ((0, 1), Some(PendingFailure::close(kind)));
                }
                response.on_ignored();
                ((0, 1), None)
            }
            BoltResponse::Failure(failure) => {
                let Some(mut response) = self.responses.pop_front() else {
                    return ((0, 0), None);
                };
                self.state = ServerState::Failed;
                ((0, 1), Some(self.failure_pending(&mut response, failure)))
            }
        }
    }

    fn failure_pending(&mut self, response: &mut Response, failure: FailureMessage) -> PendingFailure {
        let kind = response.kind();
        if kind == ResponseKind::Reset {
            response.mark_complete();
            return PendingFailure {
                kind,
                action: FailureAction::Close,
                error: Some(DriverError::protocol(format!("RESET failed {}", failure))),
            };
        }

        response.on_failure(&failure);
        let error = match kind {
            ResponseKind::Init | ResponseKind::Logon => ServerError::new(
                failure.code(),
                Some(failure.message().unwrap_or(INIT_FAILURE_MESSAGE)),
            ),
            _ => ServerError::from_failure(&failure),
        };
        self.record_failure_feedback(&error);

        let action = match kind {
            ResponseKind::Init | ResponseKind::Logon => FailureAction::Kill,
            _ => FailureAction::Reset,
        };
        PendingFailure {
            kind,
            action,
            error: Some(DriverError::from_server(error)),
        }
    }

    fn record_failure_feedback(&mut self, error: &ServerError) {
        match error.kind {
            ServerErrorKind::DatabaseUnavailable => self.feedback.push(PoolFeedback::Deactivate),
            ServerErrorKind::NotALeader | ServerErrorKind::ForbiddenOnReadOnlyDatabase => {
                self.feedback.push(PoolFeedback::WriteFailure {
                    database: self.last_database.clone(),
                })
            }
            _ if error.invalidates_all_connections() => {
                self.feedback.push(PoolFeedback::InvalidateAll)
            }
            _ => {}
        }
    }

    fn apply_hello_metadata(&mut self, metadata: &PackStreamMap) {
        if let Some(server) = metadata.get("server").and_then(|v| v.as_str()) {
            self.server_agent = Some(server.to_string());
        }
        if let Some(id) = metadata.get("connection_id").and_then(|v| v.as_str()) {
            self.connection_id = Some(id.to_string());
        }
        if !self.protocol.capabilities().hints {
            return;
        }
        let Some(hints) = metadata.get("hints").and_then(|v| v.as_map()) else {
            return;
        };
        self.hints = hints.clone();
        match hints.get(RECV_TIMEOUT_HINT) {
            Some(PackStreamValue::Integer(seconds)) if *seconds > 0 => {
                self.recv_timeout = Some(Duration::from_secs(*seconds as u64));
            }
            Some(other) => {
                tracing::info!(
                    "[#{:04X}]  _: <CONNECTION> Server supplied an invalid value for {} ({}). Make sure the server and network is set up correctly.",
                    self.id,
                    RECV_TIMEOUT_HINT,
                    other
                );
            }
            None => {}
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    fn set_defunct(&mut self, direction: Direction, error: Option<io::Error>) -> DriverError {
        let message = match direction {
            Direction::Read => format!("Failed to read from defunct connection {}", self.describe()),
            Direction::Write => format!("Failed to write data to connection {}", self.describe()),
        };
        match &error {
            Some(e) => tracing::error!("[#{:04X}]  _: <CONNECTION> {}: {}", self.id, message, e),
            None => tracing::error!("[#{:04X}]  _: <CONNECTION> {}", self.id, message),
        }

        self.defunct = true;
        if !self.closed && !self.closing {
            self.kill();
            if self.state != ServerState::Failed {
                self.feedback.push(PoolFeedback::Deactivate);
            }
        } else {
            self.kill();
        }

        let source = error.map(|e| Box::new(e) as BoxError);
        if self.responses.iter().any(|r| r.kind() == ResponseKind::Commit) {
            return DriverError::IncompleteCommit { message, source };
        }
        if self.routing {
            DriverError::SessionExpired { message, source }
        } else {
            DriverError::ServiceUnavailable { message, source }
        }
    }

    /// Send GOODBYE (unless defunct) and close the transport.
    pub async fn close(&mut self) {
        if self.closed || self.closing {
            return;
        }
        self.closing = true;
        if !self.defunct {
            let sent = match self.write_request(&BoltRequest::Goodbye) {
                Ok(()) => self.flush_outbox().await,
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                tracing::debug!("[#{:04X}]  _: <CONNECTION> ignoring failed close {}", self.id, e);
            }
        }
        tracing::debug!("[#{:04X}]  C: <CLOSE>", self.id);
        if let Some(mut stream) = self.stream.take() {
            let _ = self.deadline.run(stream.shutdown()).await;
        }
        self.closed = true;
        self.closing = false;
    }

    /// Drop the transport without any traffic.
    pub fn kill(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("[#{:04X}]  C: <KILL>", self.id);
        }
        self.closed = true;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("version", &self.protocol.version())
            .field("state", &self.state)
            .field("pending", &self.responses.len())
            .field("defunct", &self.defunct)
            .field("closed", &self.closed)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
