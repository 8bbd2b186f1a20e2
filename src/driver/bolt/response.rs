//! Pending responses.
//!
//! Every request that expects a reply queues a [`Response`]. The server
//! answers strictly in request order with zero or more RECORDs followed by a
//! single SUCCESS, FAILURE or IGNORED.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bolt::message::FailureMessage;
use crate::bolt::packstream::{PackStreamMap, PackStreamValue};

/// How a FAILURE (and unexpected messages) for a response are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Regular request; a FAILURE resets the connection
    Plain,
    /// HELLO; a FAILURE kills the connection
    Init,
    /// LOGON; a FAILURE kills the connection
    Logon,
    /// RESET; anything but SUCCESS drops the connection
    Reset,
    /// COMMIT; losing the connection makes the outcome unknown
    Commit,
}

type RecordsFn = Box<dyn FnMut(&[PackStreamValue]) + Send>;
type MetadataFn = Box<dyn FnMut(&PackStreamMap) + Send>;
type SummaryFn = Box<dyn FnMut() + Send>;

/// Optional callbacks invoked as a response arrives.
#[derive(Default)]
pub struct ResponseHandlers {
    on_records: Option<RecordsFn>,
    on_success: Option<MetadataFn>,
    on_failure: Option<MetadataFn>,
    on_ignored: Option<SummaryFn>,
    on_summary: Option<SummaryFn>,
}

impl ResponseHandlers {
    /// No callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the values of each RECORD.
    pub fn on_records(mut self, f: impl FnMut(&[PackStreamValue]) + Send + 'static) -> Self {
        self.on_records = Some(Box::new(f));
        self
    }

    /// Called with SUCCESS metadata.
    pub fn on_success(mut self, f: impl FnMut(&PackStreamMap) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Called with FAILURE metadata.
    pub fn on_failure(mut self, f: impl FnMut(&PackStreamMap) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(f));
        self
    }

    /// Called on IGNORED.
    pub fn on_ignored(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_ignored = Some(Box::new(f));
        self
    }

    /// Called once the result is finished (not after a `has_more` SUCCESS).
    pub fn on_summary(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_summary = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for ResponseHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHandlers")
            .field("on_records", &self.on_records.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .field("on_ignored", &self.on_ignored.is_some())
            .field("on_summary", &self.on_summary.is_some())
            .finish()
    }
}

// ============================================================================
// ResponseHandle
// ============================================================================

#[derive(Debug, Default)]
struct Collected {
    records: Vec<Vec<PackStreamValue>>,
    success: Option<PackStreamMap>,
    failure: Option<FailureMessage>,
    ignored: bool,
    complete: bool,
}

/// Caller-side view of a queued response.
///
/// Filled in by the connection while messages are fetched; cloning shares
/// the same state.
#[derive(Debug, Clone, Default)]
pub struct ResponseHandle {
    inner: Arc<Mutex<Collected>>,
}

impl ResponseHandle {
    /// Whether the summary message has arrived.
    pub fn is_complete(&self) -> bool {
        self.inner.lock().complete
    }

    /// Number of buffered records.
    pub fn record_count(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Take the buffered records.
    pub fn take_records(&self) -> Vec<Vec<PackStreamValue>> {
        std::mem::take(&mut self.inner.lock().records)
    }

    /// SUCCESS metadata, if the response succeeded.
    pub fn success(&self) -> Option<PackStreamMap> {
        self.inner.lock().success.clone()
    }

    /// FAILURE, if the response failed.
    pub fn failure(&self) -> Option<FailureMessage> {
        self.inner.lock().failure.clone()
    }

    /// Whether the server ignored the request.
    pub fn ignored(&self) -> bool {
        self.inner.lock().ignored
    }

    /// Column names from a RUN SUCCESS.
    pub fn fields(&self) -> Vec<String> {
        self.inner
            .lock()
            .success
            .as_ref()
            .and_then(|m| m.get("fields"))
            .and_then(|v| v.as_list())
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `has_more` of the SUCCESS.
    pub fn has_more(&self) -> bool {
        self.inner
            .lock()
            .success
            .as_ref()
            .and_then(|m| m.get("has_more"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

// ============================================================================
// Response
// ============================================================================

/// One outstanding request's expected reply.
pub struct Response {
    message: &'static str,
    kind: ResponseKind,
    handle: ResponseHandle,
    handlers: ResponseHandlers,
}

impl Response {
    /// Create a response for the request named `message`.
    pub fn new(message: &'static str, kind: ResponseKind, handlers: ResponseHandlers) -> Self {
        Self {
            message,
            kind,
            handle: ResponseHandle::default(),
            handlers,
        }
    }

    /// Request name.
    pub fn message(&self) -> &'static str {
        self.message
    }

    /// Response kind.
    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    /// Shared handle.
    pub fn handle(&self) -> ResponseHandle {
        self.handle.clone()
    }

    pub(crate) fn on_records(&mut self, values: Vec<PackStreamValue>) {
        if let Some(f) = self.handlers.on_records.as_mut() {
            f(&values);
        }
        self.handle.inner.lock().records.push(values);
    }

    pub(crate) fn on_success(&mut self, metadata: &PackStreamMap) {
        let has_more = metadata
            .get("has_more")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        {
            let mut inner = self.handle.inner.lock();
            inner.success = Some(metadata.clone());
            inner.complete = true;
        }
        if let Some(f) = self.handlers.on_success.as_mut() {
            f(metadata);
        }
        if !has_more {
            self.on_summary();
        }
    }

    pub(crate) fn on_failure(&mut self, failure: &FailureMessage) {
        {
            let mut inner = self.handle.inner.lock();
            inner.failure = Some(failure.clone());
            inner.complete = true;
        }
        if let Some(f) = self.handlers.on_failure.as_mut() {
            f(&failure.metadata);
        }
        self.on_summary();
    }

    pub(crate) fn on_ignored(&mut self) {
        {
            let mut inner = self.handle.inner.lock();
            inner.ignored = true;
            inner.complete = true;
        }
        if let Some(f) = self.handlers.on_ignored.as_mut() {
            f();
        }
        self.on_summary();
    }

    /// Mark complete without running callbacks.
    pub(crate) fn mark_complete(&mut self) {
        self.handle.inner.lock().complete = true;
    }

    fn on_summary(&mut self) {
        if let Some(f) = self.handlers.on_summary.as_mut() {
            f();
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("message", &self.message)
            .field("kind", &self.kind)
            .field("complete", &self.handle.is_complete())
            .finish()
    }
}
