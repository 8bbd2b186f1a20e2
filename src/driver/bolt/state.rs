//! Server-side connection state.
//!
//! The state the server is believed to be in, driven by the requests whose
//! SUCCESS has been observed. The transition function is pure.

use std::fmt;

/// Server state of a Bolt connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerState {
    /// Handshake done, HELLO not yet acknowledged
    #[default]
    Connected,
    /// Authenticated and idle
    Ready,
    /// An auto-commit result is open
    Streaming,
    /// Inside an explicit transaction
    TxReadyOrStreaming,
    /// A FAILURE was received; only RESET is accepted
    Failed,
}

impl ServerState {
    /// Upper-case name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerState::Connected => "CONNECTED",
            ServerState::Ready => "READY",
            ServerState::Streaming => "STREAMING",
            ServerState::TxReadyOrStreaming => "TX_READY||TX_STREAMING",
            ServerState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Next server state after a SUCCESS for `request` (a request name such as
/// `"RUN"`).
///
/// A SUCCESS with `has_more` keeps the current state. Unlisted combinations
/// keep the current state as well.
pub fn transition(state: ServerState, request: &str, has_more: bool) -> ServerState {
    if has_more {
        return state;
    }
    match (state, request) {
        (ServerState::Connected, "HELLO") => ServerState::Ready,
        (ServerState::Ready, "RUN") => ServerState::Streaming,
        (ServerState::Ready, "BEGIN") => ServerState::TxReadyOrStreaming,
        (ServerState::Streaming, "PULL" | "DISCARD" | "RESET") => ServerState::Ready,
        (ServerState::TxReadyOrStreaming, "COMMIT" | "ROLLBACK" | "RESET") => ServerState::Ready,
        (ServerState::Failed, "RESET") => ServerState::Ready,
        (state, _) => state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_commit_cycle() {
        let s = transition(ServerState::Connected, "HELLO", false);
        assert_eq!(s, ServerState::Ready);
        let s = transition(s, "RUN", false);
        assert_eq!(s, ServerState::Streaming);
        let s = transition(s, "PULL", true);
        assert_eq!(s, ServerState::Streaming);
        let s = transition(s, "PULL", false);
        assert_eq!(s, ServerState::Ready);
    }

    #[test]
    fn test_transaction_cycle() {
        let s = transition(ServerState::Ready, "BEGIN", false);
        assert_eq!(s, ServerState::TxReadyOrStreaming);
        // RUN/PULL inside a transaction do not leave it
        let s = transition(s, "RUN", false);
        assert_eq!(s, ServerState::TxReadyOrStreaming);
        let s = transition(s, "PULL", false);
        assert_eq!(s, ServerState::TxReadyOrStreaming);
        assert_eq!(transition(s, "COMMIT", false), ServerState::Ready);
        assert_eq!(transition(s, "ROLLBACK", false), ServerState::Ready);
    }

    #[test]
    fn test_reset_recovers() {
        assert_eq!(transition(ServerState::Failed, "RESET", false), ServerState::Ready);
        assert_eq!(transition(ServerState::Streaming, "RESET", false), ServerState::Ready);
        assert_eq!(
            transition(ServerState::TxReadyOrStreaming, "RESET", false),
            ServerState::Ready
        );
        assert_eq!(transition(ServerState::Failed, "RUN", false), ServerState::Failed);
    }

    #[test]
    fn test_unlisted_requests_keep_state() {
        assert_eq!(transition(ServerState::Ready, "ROUTE", false), ServerState::Ready);
        assert_eq!(transition(ServerState::Ready, "LOGON", false), ServerState::Ready);
        assert_eq!(transition(ServerState::Connected, "RUN", false), ServerState::Connected);
    }

    #[test]
    fn test_display() {
        assert_eq!(ServerState::Failed.to_string(), "FAILED");
        assert_eq!(ServerState::default(), ServerState::Connected);
    }
}
