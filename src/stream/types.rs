//! Connector state machine and session types

use crate::error::{AuthenticationError, ConnectionError, SessionError};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Connector lifecycle.
///
/// `Disconnected -> Connecting -> Authenticating -> Subscribed -> Streaming
/// -> Closing -> Disconnected`. Any live state may move to `Closing`;
/// a failed authentication goes straight to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectorState {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Subscribed,
    Streaming,
    Closing,
}

/// Rejected state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ConnectorState,
    pub to: ConnectorState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid transition {:?} -> {:?}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

impl ConnectorState {
    /// Check and perform a state change
    pub fn transition(self, to: ConnectorState) -> Result<ConnectorState, InvalidTransition> {
        use ConnectorState::*;

        let allowed = matches!(
            (self, to),
            (Disconnected, Connecting)
                | (Connecting, Authenticating)
                | (Authenticating, Subscribed)
                | (Authenticating, Disconnected)
                | (Subscribed, Streaming)
                | (Connecting | Authenticating | Subscribed | Streaming, Closing)
                | (Closing, Disconnected)
        );

        if allowed {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }

    /// Numeric encoding for the state gauge
    pub fn as_gauge(self) -> f64 {
        match self {
            ConnectorState::Disconnected => 0.0,
            ConnectorState::Connecting => 1.0,
            ConnectorState::Authenticating => 2.0,
            ConnectorState::Subscribed => 3.0,
            ConnectorState::Streaming => 4.0,
            ConnectorState::Closing => 5.0,
        }
    }
}

/// Why a session ended. Reported exactly once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the connection with a close frame
    PeerClosed { code: Option<u16>, reason: String },
    /// Local cancellation
    Cancelled,
    /// Transport failure
    Connection(ConnectionError),
    /// Credentials rejected or handshake timed out
    Authentication(AuthenticationError),
    /// The sink stopped accepting bars
    SinkFailed,
}

impl CloseReason {
    /// Short stable code for logs and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            CloseReason::PeerClosed { .. } => "peer_closed",
            CloseReason::Cancelled => "cancelled",
            CloseReason::Connection(_) => "connection_error",
            CloseReason::Authentication(_) => "authentication_error",
            CloseReason::SinkFailed => "sink_failed",
        }
    }

    /// `None` for graceful endings, the error otherwise
    pub fn as_error(&self) -> Option<SessionError> {
        match self {
            CloseReason::PeerClosed { .. } | CloseReason::Cancelled => None,
            CloseReason::Connection(e) => Some(SessionError::Connection(e.clone())),
            CloseReason::Authentication(e) => Some(SessionError::Authentication(e.clone())),
            CloseReason::SinkFailed => Some(SessionError::SinkFailed),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed { code, reason } => {
                write!(f, "peer closed (code {:?}): {}", code, reason)
            }
            CloseReason::Cancelled => write!(f, "cancelled"),
            CloseReason::Connection(e) => write!(f, "{}", e),
            CloseReason::Authentication(e) => write!(f, "{}", e),
            CloseReason::SinkFailed => write!(f, "sink failed"),
        }
    }
}

/// Per-session counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub bars: u64,
    pub skipped: u64,
    pub decode_errors: u64,
}

/// One connection's lifetime, from connect to disconnect
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    symbols: BTreeSet<String>,
    started_at: DateTime<Utc>,
    state: ConnectorState,
    history: Vec<ConnectorState>,
    stats: SessionStats,
    close_reason: Option<CloseReason>,
}

impl Session {
    pub fn new(symbols: BTreeSet<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbols,
            started_at: Utc::now(),
            state: ConnectorState::Disconnected,
            history: vec![ConnectorState::Disconnected],
            stats: SessionStats::default(),
            close_reason: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn symbols(&self) -> &BTreeSet<String> {
        &self.symbols
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> ConnectorState {
        self.state
    }

    /// Every state the session passed through, in order
    pub fn history(&self) -> &[ConnectorState] {
        &self.history
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut SessionStats {
        &mut self.stats
    }

    /// Set once, when the session ends
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    /// Whether the session got as far as receiving data
    pub fn reached_streaming(&self) -> bool {
        self.history.contains(&ConnectorState::Streaming)
    }

    pub(crate) fn advance(&mut self, to: ConnectorState) -> Result<(), InvalidTransition> {
        self.state = self.state.transition(to)?;
        self.history.push(to);
        tracing::debug!(state = ?to, "Connector state changed");
        crate::telemetry::set_connector_state(to.as_gauge());
        Ok(())
    }

    pub(crate) fn finish(&mut self, reason: CloseReason) {
        debug_assert!(self.close_reason.is_none(), "session closed twice");
        self.close_reason = Some(reason);
    }
}
