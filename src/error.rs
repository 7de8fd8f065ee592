//! Error taxonomy for the ingestion pipeline
//!
//! - [`ConnectionError`]: transport-level, retryable
//! - [`AuthenticationError`]: fatal for the credentials in use
//! - [`DecodeError`]: scoped to one record, always recoverable
//! - [`PersistenceError`]: sink write failures, surfaced to the caller

use std::path::PathBuf;
use thiserror::Error;

/// Transport-level failures. A supervisor may retry these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// Could not establish the websocket connection
    #[error("connection failed: {0}")]
    ConnectFailed(String),
    /// The stream ended without a close frame
    #[error("stream ended unexpectedly")]
    StreamEnded,
    /// No pong within the keepalive window
    #[error("pong timeout")]
    PongTimeout,
    /// Writing a frame to the socket failed
    #[error("send failed: {0}")]
    SendFailed(String),
    /// Server reported an error after authentication
    #[error("server error ({code}): {message}")]
    Server { code: i64, message: String },
}

/// Authentication failures. Never retried without new credentials.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("credentials rejected ({code}): {message}")]
    Rejected { code: i64, message: String },
    #[error("no authentication acknowledgement within {0:?}")]
    Timeout(std::time::Duration),
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
}

impl AuthenticationError {
    /// Server error codes the feed uses for authentication problems
    pub fn is_auth_code(code: i64) -> bool {
        matches!(code, 401..=404)
    }
}

/// A single record could not be turned into a bar.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame was not JSON at all
    #[error("malformed message: {0}")]
    Malformed(String),
    /// A record inside the frame was not a JSON object
    #[error("record {index} is not an object")]
    NotAnObject { index: usize },
    /// A record carried no `T` type tag
    #[error("record {index} has no type tag")]
    MissingTag { index: usize },
    /// A bar record was missing a field or had the wrong type
    #[error("record {index}: invalid bar: {reason}")]
    InvalidBar { index: usize, reason: String },
    /// A bar record violated the OHLC price ordering
    #[error("record {index}: {symbol} prices out of order (l <= o,c <= h)")]
    PriceOrdering { index: usize, symbol: String },
    /// A control record could not be parsed
    #[error("record {index}: invalid control message: {reason}")]
    InvalidControl { index: usize, reason: String },
}

/// Sink write failures. Previously durable rows are never truncated.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} has header {found:?}, expected {expected:?}")]
    HeaderMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
    #[error("csv error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path} row {row}: {reason}")]
    InvalidRow {
        path: PathBuf,
        row: usize,
        reason: String,
    },
    /// The flush worker stopped on a failed flush. `pending` counts every
    /// bar it had accepted that never reached the table.
    #[error("flush failed with {pending} bars not persisted: {source}")]
    FlushFailed {
        pending: usize,
        #[source]
        source: Box<PersistenceError>,
    },
    /// The flush worker has stopped; bars can no longer be accepted
    #[error("flush worker stopped")]
    WorkerStopped,
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Terminal outcome of a session that did not end cleanly.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    #[error("sink stopped accepting bars")]
    SinkFailed,
}

impl SessionError {
    /// Whether a supervisor should open a new session after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Connection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_auth_codes() {
        assert!(AuthenticationError::is_auth_code(401));
        assert!(AuthenticationError::is_auth_code(402));
        assert!(AuthenticationError::is_auth_code(404));
        assert!(!AuthenticationError::is_auth_code(405));
        assert!(!AuthenticationError::is_auth_code(500));
    }

    #[test]
    fn test_retryable() {
        assert!(SessionError::from(ConnectionError::StreamEnded).is_retryable());
        assert!(
            !SessionError::from(AuthenticationError::Timeout(Duration::from_secs(10)))
                .is_retryable()
        );
        assert!(!SessionError::SinkFailed.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = ConnectionError::ConnectFailed("refused".to_string());
        assert_eq!(err.to_string(), "connection failed: refused");

        let err = DecodeError::MissingTag { index: 2 };
        assert_eq!(err.to_string(), "record 2 has no type tag");

        let err = AuthenticationError::Rejected {
            code: 402,
            message: "auth failed".to_string(),
        };
        assert_eq!(err.to_string(), "credentials rejected (402): auth failed");
    }
}
