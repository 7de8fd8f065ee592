//! WebSocket types and configuration

use crate::error::ConnectionError;
use std::time::Duration;
use tokio::sync::mpsc;

/// Shortest ping period; a zero period would make the ping timer panic
pub const MIN_PING_INTERVAL: Duration = Duration::from_secs(1);

/// WebSocket client configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// WebSocket URL to connect to
    pub url: String,
    /// Maximum time to establish the connection
    pub connect_timeout: Duration,
    /// Interval for sending ping frames; a missing pong by the next tick fails the connection
    pub ping_interval: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
        }
    }
}

impl WsConfig {
    /// Create a new config with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout = d;
        self
    }

    /// Set ping interval
    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.ping_interval = d.max(MIN_PING_INTERVAL);
        self
    }
}

/// Lifecycle and data events of one connection, delivered in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    /// Connection established
    Opened,
    /// Text frame (binary frames are forwarded lossily as text)
    Message(String),
    /// Connection finished; always the last event
    Closed(TransportClose),
}

/// Why a connection finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportClose {
    /// Peer sent a close frame
    Peer { code: Option<u16>, reason: String },
    /// Local side closed (outbound sender dropped)
    Local,
    /// Transport failure
    Failed(ConnectionError),
}

/// Both ends of one open connection, as seen by its consumer
#[derive(Debug)]
pub struct WsConnection {
    /// Inbound events; ends with [`WsEvent::Closed`]
    pub events: mpsc::Receiver<WsEvent>,
    /// Outbound text frames; dropping it closes the connection
    pub outbound: mpsc::Sender<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_config_default() {
        let config = WsConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.ping_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_ws_config_builder() {
        let config = WsConfig::new("wss://example.com")
            .connect_timeout(Duration::from_secs(3))
            .ping_interval(Duration::from_secs(15));

        assert_eq!(config.url, "wss://example.com");
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.ping_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_zero_ping_interval_clamped() {
        let config = WsConfig::new("wss://example.com").ping_interval(Duration::ZERO);
        assert_eq!(config.ping_interval, MIN_PING_INTERVAL);
    }
}
