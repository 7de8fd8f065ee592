//! Configuration types for bar-stream

use crate::data::FlushPolicy;
use crate::error::AuthenticationError;
use crate::stream::{ConnectorConfig, ReconnectConfig};
use crate::telemetry::LogFormat;
use crate::ws::WsConfig;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Market data websocket base URL
pub const DATA_STREAM_URL: &str = "wss://stream.data.alpaca.markets/v2";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Market data feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    Iex,
    Sip,
    #[default]
    DelayedSip,
}

impl Feed {
    pub fn path(self) -> &'static str {
        match self {
            Feed::Iex => "iex",
            Feed::Sip => "sip",
            Feed::DelayedSip => "delayed_sip",
        }
    }
}

/// Stream connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub feed: Feed,
    /// Full URL override; takes precedence over `feed`
    pub url: Option<String>,
    pub symbols: Vec<String>,
    pub auth_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub ping_interval_secs: u64,
    /// How long to wait for the transport to confirm a local close
    pub close_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            feed: Feed::default(),
            url: None,
            symbols: Vec::new(),
            auth_timeout_secs: 10,
            connect_timeout_secs: 10,
            ping_interval_secs: 30,
            close_timeout_secs: 5,
        }
    }
}

impl StreamConfig {
    /// Resolved websocket URL
    pub fn url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("{}/{}", DATA_STREAM_URL, self.feed.path()),
        }
    }

    pub fn ws_config(&self) -> WsConfig {
        WsConfig::new(self.url())
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .ping_interval(Duration::from_secs(self.ping_interval_secs))
    }

    pub fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig {
            auth_timeout: Duration::from_secs(self.auth_timeout_secs),
            close_timeout: Duration::from_secs(self.close_timeout_secs),
        }
    }
}

/// Reconnection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub max_delay_secs: u64,
    pub multiplier: f64,
    /// Fraction of the delay to randomize (0.1 = ±10%)
    pub jitter: f64,
    /// 0 = unlimited
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 1000,
            max_delay_secs: 60,
            multiplier: 2.0,
            jitter: 0.1,
            max_attempts: 0,
        }
    }
}

impl ReconnectSettings {
    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_secs),
            multiplier: self.multiplier,
            jitter_factor: self.jitter,
            max_attempts: self.max_attempts,
        }
    }
}

/// Flush mode for the bar sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    #[default]
    PerBar,
    Batched,
}

/// Bar table configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub path: PathBuf,
    pub flush: FlushMode,
    /// Batched mode: flush when this many bars are buffered
    pub batch_size: usize,
    /// Batched mode: flush at least this often
    pub flush_interval_secs: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/bars.csv"),
            flush: FlushMode::PerBar,
            batch_size: 100,
            flush_interval_secs: 5,
        }
    }
}

impl SinkConfig {
    pub fn flush_policy(&self) -> FlushPolicy {
        match self.flush {
            FlushMode::PerBar => FlushPolicy::PerBar,
            FlushMode::Batched => FlushPolicy::Batched {
                max_bars: self.batch_size,
                max_interval: Duration::from_secs(self.flush_interval_secs.max(1)),
            },
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

/// Environment variable holding the API key id
pub const KEY_ID_VAR: &str = "ALPACA_KEY_ID";
/// Environment variable holding the API secret
pub const SECRET_KEY_VAR: &str = "ALPACA_SECRET_KEY";

/// API credentials. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    key: String,
    secret: String,
}

impl Credentials {
    pub fn new(
        key: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self, AuthenticationError> {
        let key = key.into();
        let secret = secret.into();

        if key.is_empty() {
            return Err(AuthenticationError::MissingCredential(KEY_ID_VAR));
        }
        if secret.is_empty() {
            return Err(AuthenticationError::MissingCredential(SECRET_KEY_VAR));
        }

        Ok(Self { key, secret })
    }

    /// Read credentials from the environment, loading `.env` first if present
    pub fn from_env() -> Result<Self, AuthenticationError> {
        let _ = dotenvy::dotenv();

        let key = std::env::var(KEY_ID_VAR)
            .map_err(|_| AuthenticationError::MissingCredential(KEY_ID_VAR))?;
        let secret = std::env::var(SECRET_KEY_VAR)
            .map_err(|_| AuthenticationError::MissingCredential(SECRET_KEY_VAR))?;

        Self::new(key, secret)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}
