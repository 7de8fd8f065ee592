//! WebSocket transport
//!
//! A connection is exposed as an ordered stream of [`WsEvent`]s plus an
//! outbound sender, so consumers can be driven without a live network.

mod client;
mod replay;
mod types;

pub use client::WsClient;
pub use replay::ReplayTransport;
pub use types::{TransportClose, WsConfig, WsConnection, WsEvent, MIN_PING_INTERVAL};

/// Something that can open connections
pub trait Transport: Send + Sync {
    /// Start a new connection. Failures are reported as a
    /// [`WsEvent::Closed`] on the returned event stream.
    fn open(&self) -> WsConnection;
}
