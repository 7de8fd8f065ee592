//! Single-connection WebSocket client
//!
//! Reconnection is not handled here: a reconnect needs a fresh
//! authentication handshake, so it belongs to the stream supervisor.

use super::types::{TransportClose, WsConfig, WsConnection, WsEvent, MIN_PING_INTERVAL};
use super::Transport;
use crate::error::ConnectionError;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// WebSocket client with ping/pong keepalive
pub struct WsClient {
    config: WsConfig,
}

impl WsClient {
    /// Create a new WebSocket client with the given configuration
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    /// Get the configured URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Connect and stream until the connection finishes
    async fn connect_and_stream(
        config: &WsConfig,
        tx: &mpsc::Sender<WsEvent>,
        send_rx: &mut mpsc::Receiver<String>,
    ) -> Result<TransportClose, ConnectionError> {
        tracing::info!(url = %config.url, "Connecting to WebSocket");

        let (ws_stream, _response) =
            tokio::time::timeout(config.connect_timeout, connect_async(&config.url))
                .await
                .map_err(|_| {
                    ConnectionError::ConnectFailed(format!(
                        "timed out after {:?}",
                        config.connect_timeout
                    ))
                })?
                .map_err(|e| ConnectionError::ConnectFailed(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        tracing::info!("WebSocket connected");

        if tx.send(WsEvent::Opened).await.is_err() {
            let _ = write.send(Message::Close(None)).await;
            return Ok(TransportClose::Local);
        }

        let period = config.ping_interval.max(MIN_PING_INTERVAL);
        let mut ping_interval = interval_at(Instant::now() + period, period);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut waiting_for_pong = false;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if tx.send(WsEvent::Message(text)).await.is_err() {
                                tracing::debug!("Receiver dropped, closing connection");
                                let _ = write.send(Message::Close(None)).await;
                                return Ok(TransportClose::Local);
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            let text = String::from_utf8_lossy(&data).into_owned();
                            if tx.send(WsEvent::Message(text)).await.is_err() {
                                let _ = write.send(Message::Close(None)).await;
                                return Ok(TransportClose::Local);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await
                                .map_err(|e| ConnectionError::SendFailed(e.to_string()))?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            waiting_for_pong = false;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Received close frame");
                            let (code, reason) = match frame {
                                Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                                None => (None, String::new()),
                            };
                            return Ok(TransportClose::Peer { code, reason });
                        }
                        Some(Err(e)) => {
                            return Err(ConnectionError::ConnectFailed(e.to_string()));
                        }
                        None => {
                            return Err(ConnectionError::StreamEnded);
                        }
                        _ => {}
                    }
                }

                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            write.send(Message::Text(text)).await
                                .map_err(|e| ConnectionError::SendFailed(e.to_string()))?;
                        }
                        None => {
                            // Sender dropped, close connection
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(TransportClose::Local);
                        }
                    }
                }

                _ = ping_interval.tick() => {
                    if waiting_for_pong {
                        return Err(ConnectionError::PongTimeout);
                    }
                    write.send(Message::Ping(vec![])).await
                        .map_err(|e| ConnectionError::SendFailed(e.to_string()))?;
                    waiting_for_pong = true;
                }
            }
        }
    }
}

impl Transport for WsClient {
    fn open(&self) -> WsConnection {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (send_tx, mut send_rx) = mpsc::channel(64);
        let config = self.config.clone();

        tokio::spawn(async move {
            let close = match Self::connect_and_stream(&config, &event_tx, &mut send_rx).await {
                Ok(close) => close,
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket connection failed");
                    TransportClose::Failed(e)
                }
            };
            let _ = event_tx.send(WsEvent::Closed(close)).await;
        });

        WsConnection {
            events: event_rx,
            outbound: send_tx,
        }
    }
}
