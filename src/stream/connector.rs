//! Stream connector
//!
//! Drives one connection through the handshake, decodes every inbound frame
//! and hands bars to the flush worker. `connect` returns only when the
//! connection has finished.

use super::types::{CloseReason, ConnectorState, Session};
use crate::config::Credentials;
use crate::data::BarHandle;
use crate::error::{AuthenticationError, ConnectionError};
use crate::feed::{decode, Action, Control, Record};
use crate::telemetry::{increment, CounterMetric};
use crate::ws::{Transport, TransportClose, WsConnection, WsEvent};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Handshake and shutdown limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Time allowed between sending credentials and the server's answer
    pub auth_timeout: Duration,
    /// Time allowed for the transport to confirm a local close
    pub close_timeout: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            auth_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Called once per session with the reason it ended
pub type CloseHandler = Arc<dyn Fn(&CloseReason) + Send + Sync>;

/// Runs sessions over a [`Transport`], feeding decoded bars to a sink
pub struct Connector<T> {
    transport: T,
    sink: BarHandle,
    config: ConnectorConfig,
    on_close: Option<CloseHandler>,
}

impl<T: Transport> Connector<T> {
    pub fn new(transport: T, sink: BarHandle, config: ConnectorConfig) -> Self {
        Self {
            transport,
            sink,
            config,
            on_close: None,
        }
    }

    /// Register the close handler
    pub fn on_close(mut self, handler: impl Fn(&CloseReason) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(handler));
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one session to completion.
    ///
    /// The returned session is `Disconnected` and carries its close reason.
    pub async fn connect(
        &self,
        credentials: &Credentials,
        symbols: &BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> Session {
        let mut session = Session::new(symbols.clone());
        let span = tracing::info_span!("session", id = %session.id());

        async move {
            let reason = self.run(&mut session, credentials, cancel).await;

            let stats = session.stats();
            let elapsed = chrono::Utc::now() - session.started_at();
            tracing::info!(
                reason = %reason,
                duration_ms = elapsed.num_milliseconds(),
                frames = stats.frames,
                bars = stats.bars,
                skipped = stats.skipped,
                decode_errors = stats.decode_errors,
                "Session closed"
            );

            if let Some(handler) = &self.on_close {
                handler(&reason);
            }
            session.finish(reason);
            session
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        session: &mut Session,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> CloseReason {
        step(session, ConnectorState::Connecting);
        tracing::info!(symbols = ?session.symbols(), "Opening stream");

        let WsConnection {
            mut events,
            outbound,
        } = self.transport.open();

        let mut auth_deadline: Option<Instant> = None;
        let mut transport_closed = false;

        let reason = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break CloseReason::Cancelled,

                _ = wait_until(auth_deadline) => {
                    tracing::warn!(timeout = ?self.config.auth_timeout, "No authentication response");
                    break CloseReason::Authentication(AuthenticationError::Timeout(
                        self.config.auth_timeout,
                    ));
                }

                event = events.recv() => match event {
                    Some(WsEvent::Opened) => {
                        let auth = Action::Auth {
                            key: credentials.key(),
                            secret: credentials.secret(),
                        };
                        if let Err(e) = send(&outbound, &auth).await {
                            break CloseReason::Connection(e);
                        }
                        step(session, ConnectorState::Authenticating);
                        auth_deadline = Some(Instant::now() + self.config.auth_timeout);
                    }
                    Some(WsEvent::Message(text)) => {
                        if let Some(reason) = self
                            .handle_message(session, &text, &outbound, &mut auth_deadline)
                            .await
                        {
                            break reason;
                        }
                    }
                    Some(WsEvent::Closed(close)) => {
                        transport_closed = true;
                        break match close {
                            TransportClose::Peer { code, reason } => {
                                CloseReason::PeerClosed { code, reason }
                            }
                            TransportClose::Local => {
                                CloseReason::Connection(ConnectionError::StreamEnded)
                            }
                            TransportClose::Failed(e) => CloseReason::Connection(e),
                        };
                    }
                    None => {
                        transport_closed = true;
                        break CloseReason::Connection(ConnectionError::StreamEnded);
                    }
                },
            }
        };

        let auth_failed = matches!(reason, CloseReason::Authentication(_))
            && session.state() == ConnectorState::Authenticating;
        if !auth_failed {
            step(session, ConnectorState::Closing);
        }

        // Dropping the sender asks the transport to close
        drop(outbound);
        if !transport_closed {
            self.await_transport_close(&mut events).await;
        }

        step(session, ConnectorState::Disconnected);
        reason
    }

    async fn handle_message(
        &self,
        session: &mut Session,
        text: &str,
        outbound: &mpsc::Sender<String>,
        auth_deadline: &mut Option<Instant>,
    ) -> Option<CloseReason> {
        session.stats_mut().frames += 1;

        for item in decode(text) {
            match item {
                Ok(Record::Bar(bar)) => {
                    match session.state() {
                        ConnectorState::Subscribed => step(session, ConnectorState::Streaming),
                        ConnectorState::Streaming => {}
                        state => {
                            tracing::warn!(?state, symbol = %bar.symbol, "Bar before subscription, dropped");
                            continue;
                        }
                    }

                    tracing::trace!(symbol = %bar.symbol, timestamp = %bar.timestamp, "Bar");
                    if self.sink.append(bar).is_err() {
                        tracing::error!("Sink stopped accepting bars");
                        return Some(CloseReason::SinkFailed);
                    }
                    session.stats_mut().bars += 1;
                    increment(CounterMetric::BarsDecoded, 1);
                }

                Ok(Record::Control(control)) => {
                    if let Some(reason) = self
                        .handle_control(session, control, outbound, auth_deadline)
                        .await
                    {
                        return Some(reason);
                    }
                }

                Ok(Record::Skipped { tag }) => {
                    tracing::trace!(%tag, "Skipped record");
                    session.stats_mut().skipped += 1;
                    increment(CounterMetric::RecordsSkipped, 1);
                }

                Err(e) => {
                    tracing::warn!(error = %e, "Failed to decode record");
                    session.stats_mut().decode_errors += 1;
                    increment(CounterMetric::DecodeErrors, 1);
                }
            }
        }

        None
    }

    async fn handle_control(
        &self,
        session: &mut Session,
        control: Control,
        outbound: &mpsc::Sender<String>,
        auth_deadline: &mut Option<Instant>,
    ) -> Option<CloseReason> {
        match control {
            Control::Connected => {
                tracing::debug!("Server accepted connection");
            }

            Control::Authenticated => {
                if session.state() != ConnectorState::Authenticating {
                    tracing::warn!(state = ?session.state(), "Unexpected authentication ack");
                    return None;
                }
                *auth_deadline = None;

                let bars: Vec<&str> = session.symbols().iter().map(String::as_str).collect();
                let subscribe = Action::Subscribe { bars };
                if let Err(e) = send(outbound, &subscribe).await {
                    return Some(CloseReason::Connection(e));
                }
                tracing::info!("Authenticated, subscribing");
                step(session, ConnectorState::Subscribed);
            }

            Control::Subscription { bars } => {
                tracing::info!(?bars, "Subscription confirmed");
                if session.state() == ConnectorState::Subscribed {
                    step(session, ConnectorState::Streaming);
                }
            }

            Control::Error { code, message } => {
                let authenticating = matches!(
                    session.state(),
                    ConnectorState::Connecting | ConnectorState::Authenticating
                );
                tracing::error!(code, %message, "Server error");

                return Some(if authenticating || AuthenticationError::is_auth_code(code) {
                    CloseReason::Authentication(AuthenticationError::Rejected { code, message })
                } else {
                    CloseReason::Connection(ConnectionError::Server { code, message })
                });
            }
        }

        None
    }

    async fn await_transport_close(&self, events: &mut mpsc::Receiver<WsEvent>) {
        let drain = async {
            while let Some(event) = events.recv().await {
                if matches!(event, WsEvent::Closed(_)) {
                    break;
                }
            }
        };

        if tokio::time::timeout(self.config.close_timeout, drain)
            .await
            .is_err()
        {
            tracing::warn!(timeout = ?self.config.close_timeout, "Transport did not confirm close");
        }
    }
}

fn step(session: &mut Session, to: ConnectorState) {
    if let Err(e) = session.advance(to) {
        tracing::warn!(error = %e, "Ignoring state change");
    }
}

async fn send(outbound: &mpsc::Sender<String>, action: &Action<'_>) -> Result<(), ConnectionError> {
    let frame =
        serde_json::to_string(action).map_err(|e| ConnectionError::SendFailed(e.to_string()))?;
    outbound
        .send(frame)
        .await
        .map_err(|_| ConnectionError::SendFailed("transport closed".to_string()))
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
