//! Replay transport
//!
//! Plays back scripted connections instead of touching the network. Each
//! call to [`Transport::open`] consumes the next script. Outbound frames the
//! consumer sends are recorded and can be inspected with [`ReplayTransport::sent`].

use super::types::{TransportClose, WsConnection, WsEvent};
use super::Transport;
use crate::error::ConnectionError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Transport that replays pre-recorded event scripts
#[derive(Default)]
pub struct ReplayTransport {
    scripts: Mutex<VecDeque<Vec<WsEvent>>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ReplayTransport {
    /// One script per connection, consumed in order
    pub fn new(scripts: Vec<Vec<WsEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            sent: Arc::default(),
        }
    }

    /// A single connection that acknowledges the handshake, delivers
    /// `frames` and then closes normally
    pub fn from_frames(frames: Vec<String>) -> Self {
        let mut script = Vec::with_capacity(frames.len() + 4);
        script.push(WsEvent::Opened);
        script.push(WsEvent::Message(
            r#"[{"T":"success","msg":"authenticated"}]"#.to_string(),
        ));
        script.push(WsEvent::Message(r#"[{"T":"subscription"}]"#.to_string()));
        script.extend(frames.into_iter().map(WsEvent::Message));
        script.push(WsEvent::Closed(TransportClose::Peer {
            code: Some(1000),
            reason: "replay finished".to_string(),
        }));
        Self::new(vec![script])
    }

    /// Every outbound frame sent so far, across all connections
    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of scripts not yet consumed
    pub fn remaining(&self) -> usize {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Transport for ReplayTransport {
    fn open(&self) -> WsConnection {
        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                vec![WsEvent::Closed(TransportClose::Failed(
                    ConnectionError::ConnectFailed("replay exhausted".to_string()),
                ))]
            });

        let (event_tx, event_rx) = mpsc::channel(script.len().max(1) + 1);
        let (send_tx, mut send_rx) = mpsc::channel::<String>(64);
        let sent = Arc::clone(&self.sent);

        tokio::spawn(async move {
            let mut closed = false;
            for event in script {
                closed = matches!(event, WsEvent::Closed(_));
                if event_tx.send(event).await.is_err() || closed {
                    break;
                }
            }

            // Behave like a live peer: keep the connection open until the
            // consumer hangs up, recording what it sends.
            while let Some(frame) = send_rx.recv().await {
                sent.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(frame);
            }

            if !closed {
                let _ = event_tx.send(WsEvent::Closed(TransportClose::Local)).await;
            }
        });

        WsConnection {
            events: event_rx,
            outbound: send_tx,
        }
    }
}
