//! Reconnect loop
//!
//! Runs successive sessions with the same symbol set until cancelled, a
//! fatal error occurs or the backoff gives up.

use super::backoff::ReconnectPolicy;
use super::connector::Connector;
use super::types::CloseReason;
use crate::config::Credentials;
use crate::error::SessionError;
use crate::telemetry::{increment, CounterMetric};
use crate::ws::Transport;
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;

/// What a supervisor run did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SupervisorReport {
    pub sessions: u32,
    pub bars: u64,
    pub last_close: Option<CloseReason>,
}

pub struct Supervisor<T> {
    connector: Connector<T>,
    /// `None` disables reconnection
    policy: Option<ReconnectPolicy>,
}

impl<T: Transport> Supervisor<T> {
    pub fn new(connector: Connector<T>, policy: Option<ReconnectPolicy>) -> Self {
        Self { connector, policy }
    }

    pub fn connector(&self) -> &Connector<T> {
        &self.connector
    }

    /// Keep a session open until cancelled.
    ///
    /// Returns `Ok` on cancellation or a graceful close with reconnection
    /// disabled. Authentication and sink failures are never retried.
    pub async fn run(
        &self,
        credentials: &Credentials,
        symbols: &BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> Result<SupervisorReport, SessionError> {
        let mut backoff = self.policy.clone();
        let mut report = SupervisorReport::default();

        loop {
            let session = self.connector.connect(credentials, symbols, cancel).await;
            report.sessions += 1;
            report.bars += session.stats().bars;

            let reason = session
                .close_reason()
                .cloned()
                .unwrap_or(CloseReason::Cancelled);
            report.last_close = Some(reason.clone());

            match &reason {
                CloseReason::Cancelled => return Ok(report),
                CloseReason::Authentication(_) | CloseReason::SinkFailed => {
                    tracing::error!(reason = %reason, "Fatal session error, not reconnecting");
                    return Err(reason.as_error().unwrap_or(SessionError::SinkFailed));
                }
                CloseReason::PeerClosed { .. } | CloseReason::Connection(_) => {}
            }

            if cancel.is_cancelled() {
                return Ok(report);
            }

            let Some(policy) = backoff.as_mut() else {
                return finish(report, &reason);
            };
            if session.reached_streaming() {
                policy.reset();
            }
            let Some(delay) = policy.next_delay() else {
                tracing::error!(attempts = policy.attempts(), "Reconnect attempts exhausted");
                return finish(report, &reason);
            };

            increment(CounterMetric::Reconnects, 1);
            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                attempt = policy.attempts(),
                reason = %reason,
                "Reconnecting"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Ok(report),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn finish(
    report: SupervisorReport,
    reason: &CloseReason,
) -> Result<SupervisorReport, SessionError> {
    match reason.as_error() {
        Some(e) => Err(e),
        None => Ok(report),
    }
}
