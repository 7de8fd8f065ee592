//! Flush worker
//!
//! The sink lives on its own task. Producers hand bars over through an
//! unbounded channel, so enqueueing never waits on disk I/O.

use super::sink::BarSink;
use super::table::BarStore;
use crate::error::PersistenceError;
use crate::feed::Bar;
use crate::telemetry::{increment, CounterMetric};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

enum SinkCommand {
    Append(Bar),
    Flush(oneshot::Sender<Result<usize, PersistenceError>>),
    Shutdown,
}

/// Recording statistics
#[derive(Debug, Default, Clone)]
pub struct RecorderStats {
    pub bars_received: u64,
    pub bars_written: u64,
    pub flushes: u64,
    pub flush_failures: u64,
    pub last_flush: Option<chrono::DateTime<Utc>>,
}

/// Cheap, cloneable producer side of a [`BarRecorder`]
#[derive(Clone)]
pub struct BarHandle {
    tx: mpsc::UnboundedSender<SinkCommand>,
}

impl BarHandle {
    /// Enqueue a bar without waiting
    pub fn append(&self, bar: Bar) -> Result<(), PersistenceError> {
        self.tx
            .send(SinkCommand::Append(bar))
            .map_err(|_| PersistenceError::WorkerStopped)
    }

    /// Flush everything enqueued before this call and report the outcome
    pub async fn flush(&self) -> Result<usize, PersistenceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SinkCommand::Flush(reply_tx))
            .map_err(|_| PersistenceError::WorkerStopped)?;
        reply_rx.await.map_err(|_| PersistenceError::WorkerStopped)?
    }

    /// Whether the worker has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owns a [`BarSink`] on a dedicated task
pub struct BarRecorder {
    handle: BarHandle,
    worker: JoinHandle<Result<RecorderStats, PersistenceError>>,
    stats: Arc<RwLock<RecorderStats>>,
}

impl BarRecorder {
    /// Start the flush worker
    pub fn spawn<S>(sink: BarSink<S>) -> Self
    where
        S: BarStore + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(RwLock::new(RecorderStats::default()));

        let worker_stats = stats.clone();
        let worker = tokio::spawn(async move { Self::run_worker(rx, sink, worker_stats).await });

        Self {
            handle: BarHandle { tx },
            worker,
            stats,
        }
    }

    /// Producer handle for the connector
    pub fn handle(&self) -> BarHandle {
        self.handle.clone()
    }

    /// Get current statistics
    pub async fn stats(&self) -> RecorderStats {
        self.stats.read().await.clone()
    }

    /// Flush what is left and stop the worker.
    ///
    /// Bars enqueued before this call are flushed; the final flush completes
    /// before this returns.
    pub async fn shutdown(self) -> Result<RecorderStats, PersistenceError> {
        // A stopped worker already returned its error through the join handle
        let _ = self.handle.tx.send(SinkCommand::Shutdown);
        drop(self.handle);

        match self.worker.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Flush worker panicked");
                Err(PersistenceError::WorkerStopped)
            }
        }
    }

    async fn run_worker<S: BarStore>(
        mut rx: mpsc::UnboundedReceiver<SinkCommand>,
        mut sink: BarSink<S>,
        stats: Arc<RwLock<RecorderStats>>,
    ) -> Result<RecorderStats, PersistenceError> {
        let mut ticker = sink.policy().interval().map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                command = rx.recv() => {
                    match command {
                        Some(SinkCommand::Append(bar)) => {
                            stats.write().await.bars_received += 1;
                            let result = sink.append(bar);
                            if let Err(e) = Self::record_flush(result, &stats, sink.pending()).await {
                                return Err(Self::abandon(&mut rx, sink.pending(), &stats, e).await);
                            }
                        }
                        Some(SinkCommand::Flush(reply)) => {
                            let result = sink.flush();
                            let result = Self::record_flush(result, &stats, sink.pending()).await;
                            if let Err(e) = &result {
                                tracing::warn!(error = %e, pending = sink.pending(), "Requested flush failed");
                            }
                            let _ = reply.send(result);
                        }
                        Some(SinkCommand::Shutdown) | None => {
                            let result = sink.flush();
                            if let Err(e) = Self::record_flush(result, &stats, sink.pending()).await {
                                return Err(Self::abandon(&mut rx, sink.pending(), &stats, e).await);
                            }
                            tracing::info!(persisted = sink.persisted(), "Recorder shutting down");
                            return Ok(stats.read().await.clone());
                        }
                    }
                }

                _ = next_tick(&mut ticker) => {
                    if sink.pending() > 0 {
                        let result = sink.flush();
                        if let Err(e) = Self::record_flush(result, &stats, sink.pending()).await {
                            return Err(Self::abandon(&mut rx, sink.pending(), &stats, e).await);
                        }
                    }
                }
            }
        }
    }

    /// Stop accepting bars after a fatal flush failure.
    ///
    /// Bars still queued are counted together with the `buffered` ones, so the
    /// returned error accounts for every accepted bar that was not written.
    async fn abandon(
        rx: &mut mpsc::UnboundedReceiver<SinkCommand>,
        buffered: usize,
        stats: &Arc<RwLock<RecorderStats>>,
        error: PersistenceError,
    ) -> PersistenceError {
        rx.close();

        let mut queued = 0;
        while let Ok(command) = rx.try_recv() {
            if let SinkCommand::Append(_) = command {
                queued += 1;
            }
        }
        stats.write().await.bars_received += queued as u64;

        let pending = buffered + queued;
        tracing::error!(
            error = %error,
            pending,
            "Flush failed, stopping recorder"
        );
        PersistenceError::FlushFailed {
            pending,
            source: Box::new(error),
        }
    }

    async fn record_flush(
        result: Result<usize, PersistenceError>,
        stats: &Arc<RwLock<RecorderStats>>,
        pending: usize,
    ) -> Result<usize, PersistenceError> {
        let mut s = stats.write().await;
        match &result {
            Ok(0) => {}
            Ok(count) => {
                s.bars_written += *count as u64;
                s.flushes += 1;
                s.last_flush = Some(Utc::now());
                increment(CounterMetric::BarsPersisted, *count as u64);
                tracing::debug!(count, pending, "Flushed bars");
            }
            Err(_) => {
                s.flush_failures += 1;
                increment(CounterMetric::FlushFailures, 1);
            }
        }
        result
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}
