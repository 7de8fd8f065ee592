//! Bar sink: arrival-ordered buffer plus flush policy

use super::table::{BarStore, CsvTable};
use crate::error::PersistenceError;
use crate::feed::Bar;
use std::time::Duration;

/// When buffered bars are written to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushPolicy {
    /// Append every bar as soon as it arrives
    #[default]
    PerBar,
    /// Append when `max_bars` are buffered or `max_interval` has passed
    Batched {
        max_bars: usize,
        max_interval: Duration,
    },
}

impl FlushPolicy {
    /// Whether `pending` buffered bars should be flushed now
    pub fn should_flush(&self, pending: usize) -> bool {
        match self {
            FlushPolicy::PerBar => pending > 0,
            FlushPolicy::Batched { max_bars, .. } => pending >= (*max_bars).max(1),
        }
    }

    /// Time-based flush interval, if any
    pub fn interval(&self) -> Option<Duration> {
        match self {
            FlushPolicy::PerBar => None,
            FlushPolicy::Batched { max_interval, .. } => Some(*max_interval),
        }
    }
}

/// Buffers bars in arrival order and flushes them to a [`BarStore`]
pub struct BarSink<S = CsvTable> {
    store: S,
    buffer: Vec<Bar>,
    policy: FlushPolicy,
    persisted: u64,
}

impl<S: BarStore> BarSink<S> {
    pub fn new(store: S, policy: FlushPolicy) -> Self {
        Self {
            store,
            buffer: Vec::new(),
            policy,
            persisted: 0,
        }
    }

    /// Buffer a bar, flushing if the policy says so.
    ///
    /// Returns the number of rows made durable by this call. On error the
    /// bar stays buffered.
    pub fn append(&mut self, bar: Bar) -> Result<usize, PersistenceError> {
        self.buffer.push(bar);
        if self.policy.should_flush(self.buffer.len()) {
            self.flush()
        } else {
            Ok(0)
        }
    }

    /// Write every buffered bar. On error nothing is removed from the buffer.
    pub fn flush(&mut self) -> Result<usize, PersistenceError> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        self.store.append_rows(&self.buffer)?;

        let count = self.buffer.len();
        self.buffer.clear();
        self.persisted += count as u64;
        Ok(count)
    }

    /// Bars waiting for a flush
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Bars made durable over the lifetime of this sink
    pub fn persisted(&self) -> u64 {
        self.persisted
    }

    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }
}
