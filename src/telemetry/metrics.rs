//! Pipeline counters
//!
//! Recorded through the `metrics` facade; exported over HTTP in Prometheus
//! format when a metrics port is configured.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Counter metric types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterMetric {
    /// Bars decoded and handed to the sink
    BarsDecoded,
    /// Records that failed to decode
    DecodeErrors,
    /// Recognised records that are not persisted (trades, quotes, ...)
    RecordsSkipped,
    /// Rows made durable
    BarsPersisted,
    /// Failed flushes
    FlushFailures,
    /// Sessions opened after the first
    Reconnects,
}

impl CounterMetric {
    pub fn name(self) -> &'static str {
        match self {
            CounterMetric::BarsDecoded => "barstream_bars_decoded_total",
            CounterMetric::DecodeErrors => "barstream_decode_errors_total",
            CounterMetric::RecordsSkipped => "barstream_records_skipped_total",
            CounterMetric::BarsPersisted => "barstream_bars_persisted_total",
            CounterMetric::FlushFailures => "barstream_flush_failures_total",
            CounterMetric::Reconnects => "barstream_reconnects_total",
        }
    }
}

/// Increment a counter
pub fn increment(metric: CounterMetric, value: u64) {
    ::metrics::counter!(metric.name()).increment(value);
}

/// Set the connector state gauge (see `ConnectorState::as_gauge`)
pub fn set_connector_state(value: f64) {
    ::metrics::gauge!("barstream_connector_state").set(value);
}

/// Serve `/metrics` on the given port
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;

    tracing::info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}
