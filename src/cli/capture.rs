//! Capture command implementation

use crate::config::{Config, Credentials};
use crate::data::{BarRecorder, BarSink, CsvTable};
use crate::stream::{Connector, ReconnectPolicy, Supervisor, SupervisorReport};
use crate::ws::{Transport, WsClient};
use anyhow::Context;
use clap::Args;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct CaptureArgs {
    /// Symbols to subscribe to, comma separated (overrides config)
    #[arg(short, long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Output table (overrides config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Stop after the first session instead of reconnecting
    #[arg(long)]
    pub once: bool,
}

impl CaptureArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let credentials = Credentials::from_env()?;

        let symbols = if self.symbols.is_empty() {
            &config.stream.symbols
        } else {
            &self.symbols
        };
        let symbols = symbol_set(symbols);
        if symbols.is_empty() {
            anyhow::bail!("no symbols configured; pass --symbols or set stream.symbols");
        }

        let output = self.output.as_deref().unwrap_or(&config.sink.path);
        let policy = (config.reconnect.enabled && !self.once)
            .then(|| ReconnectPolicy::new(config.reconnect.reconnect_config()));

        tracing::info!(
            url = %config.stream.url(),
            ?symbols,
            output = %output.display(),
            reconnect = policy.is_some(),
            "Starting capture"
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, closing stream");
                trigger.cancel();
            }
        });

        let report = record(
            WsClient::new(config.stream.ws_config()),
            config,
            output,
            &credentials,
            &symbols,
            policy,
            &cancel,
        )
        .await?;

        println!(
            "Captured {} bars over {} session(s) into {}",
            report.bars,
            report.sessions,
            output.display()
        );
        Ok(())
    }
}

/// Trimmed, upper-cased, de-duplicated symbols
pub(crate) fn symbol_set(symbols: &[String]) -> BTreeSet<String> {
    symbols
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Run the full pipeline over `transport` and shut the sink down cleanly.
///
/// The recorder is always drained, even when the stream ends with an error.
pub(crate) async fn record<T: Transport>(
    transport: T,
    config: &Config,
    output: &Path,
    credentials: &Credentials,
    symbols: &BTreeSet<String>,
    policy: Option<ReconnectPolicy>,
    cancel: &CancellationToken,
) -> anyhow::Result<SupervisorReport> {
    let table = CsvTable::open(output)
        .with_context(|| format!("opening bar table {}", output.display()))?;
    let recorder = BarRecorder::spawn(BarSink::new(table, config.sink.flush_policy()));

    let connector = Connector::new(
        transport,
        recorder.handle(),
        config.stream.connector_config(),
    )
    .on_close(|reason| {
        if let Some(e) = reason.as_error() {
            tracing::warn!(error = %e, code = reason.code(), "Session ended with error");
        }
    });
    let supervisor = Supervisor::new(connector, policy);

    let result = supervisor.run(credentials, symbols, cancel).await;
    let stats = recorder.shutdown().await;

    match &stats {
        Ok(stats) => tracing::info!(
            received = stats.bars_received,
            written = stats.bars_written,
            flushes = stats.flushes,
            "Recorder stopped"
        ),
        Err(e) => tracing::error!(error = %e, "Recorder failed"),
    }

    let report = result?;
    stats?;
    Ok(report)
}
