//! Replay command implementation

use super::capture::{record, symbol_set};
use crate::config::{Config, Credentials};
use crate::ws::ReplayTransport;
use anyhow::Context;
use clap::Args;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// File with one recorded JSON frame per line
    pub input: PathBuf,

    /// Output table (overrides config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ReplayArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let content = std::fs::read_to_string(&self.input)
            .with_context(|| format!("reading {}", self.input.display()))?;
        let frames: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        let output = self.output.as_deref().unwrap_or(&config.sink.path);
        tracing::info!(
            input = %self.input.display(),
            frames = frames.len(),
            output = %output.display(),
            "Replaying frames"
        );

        // The replay peer accepts any credentials
        let credentials = Credentials::new("replay", "replay")?;
        let report = record(
            ReplayTransport::from_frames(frames),
            config,
            output,
            &credentials,
            &symbol_set(&config.stream.symbols),
            None,
            &CancellationToken::new(),
        )
        .await?;

        println!("Replayed {} bars into {}", report.bars, output.display());
        Ok(())
    }
}
