//! CLI interface for bar-stream
//!
//! Provides subcommands for:
//! - `capture`: Stream bars into the table until interrupted
//! - `replay`: Feed recorded frames through the pipeline offline
//! - `verify`: Summarize a persisted table
//! - `config`: Show the effective configuration

mod capture;
mod replay;
mod verify;

pub use capture::CaptureArgs;
pub use replay::ReplayArgs;
pub use verify::{summarize, SymbolSummary, VerifyArgs};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "bar-stream")]
#[command(about = "Stream minute bars from the Alpaca market data feed into a CSV table")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream bars until interrupted
    Capture(CaptureArgs),
    /// Run recorded frames through the decoder and sink
    Replay(ReplayArgs),
    /// Summarize a persisted bar table
    Verify(VerifyArgs),
    /// Show configuration
    Config,
}
