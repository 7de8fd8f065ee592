use bar_stream::cli::{Cli, Commands};
use bar_stream::config::{Config, Credentials};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            toml::from_str(include_str!("../config.toml.example"))?
        }
    };

    // Initialize telemetry
    bar_stream::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Capture(args) => {
            tracing::info!("Starting capture mode");
            args.execute(&config).await?;
        }
        Commands::Replay(args) => {
            tracing::info!("Starting replay");
            args.execute(&config).await?;
        }
        Commands::Verify(args) => {
            args.execute().await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Stream: {}", config.stream.url());
            println!("  Symbols: {}", config.stream.symbols.join(", "));
            println!(
                "  Reconnect: enabled={}, initial={}ms, max={}s, attempts={}",
                config.reconnect.enabled,
                config.reconnect.initial_delay_ms,
                config.reconnect.max_delay_secs,
                config.reconnect.max_attempts
            );
            println!(
                "  Sink: {} ({:?})",
                config.sink.path.display(),
                config.sink.flush_policy()
            );
            println!(
                "  Credentials: {}",
                match Credentials::from_env() {
                    Ok(_) => "set".to_string(),
                    Err(e) => e.to_string(),
                }
            );
        }
    }

    Ok(())
}
