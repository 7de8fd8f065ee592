//! Configuration loading

use bar_stream::config::{Config, Feed};
use bar_stream::data::FlushPolicy;
use std::io::Write;
use std::path::Path;

#[test]
fn test_example_config_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.toml.example");
    let config = Config::load(path).unwrap();

    assert_eq!(config.stream.feed, Feed::DelayedSip);
    assert_eq!(
        config.stream.url(),
        "wss://stream.data.alpaca.markets/v2/delayed_sip"
    );
    assert!(config.reconnect.enabled);
    assert_eq!(config.sink.flush_policy(), FlushPolicy::PerBar);
}

#[test]
fn test_partial_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [stream]
        url = "ws://127.0.0.1:9000"
        symbols = ["SPY"]
        "#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.stream.url(), "ws://127.0.0.1:9000");
    assert_eq!(config.stream.symbols, vec!["SPY"]);
    assert_eq!(config.stream.auth_timeout_secs, 10);
}

#[test]
fn test_invalid_config_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[sink]\nflush = \"sometimes\"").unwrap();

    assert!(Config::load(file.path()).is_err());
}
