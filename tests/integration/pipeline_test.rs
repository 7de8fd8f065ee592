//! End-to-end pipeline tests over the replay transport

use bar_stream::config::Credentials;
use bar_stream::data::{BarRecorder, BarSink, BarTableReader, CsvTable, FlushPolicy};
use bar_stream::error::{AuthenticationError, ConnectionError, SessionError};
use bar_stream::stream::{
    Connector, ConnectorConfig, ReconnectConfig, ReconnectPolicy, Supervisor,
};
use bar_stream::ws::{ReplayTransport, TransportClose, WsEvent};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn bar_json(minute: u32) -> String {
    format!(
        r#"{{"T":"b","S":"AAPL","o":100,"h":101,"l":99,"c":100.5,"v":{},"t":"2025-01-01T00:{:02}:00Z"}}"#,
        1000 + minute,
        minute
    )
}

fn frame_text(minutes: &[u32]) -> String {
    let records: Vec<String> = minutes.iter().map(|m| bar_json(*m)).collect();
    format!("[{}]", records.join(","))
}

fn frame(minutes: &[u32]) -> WsEvent {
    WsEvent::Message(frame_text(minutes))
}

fn handshake() -> Vec<WsEvent> {
    vec![
        WsEvent::Opened,
        WsEvent::Message(r#"[{"T":"success","msg":"connected"}]"#.to_string()),
        WsEvent::Message(r#"[{"T":"success","msg":"authenticated"}]"#.to_string()),
        WsEvent::Message(r#"[{"T":"subscription","bars":["AAPL"]}]"#.to_string()),
    ]
}

fn ts(minute: u32) -> DateTime<Utc> {
    format!("2025-01-01T00:{minute:02}:00Z").parse().unwrap()
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy::new(ReconnectConfig {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
        multiplier: 2.0,
        jitter_factor: 0.0,
        max_attempts: 5,
    })
}

fn credentials() -> Credentials {
    Credentials::new("KEY", "SECRET").unwrap()
}

#[tokio::test]
async fn test_reconnect_neither_duplicates_nor_drops_rows() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bars.csv");

    let mut first = handshake();
    first.extend([
        frame(&[0]),
        frame(&[1]),
        frame(&[2]),
        WsEvent::Closed(TransportClose::Failed(ConnectionError::StreamEnded)),
    ]);

    let mut second = handshake();
    second.extend([
        frame(&[3, 4]),
        WsEvent::Closed(TransportClose::Peer {
            code: Some(1001),
            reason: "going away".to_string(),
        }),
    ]);

    let third = vec![
        WsEvent::Opened,
        WsEvent::Message(r#"[{"T":"error","code":402,"msg":"auth failed"}]"#.to_string()),
    ];

    let recorder = BarRecorder::spawn(BarSink::new(
        CsvTable::open(&path).unwrap(),
        FlushPolicy::PerBar,
    ));
    let connector = Connector::new(
        ReplayTransport::new(vec![first, second, third]),
        recorder.handle(),
        ConnectorConfig::default(),
    );
    let supervisor = Supervisor::new(connector, Some(fast_policy()));
    let symbols = BTreeSet::from(["AAPL".to_string()]);

    let result = supervisor
        .run(&credentials(), &symbols, &CancellationToken::new())
        .await;

    assert_eq!(
        result,
        Err(SessionError::Authentication(AuthenticationError::Rejected {
            code: 402,
            message: "auth failed".to_string()
        }))
    );

    let stats = recorder.shutdown().await.unwrap();
    assert_eq!(stats.bars_received, 5);
    assert_eq!(stats.bars_written, 5);

    let bars = BarTableReader::new(&path).read_bars().unwrap();
    let timestamps: Vec<_> = bars.iter().map(|b| b.timestamp).collect();
    assert_eq!(timestamps, (0..5).map(ts).collect::<Vec<_>>());
    assert_eq!(bars[4].volume, 1004);

    // Every session authenticates again and the data sessions re-subscribe
    let mut sent = Vec::new();
    for _ in 0..100 {
        sent = supervisor.connector().transport().sent();
        if sent.len() >= 5 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let subscribes: Vec<_> = sent.iter().filter(|f| f.contains("subscribe")).collect();
    assert_eq!(sent.len(), 5);
    assert_eq!(subscribes.len(), 2);
    assert!(subscribes
        .iter()
        .all(|f| *f == r#"{"action":"subscribe","bars":["AAPL"]}"#));
}

#[tokio::test]
async fn test_table_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bars.csv");
    let symbols = BTreeSet::from(["AAPL".to_string()]);

    for minutes in [[0, 1], [2, 3]] {
        let recorder = BarRecorder::spawn(BarSink::new(
            CsvTable::open(&path).unwrap(),
            FlushPolicy::Batched {
                max_bars: 10,
                max_interval: Duration::from_secs(60),
            },
        ));
        let connector = Connector::new(
            ReplayTransport::from_frames(vec![frame_text(&minutes)]),
            recorder.handle(),
            ConnectorConfig::default(),
        );

        let report = Supervisor::new(connector, None)
            .run(&credentials(), &symbols, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.bars, 2);

        // Batched bars are only durable after shutdown
        recorder.shutdown().await.unwrap();
    }

    let bars = BarTableReader::new(&path).read_bars().unwrap();
    assert_eq!(bars.len(), 4);
    assert_eq!(bars[3].timestamp, ts(3));
}
