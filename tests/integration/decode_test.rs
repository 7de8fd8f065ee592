//! Decoder behaviour through the public API

use bar_stream::error::DecodeError;
use bar_stream::feed::{decode, Record};
use rust_decimal_macros::dec;

#[test]
fn test_minute_bar_decodes() {
    let results = decode(
        r#"[{"T":"b","S":"AAPL","o":100,"h":101,"l":99,"c":100.5,"v":1000,"t":"2025-01-01T00:00:00Z"}]"#,
    );

    assert_eq!(results.len(), 1);
    match &results[0] {
        Ok(Record::Bar(bar)) => {
            assert_eq!(bar.symbol, "AAPL");
            assert_eq!(bar.open, dec!(100));
            assert_eq!(bar.close, dec!(100.5));
            assert_eq!(bar.volume, 1000);
        }
        other => panic!("expected a bar, got {other:?}"),
    }
}

#[test]
fn test_quote_yields_no_bar_and_no_error() {
    let results = decode(r#"[{"T":"q","S":"AAPL","bp":100.1}]"#);

    assert!(results
        .iter()
        .all(|r| matches!(r, Ok(Record::Skipped { .. }))));
}

#[test]
fn test_bad_record_does_not_poison_batch() {
    let results = decode(
        r#"[
            {"T":"b","S":"AAPL","o":100,"h":101,"l":99,"v":1000,"t":"2025-01-01T00:00:00Z"},
            {"T":"b","S":"MSFT","o":400,"h":401,"l":399,"c":400.5,"v":10,"t":"2025-01-01T00:00:00Z"}
        ]"#,
    );

    assert_eq!(results.len(), 2);
    assert!(matches!(
        results[0],
        Err(DecodeError::InvalidBar { index: 0, .. })
    ));
    assert!(matches!(&results[1], Ok(Record::Bar(bar)) if bar.symbol == "MSFT"));
}
