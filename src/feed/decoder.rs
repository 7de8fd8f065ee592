//! Alpaca market data v2 frame decoder
//!
//! Inbound frames are JSON arrays of records tagged by `T`. Only minute bars
//! (`"b"`) become [`Bar`]s; control records drive the connector; everything
//! else is skipped. Errors are scoped to the record that caused them.

use super::types::{Bar, Control, Record};
use crate::error::DecodeError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Minute bar record as sent on the wire
#[derive(Debug, Deserialize)]
struct WireBar {
    #[serde(rename = "S")]
    symbol: String,
    #[serde(rename = "o")]
    open: Decimal,
    #[serde(rename = "h")]
    high: Decimal,
    #[serde(rename = "l")]
    low: Decimal,
    #[serde(rename = "c")]
    close: Decimal,
    #[serde(rename = "v")]
    volume: u64,
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "n", default)]
    trade_count: Option<u64>,
    #[serde(rename = "vw", default)]
    vwap: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct WireSubscription {
    #[serde(default)]
    bars: Vec<String>,
}

/// Decode one inbound frame.
///
/// Accepts either a JSON array of records or a single record object. The
/// result holds one entry per record, in frame order.
pub fn decode(raw: &str) -> Vec<Result<Record, DecodeError>> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => return vec![Err(DecodeError::Malformed(e.to_string()))],
    };

    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| decode_record(index, item))
            .collect(),
        single @ Value::Object(_) => vec![decode_record(0, &single)],
        other => vec![Err(DecodeError::Malformed(format!(
            "expected array or object, got {}",
            json_kind(&other)
        )))],
    }
}

fn decode_record(index: usize, value: &Value) -> Result<Record, DecodeError> {
    let object = value
        .as_object()
        .ok_or(DecodeError::NotAnObject { index })?;

    let tag = object
        .get("T")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingTag { index })?;

    match tag {
        "b" => decode_bar(index, value).map(Record::Bar),
        "success" | "error" | "subscription" => {
            decode_control(index, tag, object, value).map(Record::Control)
        }
        other => Ok(Record::Skipped {
            tag: other.to_string(),
        }),
    }
}

fn decode_bar(index: usize, value: &Value) -> Result<Bar, DecodeError> {
    let wire = WireBar::deserialize(value).map_err(|e| DecodeError::InvalidBar {
        index,
        reason: e.to_string(),
    })?;

    let bar = Bar {
        symbol: wire.symbol,
        open: wire.open,
        high: wire.high,
        low: wire.low,
        close: wire.close,
        volume: wire.volume,
        timestamp: wire.timestamp,
        trade_count: wire.trade_count,
        vwap: wire.vwap,
    };

    if !bar.is_well_formed() {
        return Err(DecodeError::PriceOrdering {
            index,
            symbol: bar.symbol,
        });
    }

    Ok(bar)
}

fn decode_control(
    index: usize,
    tag: &str,
    object: &Map<String, Value>,
    value: &Value,
) -> Result<Control, DecodeError> {
    let invalid = |reason: String| DecodeError::InvalidControl { index, reason };

    match tag {
        "success" => match object.get("msg").and_then(Value::as_str) {
            Some("connected") => Ok(Control::Connected),
            Some("authenticated") => Ok(Control::Authenticated),
            Some(other) => Err(invalid(format!("unknown success message {other:?}"))),
            None => Err(invalid("success without msg".to_string())),
        },
        "error" => {
            let wire = WireError::deserialize(value).map_err(|e| invalid(e.to_string()))?;
            Ok(Control::Error {
                code: wire.code,
                message: wire.msg,
            })
        }
        _ => {
            let wire =
                WireSubscription::deserialize(value).map_err(|e| invalid(e.to_string()))?;
            Ok(Control::Subscription { bars: wire.bars })
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
