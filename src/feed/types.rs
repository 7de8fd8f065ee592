//! Feed record types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV observation for one symbol at one minute boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Ticker symbol (e.g., "AAPL")
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Shares traded during the bar
    pub volume: u64,
    /// Start of the bar period
    pub timestamp: DateTime<Utc>,
    /// Number of trades in the bar, when the feed provides it
    pub trade_count: Option<u64>,
    /// Volume-weighted average price, when the feed provides it
    pub vwap: Option<Decimal>,
}

impl Bar {
    /// Check the price invariants: all prices positive, `low <= open, close <= high`
    pub fn is_well_formed(&self) -> bool {
        let positive = [self.open, self.high, self.low, self.close]
            .iter()
            .all(|p| p.is_sign_positive() && !p.is_zero());

        positive
            && !self.symbol.is_empty()
            && self.low <= self.high
            && self.low <= self.open
            && self.open <= self.high
            && self.low <= self.close
            && self.close <= self.high
    }
}

/// Control messages the feed sends around the data stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// `{"T":"success","msg":"connected"}`
    Connected,
    /// `{"T":"success","msg":"authenticated"}`
    Authenticated,
    /// `{"T":"error","code":402,"msg":"auth failed"}`
    Error { code: i64, message: String },
    /// `{"T":"subscription","bars":["AAPL"],...}`
    Subscription { bars: Vec<String> },
}

/// One decoded record of an inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Bar(Bar),
    Control(Control),
    /// A recognised record this pipeline does not persist (trades, quotes, updated bars, ...)
    Skipped { tag: String },
}

/// Outbound control frames
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action<'a> {
    Auth { key: &'a str, secret: &'a str },
    Subscribe { bars: Vec<&'a str> },
}
