//! Verify command implementation

use crate::data::BarTableReader;
use chrono::{DateTime, Utc};
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Bar table to check
    pub path: PathBuf,
}

/// Per-symbol table summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolSummary {
    pub rows: usize,
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
    /// Rows whose timestamp is not after the previous row for the same symbol
    pub out_of_order: usize,
}

impl VerifyArgs {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let bars = BarTableReader::new(&self.path).read_bars()?;
        let summary = summarize(bars.iter().map(|b| (b.symbol.as_str(), b.timestamp)));

        println!("{}: {} rows", self.path.display(), bars.len());
        println!(
            "{:<10} {:>8}  {:<25} {:<25} {:>12}",
            "symbol", "rows", "first", "last", "out of order"
        );
        for (symbol, s) in &summary {
            println!(
                "{:<10} {:>8}  {:<25} {:<25} {:>12}",
                symbol,
                s.rows,
                s.first.to_rfc3339(),
                s.last.to_rfc3339(),
                s.out_of_order
            );
        }

        let out_of_order: usize = summary.values().map(|s| s.out_of_order).sum();
        if out_of_order > 0 {
            tracing::warn!(out_of_order, "Table has repeated or regressing timestamps");
        }
        Ok(())
    }
}

/// Group rows by symbol in table order
pub fn summarize<'a>(
    rows: impl IntoIterator<Item = (&'a str, DateTime<Utc>)>,
) -> BTreeMap<String, SymbolSummary> {
    let mut summary: BTreeMap<String, SymbolSummary> = BTreeMap::new();

    for (symbol, timestamp) in rows {
        match summary.get_mut(symbol) {
            Some(s) => {
                if timestamp <= s.last {
                    s.out_of_order += 1;
                }
                s.rows += 1;
                s.first = s.first.min(timestamp);
                s.last = s.last.max(timestamp);
            }
            None => {
                summary.insert(
                    symbol.to_string(),
                    SymbolSummary {
                        rows: 1,
                        first: timestamp,
                        last: timestamp,
                        out_of_order: 0,
                    },
                );
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(minute: u32) -> DateTime<Utc> {
        format!("2025-01-01T00:{minute:02}:00Z").parse().unwrap()
    }

    #[test]
    fn test_summarize() {
        let summary = summarize([
            ("AAPL", ts(0)),
            ("MSFT", ts(0)),
            ("AAPL", ts(1)),
            ("AAPL", ts(1)),
            ("MSFT", ts(2)),
        ]);

        assert_eq!(
            summary["AAPL"],
            SymbolSummary {
                rows: 3,
                first: ts(0),
                last: ts(1),
                out_of_order: 1
            }
        );
        assert_eq!(summary["MSFT"].rows, 2);
        assert_eq!(summary["MSFT"].out_of_order, 0);
    }

    #[test]
    fn test_summarize_empty() {
        assert!(summarize(std::iter::empty()).is_empty());
    }
}
