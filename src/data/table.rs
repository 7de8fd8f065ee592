//! Append-only CSV bar table

use crate::error::PersistenceError;
use crate::feed::Bar;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Column names, in order
pub const HEADER: [&str; 9] = [
    "symbol",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "timestamp",
    "trade_count",
    "vwap",
];

/// Durable destination for bar rows
pub trait BarStore {
    /// Append `bars` in order. Either every row becomes durable or the
    /// store is left as it was before the call.
    fn append_rows(&mut self, bars: &[Bar]) -> Result<(), PersistenceError>;
}

/// CSV table opened in append mode
///
/// Rows are written one batch per `write_all`, followed by `sync_data`.
/// A failed batch is rolled back to the last committed length.
#[derive(Debug)]
pub struct CsvTable {
    path: PathBuf,
    file: File,
    committed_len: u64,
}

impl CsvTable {
    /// Open (or create) the table at `path`.
    ///
    /// A new or empty file gets the header row. An existing file must carry
    /// the same header. A torn final row left by a crash is cut off.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| PersistenceError::io(&path, e))?;

        let len = file
            .metadata()
            .map_err(|e| PersistenceError::io(&path, e))?
            .len();

        let mut table = Self {
            path,
            file,
            committed_len: len,
        };

        if len == 0 {
            let header = encode_rows(&table.path, &[], true)?;
            table.write_committed(&header)?;
            tracing::info!(path = ?table.path, "Created bar table");
        } else {
            table.repair_tail()?;
            tracing::info!(path = ?table.path, bytes = table.committed_len, "Opened existing bar table");
        }

        Ok(table)
    }

    /// Path of the table file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_header(&mut self) -> Result<(), PersistenceError> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| PersistenceError::io(&self.path, e))?;

        let mut first = String::new();
        BufReader::new(&self.file)
            .read_line(&mut first)
            .map_err(|e| PersistenceError::io(&self.path, e))?;

        let found = first.trim_end_matches(&['\r', '\n'][..]);
        let expected = HEADER.join(",");
        if found != expected {
            return Err(PersistenceError::HeaderMismatch {
                path: self.path.clone(),
                expected,
                found: found.to_string(),
            });
        }
        Ok(())
    }

    /// Check the header and cut off a partial last row, so the next append
    /// starts on a fresh line.
    ///
    /// A file with no complete line is a header torn during creation: it is
    /// rewritten if it is a prefix of the header and rejected otherwise.
    fn repair_tail(&mut self) -> Result<(), PersistenceError> {
        let keep = self.last_line_end()?;

        if keep == 0 {
            return self.rewrite_torn_header();
        }

        // Only touch the tail of a file that is really a bar table
        self.check_header()?;
        if keep == self.committed_len {
            return Ok(());
        }

        tracing::warn!(
            path = ?self.path,
            dropped_bytes = self.committed_len - keep,
            "Truncating torn final row"
        );
        self.truncate(keep)
    }

    /// Offset just past the last newline, scanning backwards from the end
    fn last_line_end(&mut self) -> Result<u64, PersistenceError> {
        const CHUNK: u64 = 8 * 1024;
        let io = |e| PersistenceError::io(&self.path, e);

        let mut buf = vec![0u8; CHUNK as usize];
        let mut end = self.committed_len;
        while end > 0 {
            let start = end.saturating_sub(CHUNK);
            let chunk = &mut buf[..(end - start) as usize];
            self.file.seek(SeekFrom::Start(start)).map_err(io)?;
            self.file.read_exact(chunk).map_err(io)?;

            if let Some(pos) = chunk.iter().rposition(|b| *b == b'\n') {
                return Ok(start + pos as u64 + 1);
            }
            end = start;
        }
        Ok(0)
    }

    fn rewrite_torn_header(&mut self) -> Result<(), PersistenceError> {
        let expected = HEADER.join(",");
        let mismatch = |found: String| PersistenceError::HeaderMismatch {
            path: self.path.clone(),
            expected: expected.clone(),
            found,
        };

        // Longer than a header line means this was never a bar table
        let limit = expected.len() as u64 + 1;
        let mut content = Vec::new();
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| PersistenceError::io(&self.path, e))?;
        (&self.file)
            .take(limit)
            .read_to_end(&mut content)
            .map_err(|e| PersistenceError::io(&self.path, e))?;

        let found = String::from_utf8_lossy(&content).into_owned();
        let torn = self.committed_len < limit
            && expected.starts_with(found.trim_end_matches('\r'));
        if !torn {
            return Err(mismatch(found));
        }

        tracing::warn!(path = ?self.path, found = %found, "Rewriting torn header");
        self.truncate(0)?;
        let header = encode_rows(&self.path, &[], true)?;
        self.write_committed(&header)
    }

    fn truncate(&mut self, len: u64) -> Result<(), PersistenceError> {
        let io = |e| PersistenceError::io(&self.path, e);
        self.file.set_len(len).map_err(io)?;
        self.file.sync_data().map_err(io)?;
        self.committed_len = len;
        Ok(())
    }

    fn write_committed(&mut self, bytes: &[u8]) -> Result<(), PersistenceError> {
        let result = self
            .file
            .write_all(bytes)
            .and_then(|()| self.file.sync_data());

        match result {
            Ok(()) => {
                self.committed_len += bytes.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.file.set_len(self.committed_len) {
                    tracing::error!(
                        path = ?self.path,
                        error = %rollback,
                        "Failed to roll back partial write"
                    );
                }
                Err(PersistenceError::io(&self.path, e))
            }
        }
    }
}

impl BarStore for CsvTable {
    fn append_rows(&mut self, bars: &[Bar]) -> Result<(), PersistenceError> {
        if bars.is_empty() {
            return Ok(());
        }
        let bytes = encode_rows(&self.path, bars, false)?;
        self.write_committed(&bytes)
    }
}

fn encode_rows(path: &Path, bars: &[Bar], header: bool) -> Result<Vec<u8>, PersistenceError> {
    let csv_err = |source| PersistenceError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut buf = Vec::new();
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(&mut buf);

        if header {
            writer.write_record(HEADER).map_err(csv_err)?;
        }
        for bar in bars {
            writer.write_record(bar_fields(bar)).map_err(csv_err)?;
        }
        writer.flush().map_err(|e| PersistenceError::io(path, e))?;
    }

    Ok(buf)
}

fn bar_fields(bar: &Bar) -> [String; 9] {
    [
        bar.symbol.clone(),
        bar.open.to_string(),
        bar.high.to_string(),
        bar.low.to_string(),
        bar.close.to_string(),
        bar.volume.to_string(),
        bar.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        bar.trade_count.map(|n| n.to_string()).unwrap_or_default(),
        bar.vwap.map(|v| v.to_string()).unwrap_or_default(),
    ]
}

/// Reads a persisted bar table back into memory
pub struct BarTableReader {
    path: PathBuf,
}

impl BarTableReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read every row, in file order
    pub fn read_bars(&self) -> Result<Vec<Bar>, PersistenceError> {
        let csv_err = |source| PersistenceError::Csv {
            path: self.path.clone(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(csv_err)?;

        let headers = reader.headers().map_err(csv_err)?.clone();
        if headers.iter().ne(HEADER) {
            return Err(PersistenceError::HeaderMismatch {
                path: self.path.clone(),
                expected: HEADER.join(","),
                found: headers.iter().collect::<Vec<_>>().join(","),
            });
        }

        let mut bars = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            let bar = parse_row(&record).map_err(|reason| PersistenceError::InvalidRow {
                path: self.path.clone(),
                row: i + 1,
                reason,
            })?;
            bars.push(bar);
        }

        Ok(bars)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_row(record: &csv::StringRecord) -> Result<Bar, String> {
    let field = |i: usize| record.get(i).ok_or_else(|| format!("missing {}", HEADER[i]));
    let decimal = |i: usize| -> Result<Decimal, String> {
        let raw = field(i)?;
        Decimal::from_str(raw).map_err(|e| format!("{}: {e}", HEADER[i]))
    };

    let timestamp = DateTime::parse_from_rfc3339(field(6)?)
        .map_err(|e| format!("timestamp: {e}"))?
        .with_timezone(&Utc);

    let trade_count = match field(7)? {
        "" => None,
        raw => Some(
            raw.parse::<u64>()
                .map_err(|e| format!("trade_count: {e}"))?,
        ),
    };
    let vwap = match field(8)? {
        "" => None,
        _ => Some(decimal(8)?),
    };

    Ok(Bar {
        symbol: field(0)?.to_string(),
        open: decimal(1)?,
        high: decimal(2)?,
        low: decimal(3)?,
        close: decimal(4)?,
        volume: field(5)?
            .parse::<u64>()
            .map_err(|e| format!("volume: {e}"))?,
        timestamp,
        trade_count,
        vwap,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn bar(symbol: &str, minute: u32) -> Bar {
        Bar {
            symbol: symbol.to_string(),
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100.5),
            volume: 1000,
            timestamp: format!("2025-01-01T00:{minute:02}:00Z").parse().unwrap(),
            trade_count: Some(12),
            vwap: Some(dec!(100.25)),
        }
    }

    #[test]
    fn test_new_table_gets_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bars.csv");

        CsvTable::open(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "symbol,open,high,low,close,volume,timestamp,trade_count,vwap\n"
        );
    }

    #[test]
    fn test_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/bars.csv");

        let table = CsvTable::open(&path).unwrap();
        assert_eq!(table.path(), path);
        assert!(path.exists());
    }

    #[test]
    fn test_row_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bars.csv");

        let mut table = CsvTable::open(&path).unwrap();
        let plain = Bar {
            trade_count: None,
            vwap: None,
            ..bar("AAPL", 0)
        };
        table.append_rows(&[plain, bar("MSFT", 1)]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "AAPL,100,101,99,100.5,1000,2025-01-01T00:00:00Z,,");
        assert_eq!(
            lines[2],
            "MSFT,100,101,99,100.5,1000,2025-01-01T00:01:00Z,12,100.25"
        );
    }

    #[test]
    fn test_reopen_appends_without_second_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bars.csv");

        CsvTable::open(&path)
            .unwrap()
            .append_rows(&[bar("AAPL", 0)])
            .unwrap();
        CsvTable::open(&path)
            .unwrap()
            .append_rows(&[bar("AAPL", 1)])
            .unwrap();

        let bars = BarTableReader::new(&path).read_bars().unwrap();
        assert_eq!(bars, vec![bar("AAPL", 0), bar("AAPL", 1)]);
    }

    #[test]
    fn test_header_mismatch_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bars.csv");
        fs::write(&path, "symbol,price\nAAPL,1\n").unwrap();

        let result = CsvTable::open(&path);
        assert!(matches!(
            result,
            Err(PersistenceError::HeaderMismatch { .. })
        ));
        // Existing content is left alone
        assert_eq!(fs::read_to_string(&path).unwrap(), "symbol,price\nAAPL,1\n");
    }

    #[test]
    fn test_torn_row_truncated_on_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bars.csv");

        CsvTable::open(&path)
            .unwrap()
            .append_rows(&[bar("AAPL", 0)])
            .unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"AAPL,100,10").unwrap();
        drop(file);

        CsvTable::open(&path)
            .unwrap()
            .append_rows(&[bar("AAPL", 1)])
            .unwrap();

        let bars = BarTableReader::new(&path).read_bars().unwrap();
        assert_eq!(bars, vec![bar("AAPL", 0), bar("AAPL", 1)]);
    }

    #[test]
    fn test_torn_header_rewritten() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bars.csv");
        fs::write(&path, "symbol,open,hi").unwrap();

        CsvTable::open(&path)
            .unwrap()
            .append_rows(&[bar("AAPL", 0)])
            .unwrap();

        let bars = BarTableReader::new(&path).read_bars().unwrap();
        assert_eq!(bars, vec![bar("AAPL", 0)]);
    }

    #[test]
    fn test_header_without_newline_rewritten() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bars.csv");
        fs::write(&path, HEADER.join(",")).unwrap();

        CsvTable::open(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, format!("{}\n", HEADER.join(",")));
    }

    #[test]
    fn test_foreign_file_without_newline_left_alone() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bars.csv");
        fs::write(&path, "not,a,bar,table").unwrap();

        assert!(matches!(
            CsvTable::open(&path),
            Err(PersistenceError::HeaderMismatch { .. })
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "not,a,bar,table");
    }

    #[test]
    fn test_foreign_file_with_torn_tail_left_alone() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bars.csv");
        fs::write(&path, "symbol,price\nAAPL,1").unwrap();

        assert!(CsvTable::open(&path).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "symbol,price\nAAPL,1");
    }

    #[test]
    fn test_long_torn_row_spanning_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bars.csv");

        let rows: Vec<Bar> = (0..60).map(|m| bar("AAPL", m % 60)).collect();
        CsvTable::open(&path).unwrap().append_rows(&rows).unwrap();
        let intact_len = fs::metadata(&path).unwrap().len();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(format!("AAPL,{}", "9".repeat(20_000)).as_bytes())
            .unwrap();
        drop(file);

        CsvTable::open(&path).unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), intact_len);
        assert_eq!(BarTableReader::new(&path).read_bars().unwrap(), rows);
    }

    #[test]
    fn test_reader_rejects_bad_row() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bars.csv");
        fs::write(
            &path,
            format!("{}\nAAPL,x,1,1,1,1,2025-01-01T00:00:00Z,,\n", HEADER.join(",")),
        )
        .unwrap();

        let result = BarTableReader::new(&path).read_bars();
        assert!(matches!(
            result,
            Err(PersistenceError::InvalidRow { row: 1, .. })
        ));
    }

    #[test]
    fn test_append_empty_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bars.csv");

        let mut table = CsvTable::open(&path).unwrap();
        table.append_rows(&[]).unwrap();

        assert!(BarTableReader::new(&path).read_bars().unwrap().is_empty());
    }
}
