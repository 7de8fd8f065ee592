//! Bar sink
//!
//! Persists decoded bars append-only to a CSV table

mod recorder;
mod sink;
mod table;

pub use recorder::{BarHandle, BarRecorder, RecorderStats};
pub use sink::{BarSink, FlushPolicy};
pub use table::{BarStore, BarTableReader, CsvTable, HEADER};
