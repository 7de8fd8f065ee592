//! Bar decoder
//!
//! Turns raw market data frames into typed records

mod decoder;
mod types;

pub use decoder::decode;
pub use types::{Action, Bar, Control, Record};
