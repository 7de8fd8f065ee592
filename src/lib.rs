//! bar-stream: streaming minute-bar ingestion
//!
//! This library provides the core components for:
//! - WebSocket transport with keepalive and an offline replay transport
//! - Decoding of Alpaca market data frames into bars and control messages
//! - A connector state machine with authentication and subscription
//! - Reconnection with capped exponential backoff
//! - An append-only CSV bar table behind a flush worker
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod feed;
pub mod stream;
pub mod telemetry;
pub mod ws;
