//! Integration tests

mod config_test;
mod decode_test;
mod pipeline_test;
