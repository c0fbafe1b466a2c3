//! zvm-core — types and configuration shared by every zvm-exporter crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ConnectorConfig, ExporterConfig, MAX_CONCURRENT_SCRAPES};
pub use error::ConfigError;
pub use types::*;
