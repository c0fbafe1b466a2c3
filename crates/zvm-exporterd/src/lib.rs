//! zvm-exporterd — assembles the exporter from its configuration.
//!
//! Startup order: validate the configuration, build one connector per
//! `[[connectors]]` entry, open the snapshot cache if a cache-backed
//! collector is enabled, instantiate the collectors, then bind and serve.
//! Any failure before the bind aborts startup.

pub mod app;

pub use app::{Exporter, check_config};
