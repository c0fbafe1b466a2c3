//! Error types for configuration loading and collector resolution.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that prevent the exporter from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown collector: {0}")]
    UnknownCollector(String),

    #[error("collectors `{0}` and `{1}` export the same metric names and cannot both be enabled")]
    ConflictingCollectors(&'static str, &'static str),

    #[error("collector `{0}` reads the snapshot cache but no cache_file is configured")]
    MissingCacheFile(String),

    #[error("no connectors configured")]
    NoConnectors,

    #[error("duplicate connector name: {0}")]
    DuplicateConnector(String),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
