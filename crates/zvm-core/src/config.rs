//! Exporter configuration (TOML).
//!
//! Loaded once at startup and passed by value into each component. Every
//! field has a default, so an absent file or an empty table is a valid
//! configuration.
//!
//! ```toml
//! enabled_collectors = ["guests", "cached_host"]
//! listen_port = 9183
//! cache_file = "/var/cache/zvm-exporter/snapshot.json"
//! cache_refresh_interval = 900
//!
//! [[connectors]]
//! name = "zvm1"
//! url = "http://10.0.0.5:8080"
//! ```

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::CollectorKind;

/// Upper bound accepted for `max_concurrent_scrapes`.
pub const MAX_CONCURRENT_SCRAPES: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExporterConfig {
    /// Collector names, resolved against [`CollectorKind`].
    pub enabled_collectors: Vec<String>,
    pub listen_address: IpAddr,
    pub listen_port: u16,
    /// Snapshot file; required when a cache-backed collector is enabled.
    pub cache_file: Option<PathBuf>,
    /// Seconds between refresher cycles.
    pub cache_refresh_interval: u64,
    /// Upper bound in seconds on one refresher fetch.
    pub fetch_timeout: u64,
    /// Upper bound in seconds on one direct collector call.
    pub source_timeout: u64,
    /// Cap on concurrently running `/metrics` collections. Unbounded when unset.
    pub max_concurrent_scrapes: Option<usize>,
    /// Value of the `cloud` label on cache meta-metrics.
    pub cloud: String,
    pub connectors: Vec<ConnectorConfig>,
}

/// One z/VM Cloud Connector endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectorConfig {
    /// Used as the `host` label value.
    pub name: String,
    /// Base URL, e.g. `http://10.0.0.5:8080`.
    pub url: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            enabled_collectors: Vec::new(),
            listen_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: 9183,
            cache_file: None,
            cache_refresh_interval: 900,
            fetch_timeout: 60,
            source_timeout: 10,
            max_concurrent_scrapes: None,
            cloud: "zvm".to_string(),
            connectors: vec![ConnectorConfig {
                name: "localhost".to_string(),
                url: "http://127.0.0.1:8080".to_string(),
            }],
        }
    }
}

impl ExporterConfig {
    /// Read and parse a config file. Does not validate; see [`ExporterConfig::validate`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve `enabled_collectors` against the static registry.
    ///
    /// An empty list falls back to [`CollectorKind::DEFAULT`]. Repeated names
    /// are kept once, in first-seen order.
    pub fn collectors(&self) -> Result<Vec<CollectorKind>, ConfigError> {
        if self.enabled_collectors.is_empty() {
            return Ok(vec![CollectorKind::DEFAULT]);
        }

        let mut kinds = Vec::with_capacity(self.enabled_collectors.len());
        for name in &self.enabled_collectors {
            let kind: CollectorKind = name.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    /// Check the whole configuration and return the resolved collectors.
    pub fn validate(&self) -> Result<Vec<CollectorKind>, ConfigError> {
        let kinds = self.collectors()?;

        for (i, a) in kinds.iter().enumerate() {
            if let Some(b) = kinds[i + 1..].iter().find(|b| a.conflicts_with(**b)) {
                return Err(ConfigError::ConflictingCollectors(a.name(), b.name()));
            }
        }

        if let Some(kind) = kinds.iter().find(|k| k.uses_cache()) {
            if self.cache_file.is_none() {
                return Err(ConfigError::MissingCacheFile(kind.name().to_string()));
            }
        }

        if self.connectors.is_empty() {
            return Err(ConfigError::NoConnectors);
        }
        let mut seen = HashSet::new();
        for connector in &self.connectors {
            if connector.name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "connectors.name",
                    reason: "must not be empty".to_string(),
                });
            }
            if !seen.insert(connector.name.as_str()) {
                return Err(ConfigError::DuplicateConnector(connector.name.clone()));
            }
        }

        if self.cache_refresh_interval == 0 {
            return Err(ConfigError::Invalid {
                field: "cache_refresh_interval",
                reason: "must be at least 1 second".to_string(),
            });
        }
        if self.fetch_timeout == 0 || self.source_timeout == 0 {
            return Err(ConfigError::Invalid {
                field: "timeout",
                reason: "fetch_timeout and source_timeout must be at least 1 second".to_string(),
            });
        }
        if let Some(limit) = self.max_concurrent_scrapes {
            if !(1..=MAX_CONCURRENT_SCRAPES).contains(&limit) {
                return Err(ConfigError::Invalid {
                    field: "max_concurrent_scrapes",
                    reason: format!("must be between 1 and {MAX_CONCURRENT_SCRAPES} when set"),
                });
            }
        }

        Ok(kinds)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.listen_port)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.cache_refresh_interval)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout)
    }
}
