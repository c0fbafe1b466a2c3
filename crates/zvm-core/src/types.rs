//! Shared types used across zvm-exporter crates.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Measurement name → value for a single resource.
pub type Measurements = BTreeMap<String, f64>;

/// One complete capture of backend state.
///
/// Built wholesale by the refresher and never modified afterwards; the
/// snapshot store hands out shared `Arc<Snapshot>` references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Resource identifier (connector name) → measurements.
    pub resources: BTreeMap<String, Measurements>,
    /// Wall-clock time the snapshot was assembled.
    pub captured_at: SystemTime,
    /// How long the upstream fetch took.
    pub fetch_duration: Duration,
}

impl Snapshot {
    /// Build a snapshot captured now.
    pub fn new(resources: BTreeMap<String, Measurements>, fetch_duration: Duration) -> Self {
        Self {
            resources,
            captured_at: SystemTime::now(),
            fetch_duration,
        }
    }

    /// Time elapsed since capture. Clamped to zero if the clock went backwards.
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.captured_at)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// The closed set of collectors the exporter knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectorKind {
    /// Queries every connector for host info on each scrape.
    Host,
    /// Queries every connector for its guest list on each scrape.
    Guests,
    /// Serves host info from the refreshed snapshot cache.
    CachedHost,
}

impl CollectorKind {
    /// Collector used when the configuration enables none.
    pub const DEFAULT: CollectorKind = CollectorKind::Host;

    pub const ALL: [CollectorKind; 3] = [
        CollectorKind::Host,
        CollectorKind::Guests,
        CollectorKind::CachedHost,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CollectorKind::Host => "host",
            CollectorKind::Guests => "guests",
            CollectorKind::CachedHost => "cached_host",
        }
    }

    /// Whether this collector reads the snapshot cache (and so needs the refresher).
    pub fn uses_cache(&self) -> bool {
        matches!(self, CollectorKind::CachedHost)
    }

    /// Whether both collectors emit the same metric families.
    pub fn conflicts_with(&self, other: CollectorKind) -> bool {
        matches!(
            (self, other),
            (CollectorKind::Host, CollectorKind::CachedHost)
                | (CollectorKind::CachedHost, CollectorKind::Host)
        )
    }
}

impl FromStr for CollectorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CollectorKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s.trim())
            .ok_or_else(|| ConfigError::UnknownCollector(s.to_string()))
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
