//! Collectors — turn live or cached backend data into metric samples.
//!
//! The registry is closed: [`CollectorSet::build`] maps each configured
//! [`CollectorKind`] to a [`Collector`] once at startup. Collectors hold only
//! shared handles (data sources, the snapshot store) and never mutate them,
//! so one set serves every concurrent scrape.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use zvm_core::{CollectorKind, ConfigError};
use zvm_source::{DataSource, SourceRequest, fetch_with_timeout, guest_count, numeric_fields};
use zvm_state::SnapshotStore;

use crate::error::CollectionError;
use crate::exposition::{MetricSample, encode, sanitize_metric_name};

/// Host-info fields exported by the live `host` collector.
struct HostGauge {
    field: &'static str,
    help: &'static str,
    required: bool,
}

const HOST_GAUGES: &[HostGauge] = &[
    HostGauge { field: "disk_used", help: "Disk space used on the host, in GB.", required: true },
    HostGauge { field: "disk_total", help: "Total disk space on the host, in GB.", required: true },
    HostGauge { field: "disk_available", help: "Free disk space on the host, in GB.", required: false },
    HostGauge { field: "memory_mb", help: "Memory available to guests, in MB.", required: false },
    HostGauge { field: "memory_mb_used", help: "Memory used by guests, in MB.", required: false },
    HostGauge { field: "vcpus", help: "Virtual CPUs on the host.", required: false },
    HostGauge { field: "vcpus_used", help: "Virtual CPUs in use.", required: false },
];

/// Queries every data source for host info on each scrape.
pub struct HostCollector {
    sources: Vec<Arc<dyn DataSource>>,
    timeout: Duration,
}

impl HostCollector {
    pub fn new(sources: Vec<Arc<dyn DataSource>>, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    async fn produce_samples(&self) -> Result<Vec<MetricSample>, CollectionError> {
        let collector = CollectorKind::Host.name();
        let mut samples = Vec::new();

        for source in &self.sources {
            let payload = fetch_with_timeout(source.as_ref(), SourceRequest::HostInfo, self.timeout)
                .await
                .map_err(|e| CollectionError::Fetch { collector, source: e })?;
            let fields = numeric_fields(source.name(), &payload)
                .map_err(|e| CollectionError::Fetch { collector, source: e })?;

            for gauge in HOST_GAUGES {
                match fields.get(gauge.field) {
                    Some(value) => samples.push(
                        MetricSample::gauge(gauge.field, gauge.help, *value)
                            .with_label("host", source.name()),
                    ),
                    None if gauge.required => {
                        return Err(CollectionError::MissingField {
                            collector,
                            source_name: source.name().to_string(),
                            field: gauge.field,
                        });
                    }
                    None => {}
                }
            }
        }

        Ok(samples)
    }
}

/// Queries every data source for its guest list on each scrape.
pub struct GuestsCollector {
    sources: Vec<Arc<dyn DataSource>>,
    timeout: Duration,
}

impl GuestsCollector {
    pub fn new(sources: Vec<Arc<dyn DataSource>>, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    async fn produce_samples(&self) -> Result<Vec<MetricSample>, CollectionError> {
        let collector = CollectorKind::Guests.name();
        let mut samples = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let payload = fetch_with_timeout(source.as_ref(), SourceRequest::GuestList, self.timeout)
                .await
                .map_err(|e| CollectionError::Fetch { collector, source: e })?;
            let count = guest_count(source.name(), &payload)
                .map_err(|e| CollectionError::Fetch { collector, source: e })?;
            samples.push(
                MetricSample::gauge("guests_total", "Guests defined on the host.", count as f64)
                    .with_label("host", source.name()),
            );
        }

        Ok(samples)
    }
}

const CACHE_AGE_METRIC: &str = "cache_age_seconds";
const CACHE_REFRESH_DURATION_METRIC: &str = "cache_refresh_duration_seconds";
/// Names labelled by `cloud`; cached fields may not take them.
const CACHE_META_METRICS: [&str; 2] = [CACHE_AGE_METRIC, CACHE_REFRESH_DURATION_METRIC];

/// Serves the refreshed snapshot plus cache age and refresh duration.
pub struct CachedHostCollector {
    store: SnapshotStore,
    cloud: String,
}

impl CachedHostCollector {
    pub fn new(store: SnapshotStore, cloud: impl Into<String>) -> Self {
        Self {
            store,
            cloud: cloud.into(),
        }
    }

    fn produce_samples(&self) -> Result<Vec<MetricSample>, CollectionError> {
        let collector = CollectorKind::CachedHost.name();
        let (snapshot, age) = self
            .store
            .current()
            .map_err(|e| CollectionError::Cache { collector, source: e })?;

        let mut samples = Vec::new();
        for (resource, measurements) in &snapshot.resources {
            let mut emitted = HashSet::new();
            for (field, value) in measurements {
                let name = sanitize_metric_name(field);
                if CACHE_META_METRICS.contains(&name.as_str()) || !emitted.insert(name.clone()) {
                    debug!(resource = %resource, field = %field, metric = %name, "skipping colliding cached field");
                    continue;
                }
                let help = format!("Cached host measurement {field}.");
                samples.push(MetricSample::gauge(name, help, *value).with_label("host", resource.as_str()));
            }
        }

        samples.push(
            MetricSample::gauge(
                CACHE_AGE_METRIC,
                "Age of the cached snapshot in seconds.",
                age.as_secs_f64(),
            )
            .with_label("cloud", self.cloud.as_str()),
        );
        samples.push(
            MetricSample::gauge(
                CACHE_REFRESH_DURATION_METRIC,
                "Cache refresh duration in seconds.",
                self.store.last_fetch_duration().as_secs_f64(),
            )
            .with_label("cloud", self.cloud.as_str()),
        );

        Ok(samples)
    }
}

/// One enabled collector.
pub enum Collector {
    Host(HostCollector),
    Guests(GuestsCollector),
    CachedHost(CachedHostCollector),
}

impl Collector {
    pub fn kind(&self) -> CollectorKind {
        match self {
            Collector::Host(_) => CollectorKind::Host,
            Collector::Guests(_) => CollectorKind::Guests,
            Collector::CachedHost(_) => CollectorKind::CachedHost,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub async fn produce_samples(&self) -> Result<Vec<MetricSample>, CollectionError> {
        match self {
            Collector::Host(c) => c.produce_samples().await,
            Collector::Guests(c) => c.produce_samples().await,
            Collector::CachedHost(c) => c.produce_samples(),
        }
    }
}

/// Everything collectors may need, handed over once at startup.
#[derive(Clone)]
pub struct CollectorDeps {
    pub sources: Vec<Arc<dyn DataSource>>,
    /// Required when a cache-backed collector is enabled.
    pub store: Option<SnapshotStore>,
    /// Bound on each direct data source call.
    pub source_timeout: Duration,
    /// `cloud` label value for cache meta-metrics.
    pub cloud: String,
}

/// The enabled collectors, in configuration order.
pub struct CollectorSet {
    collectors: Vec<Collector>,
}

impl CollectorSet {
    /// Instantiate `kinds` against `deps`.
    pub fn build(kinds: &[CollectorKind], deps: &CollectorDeps) -> Result<Self, ConfigError> {
        let mut collectors = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let collector = match kind {
                CollectorKind::Host => Collector::Host(HostCollector::new(
                    deps.sources.clone(),
                    deps.source_timeout,
                )),
                CollectorKind::Guests => Collector::Guests(GuestsCollector::new(
                    deps.sources.clone(),
                    deps.source_timeout,
                )),
                CollectorKind::CachedHost => {
                    let store = deps
                        .store
                        .clone()
                        .ok_or_else(|| ConfigError::MissingCacheFile(kind.name().to_string()))?;
                    Collector::CachedHost(CachedHostCollector::new(store, deps.cloud.clone()))
                }
            };
            collectors.push(collector);
        }
        Ok(Self { collectors })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.collectors.iter().map(Collector::name).collect()
    }

    /// Whether any collector reads the snapshot cache.
    pub fn needs_cache(&self) -> bool {
        self.collectors.iter().any(|c| c.kind().uses_cache())
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Run every collector and concatenate their expositions.
    ///
    /// All or nothing: the first failing collector aborts the scrape.
    pub async fn scrape(&self) -> Result<String, CollectionError> {
        let mut out = String::new();
        for collector in &self.collectors {
            let samples = collector.produce_samples().await?;
            let text = encode(&samples).map_err(|e| CollectionError::Encode {
                collector: collector.name(),
                reason: e.to_string(),
            })?;
            debug!(collector = collector.name(), samples = samples.len(), "collected");
            out.push_str(&text);
        }
        Ok(out)
    }
}
