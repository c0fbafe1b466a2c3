//! Refresher — the background loop that keeps the snapshot cache current.
//!
//! Each cycle fetches host info from every data source concurrently, each
//! call bounded by the fetch timeout. Only a fully successful cycle
//! publishes; any failure leaves the previous snapshot in place and its age
//! keeps growing. The fetch duration is recorded either way.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use zvm_core::{Measurements, Snapshot};
use zvm_source::{DataSource, SourceRequest, fetch_with_timeout, numeric_fields};
use zvm_state::SnapshotStore;

use crate::error::RefreshError;

/// Periodically rebuilds the snapshot from the data sources.
pub struct Refresher {
    sources: Vec<Arc<dyn DataSource>>,
    store: SnapshotStore,
    interval: Duration,
    fetch_timeout: Duration,
}

impl Refresher {
    pub fn new(
        sources: Vec<Arc<dyn DataSource>>,
        store: SnapshotStore,
        interval: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            store,
            interval,
            fetch_timeout,
        }
    }

    /// Run one fetch-and-publish cycle.
    pub async fn refresh_once(&self) -> Result<Arc<Snapshot>, RefreshError> {
        let start = Instant::now();

        let resources = match self.fetch_all().await {
            Ok(resources) => resources,
            Err(e) => {
                self.store.record_fetch_duration(start.elapsed());
                return Err(e);
            }
        };

        let snapshot = Snapshot::new(resources, start.elapsed());
        self.store.publish(snapshot).map_err(|e| {
            self.store.record_fetch_duration(start.elapsed());
            RefreshError::Persistence(e)
        })
    }

    async fn fetch_all(&self) -> Result<BTreeMap<String, Measurements>, RefreshError> {
        let mut tasks = JoinSet::new();
        for source in &self.sources {
            let source = Arc::clone(source);
            let timeout = self.fetch_timeout;
            tasks.spawn(async move {
                let payload =
                    fetch_with_timeout(source.as_ref(), SourceRequest::HostInfo, timeout).await?;
                let measurements = numeric_fields(source.name(), &payload)?;
                Ok::<_, zvm_source::FetchError>((source.name().to_string(), measurements))
            });
        }

        let mut resources = BTreeMap::new();
        // Returning early drops the set, which aborts the remaining fetches.
        while let Some(joined) = tasks.join_next().await {
            let (name, measurements) = joined.map_err(|e| RefreshError::Task(e.to_string()))??;
            resources.insert(name, measurements);
        }
        Ok(resources)
    }

    /// Log the outcome of one cycle. Never fails.
    async fn cycle(&self) {
        match self.refresh_once().await {
            Ok(snapshot) => info!(
                resources = snapshot.resources.len(),
                fetch_ms = snapshot.fetch_duration.as_millis() as u64,
                "snapshot refreshed"
            ),
            Err(e) => {
                let stale_secs = self.store.current().ok().map(|(_, age)| age.as_secs());
                warn!(
                    error = %e,
                    ?stale_secs,
                    "snapshot refresh failed, keeping previous snapshot"
                );
            }
        }
    }

    /// Refresh immediately, then every `interval`, until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            sources = self.sources.len(),
            "refresher started"
        );

        loop {
            tokio::select! {
                _ = self.cycle() => {}
                _ = shutdown.changed() => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    debug!("refresh interval elapsed");
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("refresher shutting down");
    }
}
