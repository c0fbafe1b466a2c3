//! Exporter assembly and serving.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use zvm_api::{ApiState, build_router};
use zvm_core::{CollectorKind, ExporterConfig};
use zvm_metrics::{CollectorDeps, CollectorSet, Refresher};
use zvm_source::{DataSource, ZvmConnector};
use zvm_state::SnapshotStore;

/// Everything `serve` checks before touching the filesystem or network:
/// the configuration itself and every connector URL.
pub fn check_config(
    config: &ExporterConfig,
) -> anyhow::Result<(Vec<CollectorKind>, Vec<ZvmConnector>)> {
    let kinds = config.validate().context("invalid configuration")?;
    let connectors = config
        .connectors
        .iter()
        .map(|connector| {
            ZvmConnector::new(connector).with_context(|| format!("connector `{}`", connector.name))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok((kinds, connectors))
}

/// A fully wired exporter, ready to bind.
pub struct Exporter {
    listen_addr: SocketAddr,
    collectors: Vec<&'static str>,
    router: Router,
    refresher: Option<Refresher>,
}

impl Exporter {
    /// Validate `config` and build the exporter against its connectors.
    pub fn from_config(config: &ExporterConfig) -> anyhow::Result<Self> {
        let (kinds, connectors) = check_config(config)?;

        let mut sources: Vec<Arc<dyn DataSource>> = Vec::with_capacity(connectors.len());
        for client in connectors {
            info!(name = client.name(), address = client.address(), "connector configured");
            sources.push(Arc::new(client));
        }

        Self::assemble(config, &kinds, sources)
    }

    /// Like [`Exporter::from_config`], with caller-supplied data sources.
    pub fn with_sources(
        config: &ExporterConfig,
        sources: Vec<Arc<dyn DataSource>>,
    ) -> anyhow::Result<Self> {
        let kinds = config.validate().context("invalid configuration")?;
        Self::assemble(config, &kinds, sources)
    }

    fn assemble(
        config: &ExporterConfig,
        kinds: &[CollectorKind],
        sources: Vec<Arc<dyn DataSource>>,
    ) -> anyhow::Result<Self> {
        let store = match (kinds.iter().any(|k| k.uses_cache()), &config.cache_file) {
            (true, Some(path)) => {
                let store = SnapshotStore::open(path)
                    .with_context(|| format!("open snapshot cache {}", path.display()))?;
                info!(path = %path.display(), ready = store.is_ready(), "snapshot cache opened");
                Some(store)
            }
            _ => None,
        };

        let deps = CollectorDeps {
            sources: sources.clone(),
            store: store.clone(),
            source_timeout: config.source_timeout(),
            cloud: config.cloud.clone(),
        };
        let collectors = CollectorSet::build(kinds, &deps)?;
        let names = collectors.names();

        let refresher = store.map(|store| {
            Refresher::new(
                sources,
                store,
                config.refresh_interval(),
                config.fetch_timeout(),
            )
        });

        let state = ApiState::new(collectors, config.max_concurrent_scrapes);
        Ok(Self {
            listen_addr: config.listen_addr(),
            collectors: names,
            router: build_router(state),
            refresher,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Enabled collector names, in scrape order.
    pub fn collectors(&self) -> &[&'static str] {
        &self.collectors
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// The background refresher, present only when a cache-backed collector is enabled.
    pub fn refresher(&self) -> Option<&Refresher> {
        self.refresher.as_ref()
    }

    /// Serve on `listener` until `shutdown` resolves, then stop the refresher.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let refresh_handle = self.refresher.map(|refresher| {
            tokio::spawn(async move {
                refresher.run(shutdown_rx).await;
            })
        });

        let addr = listener.local_addr()?;
        info!(%addr, collectors = ?self.collectors, "exporter listening");

        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("shutdown signal received");
            })
            .await;

        let _ = shutdown_tx.send(true);
        if let Some(handle) = refresh_handle {
            let _ = handle.await;
        }

        result.context("http server failed")
    }
}
