//! zvm-api — HTTP front end for the exporter.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus exposition from every enabled collector |
//! | GET | `/` | Landing page linking to `/metrics` |
//!
//! Any other path or method gets an empty 404.

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::sync::Semaphore;
use zvm_metrics::CollectorSet;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub collectors: Arc<CollectorSet>,
    /// Caps concurrent `/metrics` collections when set.
    pub scrape_limit: Option<Arc<Semaphore>>,
}

impl ApiState {
    /// `max_concurrent_scrapes` is clamped to what the semaphore can hold.
    pub fn new(collectors: CollectorSet, max_concurrent_scrapes: Option<usize>) -> Self {
        Self {
            collectors: Arc::new(collectors),
            scrape_limit: max_concurrent_scrapes
                .map(|n| Arc::new(Semaphore::new(n.min(Semaphore::MAX_PERMITS)))),
        }
    }
}

/// Build the exporter router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handlers::index).fallback(handlers::not_found))
        .route(
            "/metrics",
            get(handlers::prometheus_metrics).fallback(handlers::not_found),
        )
        .fallback(handlers::not_found)
        .with_state(state)
}
