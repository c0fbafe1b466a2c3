//! Route handlers.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{Html, IntoResponse, Response};
use tracing::{debug, error};

use crate::ApiState;

const INDEX_PAGE: &str = r#"<html>
<head><title>z/VM Exporter</title></head>
<body>
<h1>z/VM Exporter</h1>
<p><a href="/metrics">Metrics</a></p>
</body>
</html>
"#;

/// GET /
pub async fn index() -> impl IntoResponse {
    Html(INDEX_PAGE)
}

/// Everything that is not a known route.
pub async fn not_found() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> Response {
    let _permit = match &state.scrape_limit {
        Some(limit) => match limit.acquire().await {
            Ok(permit) => Some(permit),
            Err(_) => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
        },
        None => None,
    };

    let started = Instant::now();
    match state.collectors.scrape().await {
        Ok(body) => {
            debug!(
                bytes = body.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "scrape served"
            );
            (
                StatusCode::OK,
                [(CONTENT_TYPE, zvm_metrics::CONTENT_TYPE)],
                body,
            )
                .into_response()
        }
        Err(e) => {
            error!(collector = e.collector(), error = %e, "scrape failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(CONTENT_TYPE, "text/plain; charset=utf-8")],
                format!("{e}\n"),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::to_bytes;
    use serde_json::{Value, json};
    use zvm_core::CollectorKind;
    use zvm_metrics::{CollectorDeps, CollectorSet};
    use zvm_source::{DataSource, FetchError, FetchResult, SourceRequest};

    struct StaticSource {
        host: Value,
        delay: Duration,
    }

    #[async_trait]
    impl DataSource for StaticSource {
        fn name(&self) -> &str {
            "hostA"
        }

        async fn fetch(&self, request: SourceRequest) -> FetchResult<Value> {
            tokio::time::sleep(self.delay).await;
            match request {
                SourceRequest::HostInfo => Ok(self.host.clone()),
                SourceRequest::GuestList => Err(FetchError::Backend {
                    source_name: "hostA".to_string(),
                    api: request.api(),
                    rc: 300,
                    message: "guest list unavailable".to_string(),
                }),
            }
        }
    }

    fn state(kinds: &[CollectorKind], delay: Duration, limit: Option<usize>) -> ApiState {
        let source: Arc<dyn DataSource> = Arc::new(StaticSource {
            host: json!({"disk_used": 10, "disk_total": 100}),
            delay,
        });
        let deps = CollectorDeps {
            sources: vec![source],
            store: None,
            source_timeout: Duration::from_secs(5),
            cloud: "zvm".to_string(),
        };
        ApiState::new(CollectorSet::build(kinds, &deps).unwrap(), limit)
    }

    async fn body_text(resp: Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn metrics_ok_has_exposition_content_type() {
        let resp = prometheus_metrics(State(state(&[CollectorKind::Host], Duration::ZERO, None))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(CONTENT_TYPE).unwrap(),
            zvm_metrics::CONTENT_TYPE
        );
        let body = body_text(resp).await;
        assert!(body.contains("disk_used{host=\"hostA\"} 10\n"));
    }

    #[tokio::test]
    async fn failing_collector_gives_500_naming_it() {
        let kinds = [CollectorKind::Host, CollectorKind::Guests];
        let resp = prometheus_metrics(State(state(&kinds, Duration::ZERO, None))).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_text(resp).await;
        assert!(body.contains("guests"));
        assert!(!body.contains("disk_used"));
    }

    #[tokio::test]
    async fn scrape_limit_serialises_collections() {
        let state = state(&[CollectorKind::Host], Duration::from_millis(100), Some(1));
        let started = Instant::now();
        let (a, b) = tokio::join!(
            prometheus_metrics(State(state.clone())),
            prometheus_metrics(State(state.clone())),
        );
        assert_eq!(a.status(), StatusCode::OK);
        assert_eq!(b.status(), StatusCode::OK);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn oversized_scrape_limit_is_clamped() {
        let state = state(&[CollectorKind::Host], Duration::ZERO, Some(usize::MAX));
        let resp = prometheus_metrics(State(state)).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn index_links_to_metrics() {
        let resp = index().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.contains("href=\"/metrics\""));
    }

    #[tokio::test]
    async fn not_found_is_empty() {
        let resp = not_found().await.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(body_text(resp).await.is_empty());
    }
}
