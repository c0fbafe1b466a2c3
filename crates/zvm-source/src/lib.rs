//! zvm-source — the backends the exporter pulls statistics from.
//!
//! A [`DataSource`] answers a [`SourceRequest`] with the JSON payload of the
//! backend call. [`ZvmConnector`] implements it over HTTP against the z/VM
//! Cloud Connector REST API; tests substitute in-process fakes.
//!
//! Sources impose no deadline of their own. Callers bound every call with
//! [`fetch_with_timeout`].

pub mod connector;
pub mod error;
pub mod response;

use std::time::Duration;

use async_trait::async_trait;

pub use connector::ZvmConnector;
pub use error::{FetchError, FetchResult};
pub use response::{guest_count, numeric_fields};

/// The backend calls the exporter knows how to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRequest {
    /// Hypervisor-level statistics: disk, memory, vCPUs.
    HostInfo,
    /// User IDs of all guests defined on the host.
    GuestList,
}

impl SourceRequest {
    /// Cloud Connector API name, used in logs and errors.
    pub fn api(&self) -> &'static str {
        match self {
            SourceRequest::HostInfo => "host_get_info",
            SourceRequest::GuestList => "guest_list",
        }
    }

    /// REST path relative to the connector base URL.
    pub fn path(&self) -> &'static str {
        match self {
            SourceRequest::HostInfo => "/host",
            SourceRequest::GuestList => "/guests",
        }
    }
}

/// A backend that can be queried for statistics.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Stable name, used as the `host` label and the snapshot resource id.
    fn name(&self) -> &str;

    /// Perform one backend call and return its payload.
    async fn fetch(&self, request: SourceRequest) -> FetchResult<serde_json::Value>;
}

/// Call `source`, giving up after `timeout`.
pub async fn fetch_with_timeout(
    source: &dyn DataSource,
    request: SourceRequest,
    timeout: Duration,
) -> FetchResult<serde_json::Value> {
    match tokio::time::timeout(timeout, source.fetch(request)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            source_name: source.name().to_string(),
            api: request.api(),
            after: timeout,
        }),
    }
}
