//! Error types for collection and refresh.

use thiserror::Error;

use zvm_source::FetchError;
use zvm_state::CacheError;

/// A collector could not produce its samples. Aborts the whole scrape.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("collector `{collector}` failed: {source}")]
    Fetch {
        collector: &'static str,
        #[source]
        source: FetchError,
    },

    #[error("collector `{collector}` failed: {source}")]
    Cache {
        collector: &'static str,
        #[source]
        source: CacheError,
    },

    #[error("collector `{collector}` failed: field `{field}` missing from {source_name} response")]
    MissingField {
        collector: &'static str,
        source_name: String,
        field: &'static str,
    },

    #[error("collector `{collector}` failed to encode samples: {reason}")]
    Encode {
        collector: &'static str,
        reason: String,
    },
}

impl CollectionError {
    /// Name of the collector that failed.
    pub fn collector(&self) -> &'static str {
        match self {
            CollectionError::Fetch { collector, .. }
            | CollectionError::Cache { collector, .. }
            | CollectionError::MissingField { collector, .. }
            | CollectionError::Encode { collector, .. } => collector,
        }
    }
}

/// A refresh cycle did not publish. The previous snapshot stays current.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("publish failed: {0}")]
    Persistence(#[source] CacheError),

    #[error("fetch task aborted: {0}")]
    Task(String),
}
