//! Error types for data source calls.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for data source operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// A data source call failed. Never fatal to the process.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid connector url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connect to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("http error talking to {source_name}: {reason}")]
    Http { source_name: String, reason: String },

    #[error("{source_name} returned HTTP {status} for {api}")]
    Status {
        source_name: String,
        api: &'static str,
        status: u16,
    },

    #[error("{source_name} did not answer {api} within {after:?}")]
    Timeout {
        source_name: String,
        api: &'static str,
        after: Duration,
    },

    #[error("{source_name} rejected {api}: overallRC={rc}: {message}")]
    Backend {
        source_name: String,
        api: &'static str,
        rc: i64,
        message: String,
    },

    #[error("invalid {api} response from {source_name}: {reason}")]
    InvalidResponse {
        source_name: String,
        api: &'static str,
        reason: String,
    },
}
