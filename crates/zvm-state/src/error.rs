//! Error types for the snapshot cache.

use thiserror::Error;

/// Result type alias for snapshot cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur reading from or publishing to the snapshot cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Nothing has been published yet.
    #[error("snapshot cache not ready: no snapshot has been published")]
    NotReady,

    #[error("failed to persist snapshot: {0}")]
    Persistence(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}
