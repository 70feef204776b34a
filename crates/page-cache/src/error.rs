//! Cache error types.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache operation errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to parse the prerender manifest.
    #[error("invalid prerender manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// Backend storage error.
    #[error("storage error: {0}")]
    Storage(String),
}
