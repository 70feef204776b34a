//! Per-request incremental cache configuration.

use std::collections::BTreeSet;

use page_core::ServerConfig;

/// Configuration for one request's cache view.
///
/// Built fresh for every request so request headers never leak into a
/// long-lived cache instance. Entries live only in the shared
/// [`ArtifactStore`](crate::ArtifactStore); nothing is persisted to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementalCacheConfig {
    /// Development mode: no persistence, every entry is stale.
    pub is_dev: bool,
    /// Request headers forwarded to revalidation.
    pub allowed_revalidate_header_keys: BTreeSet<String>,
    /// Read-only mode without on-demand regeneration.
    pub minimal_mode: bool,
    /// In-memory budget in bytes.
    pub max_memory_cache_size: u64,
    /// Prefix applied to every cache key.
    pub cache_key_prefix: String,
    /// Whether fetch-level caching is enabled.
    pub fetch_cache: bool,
}

impl IncrementalCacheConfig {
    /// Build from process-wide server config.
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            is_dev: config.dev,
            allowed_revalidate_header_keys: config
                .cache
                .allowed_revalidate_header_keys
                .iter()
                .map(|k| k.to_ascii_lowercase())
                .collect(),
            minimal_mode: config.minimal_mode,
            max_memory_cache_size: config.cache.max_memory_cache_size,
            cache_key_prefix: config.cache.fetch_cache_key_prefix.clone(),
            fetch_cache: config.cache.fetch_cache,
        }
    }
}

impl Default for IncrementalCacheConfig {
    fn default() -> Self {
        Self::from_server_config(&ServerConfig::default())
    }
}
