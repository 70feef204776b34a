//! Serve, render and store policy for whole responses.

use tracing::debug;

use crate::error::CacheResult;
use crate::incremental::{CacheLookup, IncrementalCache};
use crate::store::CachedPage;

/// Decides when a cached page may be served and when a rendered one is kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseCache {
    minimal_mode: bool,
}

impl ResponseCache {
    /// Create a response cache.
    pub fn new(minimal_mode: bool) -> Self {
        Self { minimal_mode }
    }

    /// Whether the cache is read-only.
    pub fn is_minimal_mode(&self) -> bool {
        self.minimal_mode
    }

    /// Look up a page before rendering.
    ///
    /// An unversioned manifest trusts nothing and bypasses the cache. On-demand
    /// revalidation demotes a fresh hit to stale so the page is rendered again.
    /// In minimal mode stale entries are served as-is; revalidating them is
    /// left to the infrastructure in front of this server.
    pub async fn lookup(&self, cache: &IncrementalCache, path: &str) -> CacheResult<CacheLookup> {
        if cache.manifest().is_unversioned() {
            return Ok(CacheLookup::Bypass);
        }

        let lookup = cache.get(path).await?;
        let lookup = match lookup {
            CacheLookup::Hit(entry) if cache.is_on_demand_revalidate() && !self.minimal_mode => {
                CacheLookup::Stale(entry)
            }
            CacheLookup::Stale(entry) if self.minimal_mode => CacheLookup::Hit(entry),
            other => other,
        };
        Ok(lookup)
    }

    /// Store a freshly rendered page when policy allows.
    ///
    /// `previous` is the lookup made before rendering. Returns whether the
    /// page was written.
    pub async fn store(
        &self,
        cache: &IncrementalCache,
        path: &str,
        route_page: Option<&str>,
        previous: &CacheLookup,
        page: CachedPage,
    ) -> CacheResult<bool> {
        if self.minimal_mode || cache.manifest().is_unversioned() {
            return Ok(false);
        }
        if !cache.manifest().is_prerendered(path, route_page) {
            return Ok(false);
        }
        if cache.revalidate_only_generated() && previous.entry().is_none() {
            debug!(path, "skipping store for path that was never generated");
            return Ok(false);
        }

        cache.set(path, page).await
    }
}
