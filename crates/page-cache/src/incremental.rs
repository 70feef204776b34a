//! Request-scoped incremental cache over a shared store.

use std::sync::Arc;

use http::{HeaderMap, HeaderName};
use tracing::debug;

use crate::config::IncrementalCacheConfig;
use crate::error::CacheResult;
use crate::key::{CacheKey, CacheKeyPolicy};
use crate::manifest::PrerenderManifest;
use crate::store::{ArtifactStore, CacheEntry, CacheStatus, CachedPage};

/// Header carrying the preview mode id for on-demand revalidation.
pub const PRERENDER_REVALIDATE_HEADER: &str = "x-prerender-revalidate";

/// Header restricting on-demand revalidation to already generated paths.
pub const PRERENDER_REVALIDATE_ONLY_GENERATED_HEADER: &str = "x-prerender-revalidate-if-generated";

/// Outcome of reading the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Fresh entry.
    Hit(CacheEntry),
    /// Entry past its revalidation window.
    Stale(CacheEntry),
    /// Nothing stored.
    Miss,
    /// Cache not consulted.
    Bypass,
}

impl CacheLookup {
    /// Status for logs and debug headers.
    pub fn status(&self) -> CacheStatus {
        match self {
            Self::Hit(_) => CacheStatus::Hit,
            Self::Stale(_) => CacheStatus::Stale,
            Self::Miss => CacheStatus::Miss,
            Self::Bypass => CacheStatus::Bypass,
        }
    }

    /// The entry, if one was found.
    pub fn entry(&self) -> Option<&CacheEntry> {
        match self {
            Self::Hit(entry) | Self::Stale(entry) => Some(entry),
            Self::Miss | Self::Bypass => None,
        }
    }
}

/// Builds request-scoped caches backed by one shared store.
#[derive(Clone)]
pub struct IncrementalCacheFactory {
    store: Arc<dyn ArtifactStore>,
}

impl IncrementalCacheFactory {
    /// Create a factory over a shared store.
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Build the cache view for one request.
    ///
    /// Without a prerender manifest a permissive development manifest is
    /// used, so callers only need to branch on `is_unversioned`.
    pub fn create(
        &self,
        request_headers: &HeaderMap,
        config: IncrementalCacheConfig,
        manifest: Option<Arc<PrerenderManifest>>,
    ) -> IncrementalCache {
        let manifest = manifest.unwrap_or_else(|| Arc::new(PrerenderManifest::development()));
        let headers = forwarded_headers(request_headers, &config);
        let keys = CacheKeyPolicy::new().with_prefix(config.cache_key_prefix.clone());

        IncrementalCache {
            store: Arc::clone(&self.store),
            config,
            manifest,
            headers,
            keys,
        }
    }
}

/// Cache handle scoped to a single request.
pub struct IncrementalCache {
    store: Arc<dyn ArtifactStore>,
    config: IncrementalCacheConfig,
    manifest: Arc<PrerenderManifest>,
    headers: HeaderMap,
    keys: CacheKeyPolicy,
}

impl IncrementalCache {
    /// Key for a path under this cache's prefix.
    pub fn key_for(&self, path: &str) -> CacheKey {
        self.keys.key_for(path)
    }

    /// Read an entry. In development every entry is stale.
    pub async fn get(&self, path: &str) -> CacheResult<CacheLookup> {
        let key = self.key_for(path);
        let lookup = match self.store.get(key.as_str()).await? {
            None => CacheLookup::Miss,
            Some(entry) if self.config.is_dev || entry.is_stale() => CacheLookup::Stale(entry),
            Some(entry) => CacheLookup::Hit(entry),
        };
        debug!(key = %key, status = %lookup.status(), "cache lookup");
        Ok(lookup)
    }

    /// Store a page using the manifest's revalidation policy for `path`.
    ///
    /// Development mode never persists.
    pub async fn set(&self, path: &str, page: CachedPage) -> CacheResult<bool> {
        if self.config.is_dev {
            return Ok(false);
        }
        let entry = CacheEntry::new(page, self.manifest.revalidate_for(path));
        self.store.set(self.key_for(path).as_str(), entry).await
    }

    /// Headers forwarded to revalidation.
    pub fn revalidate_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether this request triggers on-demand revalidation.
    pub fn is_on_demand_revalidate(&self) -> bool {
        self.headers
            .get(PRERENDER_REVALIDATE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == self.manifest.preview.preview_mode_id)
    }

    /// Whether on-demand revalidation is limited to generated paths.
    pub fn revalidate_only_generated(&self) -> bool {
        self.headers
            .contains_key(PRERENDER_REVALIDATE_ONLY_GENERATED_HEADER)
    }

    /// The prerender manifest in effect.
    pub fn manifest(&self) -> &PrerenderManifest {
        &self.manifest
    }

    /// Configuration of this view.
    pub fn config(&self) -> &IncrementalCacheConfig {
        &self.config
    }

    /// Read-only mode without on-demand regeneration.
    pub fn is_minimal_mode(&self) -> bool {
        self.config.minimal_mode
    }

    /// Whether fetch-level caching is enabled.
    pub fn fetch_cache_enabled(&self) -> bool {
        self.config.fetch_cache
    }

    /// In-memory budget supplied to the store.
    pub fn max_memory_cache_size(&self) -> u64 {
        self.config.max_memory_cache_size
    }
}

fn forwarded_headers(request_headers: &HeaderMap, config: &IncrementalCacheConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let always = [
        PRERENDER_REVALIDATE_HEADER,
        PRERENDER_REVALIDATE_ONLY_GENERATED_HEADER,
    ];

    for name in always
        .iter()
        .copied()
        .chain(config.allowed_revalidate_header_keys.iter().map(String::as_str))
    {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        if headers.contains_key(&name) {
            continue;
        }
        for value in request_headers.get_all(&name) {
            headers.append(name.clone(), value.clone());
        }
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{PrerenderRoute, RevalidateSetting};
    use crate::store::MemoryStore;
    use http::HeaderValue;

    fn factory() -> IncrementalCacheFactory {
        IncrementalCacheFactory::new(Arc::new(MemoryStore::with_budget(1 << 20)))
    }

    fn manifest() -> Arc<PrerenderManifest> {
        let mut manifest = PrerenderManifest::development();
        manifest.version = 4;
        manifest.preview.preview_mode_id = "secret".into();
        manifest.routes.insert(
            "/stale".into(),
            PrerenderRoute {
                initial_revalidate_seconds: RevalidateSetting::Seconds(0),
                ..Default::default()
            },
        );
        Arc::new(manifest)
    }

    // === Factory Tests ===

    #[test]
    fn test_missing_manifest_is_synthesized() {
        let cache = factory().create(&HeaderMap::new(), IncrementalCacheConfig::default(), None);
        assert!(cache.manifest().is_unversioned());
        assert_eq!(cache.manifest().preview.preview_mode_id, "development-id");
    }

    #[test]
    fn test_only_allowed_headers_forwarded() {
        let mut request = HeaderMap::new();
        request.insert("x-tenant", HeaderValue::from_static("acme"));
        request.insert("cookie", HeaderValue::from_static("session=1"));
        request.insert(PRERENDER_REVALIDATE_HEADER, HeaderValue::from_static("secret"));

        let mut config = IncrementalCacheConfig::default();
        config.allowed_revalidate_header_keys.insert("x-tenant".into());

        let cache = factory().create(&request, config, Some(manifest()));
        let forwarded = cache.revalidate_headers();

        assert_eq!(forwarded.get("x-tenant").unwrap(), "acme");
        assert!(forwarded.get("cookie").is_none());
        assert!(cache.is_on_demand_revalidate());
        assert!(!cache.revalidate_only_generated());
    }

    #[test]
    fn test_wrong_preview_id_is_not_on_demand() {
        let mut request = HeaderMap::new();
        request.insert(PRERENDER_REVALIDATE_HEADER, HeaderValue::from_static("guess"));
        let cache = factory().create(&request, IncrementalCacheConfig::default(), Some(manifest()));
        assert!(!cache.is_on_demand_revalidate());
    }

    #[test]
    fn test_exposes_budget_and_fetch_cache() {
        let mut config = IncrementalCacheConfig::default();
        config.max_memory_cache_size = 1234;
        config.fetch_cache = false;
        let cache = factory().create(&HeaderMap::new(), config, None);
        assert_eq!(cache.max_memory_cache_size(), 1234);
        assert!(!cache.fetch_cache_enabled());
    }

    // === Read/Write Tests ===

    #[tokio::test]
    async fn test_shared_store_across_requests() {
        let factory = factory();
        let first = factory.create(&HeaderMap::new(), IncrementalCacheConfig::default(), Some(manifest()));
        assert!(first.set("/page", CachedPage::new("hi", None)).await.unwrap());

        let second = factory.create(&HeaderMap::new(), IncrementalCacheConfig::default(), Some(manifest()));
        assert!(matches!(second.get("/page").await.unwrap(), CacheLookup::Hit(_)));
    }

    #[tokio::test]
    async fn test_prefix_isolates_entries() {
        let factory = factory();
        let mut config = IncrementalCacheConfig::default();
        config.cache_key_prefix = "a".into();
        let a = factory.create(&HeaderMap::new(), config, Some(manifest()));
        a.set("/page", CachedPage::new("hi", None)).await.unwrap();

        let b = factory.create(&HeaderMap::new(), IncrementalCacheConfig::default(), Some(manifest()));
        assert_eq!(b.get("/page").await.unwrap(), CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_revalidate_window_marks_stale() {
        let cache = factory().create(&HeaderMap::new(), IncrementalCacheConfig::default(), Some(manifest()));
        cache.set("/stale", CachedPage::new("old", None)).await.unwrap();
        assert!(matches!(cache.get("/stale").await.unwrap(), CacheLookup::Stale(_)));
    }

    #[tokio::test]
    async fn test_dev_mode_does_not_persist() {
        let config = IncrementalCacheConfig {
            is_dev: true,
            ..Default::default()
        };
        let cache = factory().create(&HeaderMap::new(), config, None);
        assert!(!cache.set("/page", CachedPage::new("hi", None)).await.unwrap());
        assert_eq!(cache.get("/page").await.unwrap(), CacheLookup::Miss);
    }
}
