//! Platform capability set consumed by the orchestrator.

use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Sink, SinkExt};
use page_cache::{
    ArtifactStore, IncrementalCache, IncrementalCacheConfig, IncrementalCacheFactory,
    MemoryStore, PrerenderManifest, ResponseCache,
};
use page_core::{PageRequest, ServerConfig};
use page_router::{
    strip_trailing_slash, I18nLocaleProvider, LocaleProvider, RouteDefinition, RouteResolver,
    RouteTable,
};
use page_streaming::{
    DeliveryOptions, EmitError, EmitOutcome, EmitResult, OutgoingResponse, RenderResult,
    ResponseEmitter, ResponseFrame,
};

use crate::hooks::BoundaryHooks;

/// Type-erased transport sink used by the orchestrator.
pub type ResponseSink = Pin<Box<dyn Sink<ResponseFrame, Error = EmitError> + Send>>;

/// Box any frame sink into a [`ResponseSink`].
pub fn response_sink<S>(sink: S) -> ResponseSink
where
    S: Sink<ResponseFrame> + Send + 'static,
    S::Error: Display,
{
    Box::pin(sink.sink_map_err(|e| EmitError::Transport(e.to_string())))
}

/// What a platform provides to the request orchestrator.
#[async_trait]
pub trait ServerCapabilities: Send + Sync {
    /// Process-wide configuration.
    fn config(&self) -> &ServerConfig;

    /// Find the route an incoming pathname belongs to.
    fn resolve_route(&self, pathname: &str) -> Option<&RouteDefinition>;

    /// Resolver normalizing URLs against their route.
    fn route_resolver(&self) -> &RouteResolver;

    /// Build the incremental cache view for one request.
    fn create_cache(&self, request: &PageRequest) -> IncrementalCache;

    /// Build the response cache policy.
    fn create_response_cache(&self) -> ResponseCache;

    /// Write a render result to the response.
    async fn emit_response(
        &self,
        response: &mut OutgoingResponse<ResponseSink>,
        result: RenderResult,
        options: &DeliveryOptions,
    ) -> EmitResult<EmitOutcome>;

    /// Boundary hooks.
    fn hooks(&self) -> &BoundaryHooks;
}

/// Capabilities of the standard web server platform.
pub struct WebCapabilities {
    config: ServerConfig,
    routes: RouteTable,
    resolver: RouteResolver,
    locales: Option<I18nLocaleProvider>,
    caches: IncrementalCacheFactory,
    manifest: Option<Arc<PrerenderManifest>>,
    emitter: ResponseEmitter,
    hooks: BoundaryHooks,
}

impl WebCapabilities {
    /// Create capabilities with an in-memory store sized from config.
    pub fn new(config: ServerConfig, routes: RouteTable) -> Self {
        let locales = config.i18n.as_ref().map(I18nLocaleProvider::from_config);
        let resolver = match &locales {
            Some(provider) => RouteResolver::new().with_locale_provider(provider.clone()),
            None => RouteResolver::new(),
        };
        let store = Arc::new(MemoryStore::with_budget(config.cache.max_memory_cache_size));

        Self {
            config,
            routes,
            resolver,
            locales,
            caches: IncrementalCacheFactory::new(store),
            manifest: None,
            emitter: ResponseEmitter::new(),
            hooks: BoundaryHooks::default(),
        }
    }

    /// Use a different shared store.
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.caches = IncrementalCacheFactory::new(store);
        self
    }

    /// Use the prerender manifest from the build.
    pub fn with_manifest(mut self, manifest: PrerenderManifest) -> Self {
        self.manifest = Some(Arc::new(manifest));
        self
    }

    /// Override boundary hooks.
    pub fn with_hooks(mut self, hooks: BoundaryHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Known routes.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }
}

#[async_trait]
impl ServerCapabilities for WebCapabilities {
    fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn resolve_route(&self, pathname: &str) -> Option<&RouteDefinition> {
        let pathname = match &self.locales {
            Some(provider) => provider.analyze(pathname).pathname,
            None => pathname.to_string(),
        };
        self.routes.find(strip_trailing_slash(&pathname))
    }

    fn route_resolver(&self) -> &RouteResolver {
        &self.resolver
    }

    fn create_cache(&self, request: &PageRequest) -> IncrementalCache {
        self.caches.create(
            &request.headers,
            IncrementalCacheConfig::from_server_config(&self.config),
            self.manifest.clone(),
        )
    }

    fn create_response_cache(&self) -> ResponseCache {
        ResponseCache::new(self.config.minimal_mode)
    }

    async fn emit_response(
        &self,
        response: &mut OutgoingResponse<ResponseSink>,
        result: RenderResult,
        options: &DeliveryOptions,
    ) -> EmitResult<EmitOutcome> {
        self.emitter.emit(response, result, options).await
    }

    fn hooks(&self) -> &BoundaryHooks {
        &self.hooks
    }
}
