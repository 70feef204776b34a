//! The fixed per-request control flow.

use std::path::PathBuf;
use std::sync::Arc;

use http::header::{HeaderName, IF_NONE_MATCH, UPGRADE};
use http::{Method, StatusCode};
use page_cache::{CacheLookup, CacheStatus, CachedPage, IncrementalCache, ResponseCache};
use page_core::{
    PageRequest, ParsedRequestUrl, RenderOptions, RequestLifecycle, RequestPhase, ServerConfig,
    LOCALE_QUERY_KEY,
};
use page_dispatch::{DispatchOutcome, RenderDispatcher, RenderFn, NOT_FOUND_PAGE};
use page_observability::{LogLevel, RequestLogger};
use page_router::{is_api_route, RouteDefinition};
use page_streaming::{ContentKind, DeliveryOptions, EmitOutcome, OutgoingResponse, RenderResult};
use tracing::{debug, warn, Instrument, Span};

use crate::capabilities::{ResponseSink, ServerCapabilities};
use crate::error::ServerError;
use crate::hooks::{apply_rewrites, Rewrite};

/// Debug header carrying the cache status of a page response.
pub const CACHE_STATUS_HEADER: &str = "x-cache-status";

/// Request header marking a data (JSON) request.
pub const DATA_REQUEST_HEADER: &str = "x-nextjs-data";

/// Which boundary hook took the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandledBy {
    Upgrade,
    PublicFile(PathBuf),
    ApiRoute,
}

/// Summary of a served page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeReport {
    /// Route page that served the request.
    pub page: String,
    /// Final pathname after resolution.
    pub pathname: String,
    /// Cache status before rendering.
    pub cache_status: CacheStatus,
    /// Whether the rendered page was written to the cache.
    pub stored: bool,
    /// How the body was delivered.
    pub emitted: EmitOutcome,
    /// Phases the request went through.
    pub phases: Vec<RequestPhase>,
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A page was written to the response.
    Served(ServeReport),
    /// No static fallback exists; the caller picks the next strategy.
    Bubbled,
    /// A boundary hook took the request.
    Handled(HandledBy),
}

/// Handle one request with the given capabilities.
///
/// Runs `Received -> Normalized -> (Serving | Rendering -> Rendered | Bubbled)
/// -> Emitting -> Complete`. Errors move the lifecycle to `Failed` and are
/// returned unchanged; mapping them to a status code is up to the caller.
pub async fn handle_request<C>(
    capabilities: &C,
    dispatcher: &RenderDispatcher,
    render: &dyn RenderFn,
    request: PageRequest,
    response: &mut OutgoingResponse<ResponseSink>,
) -> Result<RequestOutcome, ServerError>
where
    C: ServerCapabilities + ?Sized,
{
    let mut logger = RequestLogger::new(request.request_id.clone());
    let span = logger.span();
    let mut lifecycle = RequestLifecycle::new();

    let result = serve(
        capabilities,
        dispatcher,
        render,
        &request,
        response,
        &mut lifecycle,
        &mut logger,
    )
    .instrument(span.clone())
    .await;

    let _entered = span.enter();
    match &result {
        Ok(RequestOutcome::Served(report)) => logger
            .builder(LogLevel::Info, "request served")
            .field("pathname", report.pathname.clone())
            .field("cache_status", report.cache_status.to_string())
            .field_bool("stored", report.stored)
            .emit(),
        Ok(RequestOutcome::Bubbled) => logger.info("no static fallback, bubbled to caller"),
        Ok(RequestOutcome::Handled(by)) => logger
            .builder(LogLevel::Debug, "handled by boundary hook")
            .field("hook", format!("{:?}", by))
            .emit(),
        Err(e) => {
            if !lifecycle.phase().is_terminal() {
                let _ = lifecycle.advance(RequestPhase::Failed);
            }
            logger
                .builder(LogLevel::Error, "request failed")
                .field("error", e.to_string())
                .field("phase", lifecycle.phase().as_str())
                .emit();
        }
    }
    result
}

async fn serve<C>(
    capabilities: &C,
    dispatcher: &RenderDispatcher,
    render: &dyn RenderFn,
    request: &PageRequest,
    response: &mut OutgoingResponse<ResponseSink>,
    lifecycle: &mut RequestLifecycle,
    logger: &mut RequestLogger,
) -> Result<RequestOutcome, ServerError>
where
    C: ServerCapabilities + ?Sized,
{
    let hooks = capabilities.hooks();

    if request.headers.contains_key(UPGRADE) {
        (hooks.handle_upgrade)(request);
        return Ok(RequestOutcome::Handled(HandledBy::Upgrade));
    }
    if let Some(middleware) = (hooks.middleware)(request) {
        debug!(page = %middleware.page, "middleware matched");
    }

    let rewrites = (hooks.rewrites)();
    let mut url = request.url.clone();
    if let Some(destination) = apply_rewrites(&rewrites.before_files, &url.pathname) {
        url.pathname = destination.to_string();
    }
    if let Some(file) = (hooks.find_public_file)(&url.pathname) {
        return Ok(RequestOutcome::Handled(HandledBy::PublicFile(file)));
    }
    if let Some(destination) = apply_rewrites(&rewrites.after_files, &url.pathname) {
        url.pathname = destination.to_string();
    }
    if is_api_route(&url.pathname) && (hooks.handle_api_request)(request) {
        return Ok(RequestOutcome::Handled(HandledBy::ApiRoute));
    }

    let route = find_route(capabilities, dispatcher, &mut url, &rewrites.fallback)?;
    Span::current().record("page", route.page());
    logger.set_page(route.page());

    let url = capabilities.route_resolver().resolve(route, url)?;
    lifecycle.advance(RequestPhase::Normalized)?;

    let cacheable = request.method == Method::GET || request.method == Method::HEAD;
    let cache = capabilities.create_cache(request);
    let (route, url) = if cache.manifest().is_not_found(&cache_path(&url)) {
        let not_found = capabilities
            .resolve_route(NOT_FOUND_PAGE)
            .ok_or_else(|| ServerError::NotFound(url.pathname.clone()))?;
        debug!(pathname = %url.pathname, "prerendered as not found");
        response.set_status(StatusCode::NOT_FOUND)?;
        Span::current().record("page", not_found.page());
        logger.set_page(not_found.page());
        (not_found, ParsedRequestUrl::new(NOT_FOUND_PAGE, url.query))
    } else {
        (route, url)
    };
    let responses = capabilities.create_response_cache();
    let key_path = cache_path(&url);
    let lookup = if cacheable {
        lookup_page(&responses, &cache, &key_path).await
    } else {
        CacheLookup::Bypass
    };
    let cache_status = lookup.status();
    let mut options = delivery_options(capabilities.config(), request);
    options.extra_headers.push((
        HeaderName::from_static(CACHE_STATUS_HEADER),
        cache_status.to_string(),
    ));

    if let CacheLookup::Hit(entry) = &lookup {
        lifecycle.advance(RequestPhase::Serving)?;
        let result = RenderResult::Buffered {
            content: entry.page.body.clone(),
            content_type: entry.page.content_type.clone(),
        };

        lifecycle.advance(RequestPhase::Emitting)?;
        let emitted = capabilities.emit_response(response, result, &options).await?;
        lifecycle.advance(RequestPhase::Complete)?;

        return Ok(RequestOutcome::Served(ServeReport {
            page: route.page().to_string(),
            pathname: url.pathname,
            cache_status,
            stored: false,
            emitted,
            phases: lifecycle.history().to_vec(),
        }));
    }

    lifecycle.advance(RequestPhase::Rendering)?;
    let pathname = url.pathname.clone();
    let outcome = dispatcher
        .dispatch(request, response.head_mut()?, url, render, route)
        .await?;

    let result = match outcome {
        DispatchOutcome::Finished(result) => result,
        DispatchOutcome::Bubbled => {
            lifecycle.advance(RequestPhase::Bubbled)?;
            return Ok(RequestOutcome::Bubbled);
        }
    };
    lifecycle.advance(RequestPhase::Rendered)?;

    let stored = match (&result, cacheable && response.head().status.is_success()) {
        (RenderResult::Buffered { content, content_type }, true) => {
            let page = CachedPage::new(content.clone(), content_type.clone());
            store_page(&responses, &cache, &key_path, route, &lookup, page).await
        }
        _ => false,
    };

    lifecycle.advance(RequestPhase::Emitting)?;
    let emitted = capabilities.emit_response(response, result, &options).await?;
    lifecycle.advance(RequestPhase::Complete)?;

    Ok(RequestOutcome::Served(ServeReport {
        page: route.page().to_string(),
        pathname,
        cache_status,
        stored,
        emitted,
        phases: lifecycle.history().to_vec(),
    }))
}

fn find_route<'c, C>(
    capabilities: &'c C,
    dispatcher: &RenderDispatcher,
    url: &mut ParsedRequestUrl,
    fallback: &[Rewrite],
) -> Result<&'c RouteDefinition, ServerError>
where
    C: ServerCapabilities + ?Sized,
{
    if url.pathname.is_empty() {
        return Err(page_core::PageError::invalid_input("pathname is undefined").into());
    }
    if let Some(route) = capabilities.resolve_route(&url.pathname) {
        return Ok(route);
    }
    if url.pathname == dispatcher.not_found_marker() {
        if let Some(route) = capabilities.resolve_route(NOT_FOUND_PAGE) {
            return Ok(route);
        }
    }
    if let Some(destination) = apply_rewrites(fallback, &url.pathname) {
        url.pathname = destination.to_string();
        if let Some(route) = capabilities.resolve_route(&url.pathname) {
            return Ok(route);
        }
    }
    Err(ServerError::NotFound(url.pathname.clone()))
}

async fn lookup_page(responses: &ResponseCache, cache: &IncrementalCache, path: &str) -> CacheLookup {
    match responses.lookup(cache, path).await {
        Ok(lookup) => lookup,
        Err(e) => {
            warn!(error = %e, path, "cache lookup failed, rendering fresh");
            CacheLookup::Bypass
        }
    }
}

async fn store_page(
    responses: &ResponseCache,
    cache: &IncrementalCache,
    path: &str,
    route: &RouteDefinition,
    previous: &CacheLookup,
    page: CachedPage,
) -> bool {
    match responses
        .store(cache, path, Some(route.page()), previous, page)
        .await
    {
        Ok(stored) => stored,
        Err(e) => {
            warn!(error = %e, path, "cache store failed");
            false
        }
    }
}

/// Cache path for a resolved URL, keeping locales apart.
fn cache_path(url: &ParsedRequestUrl) -> String {
    match url.query.get_str(LOCALE_QUERY_KEY) {
        Some(locale) if url.pathname == "/" => format!("/{}", locale),
        Some(locale) => format!("/{}{}", locale, url.pathname),
        None => url.pathname.clone(),
    }
}

fn delivery_options(config: &ServerConfig, request: &PageRequest) -> DeliveryOptions {
    let content_kind = if request.headers.contains_key(DATA_REQUEST_HEADER) {
        ContentKind::Json
    } else {
        ContentKind::Html
    };

    DeliveryOptions {
        content_kind,
        generate_etags: config.generate_etags,
        advertise_powered_by: config.powered_by_header,
        powered_by_value: config.powered_by_value.clone(),
        if_none_match: request
            .headers
            .get(IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        extra_headers: Vec::new(),
    }
}

/// A capability set bound to a dispatcher and render function.
pub struct PageServer<C> {
    capabilities: C,
    dispatcher: RenderDispatcher,
    render: Arc<dyn RenderFn>,
}

impl<C: ServerCapabilities> PageServer<C> {
    /// Create a server. Render options are built once from the capabilities' config.
    pub fn new(capabilities: C, render: Arc<dyn RenderFn>) -> Self {
        let config = capabilities.config();
        let dispatcher = RenderDispatcher::new(RenderOptions::from_config(config))
            .with_bubble_flag(config.honor_bubble_flag);

        Self {
            capabilities,
            dispatcher,
            render,
        }
    }

    /// The capability set.
    pub fn capabilities(&self) -> &C {
        &self.capabilities
    }

    /// The dispatcher.
    pub fn dispatcher(&self) -> &RenderDispatcher {
        &self.dispatcher
    }

    /// Handle one request.
    pub async fn handle(
        &self,
        request: PageRequest,
        response: &mut OutgoingResponse<ResponseSink>,
    ) -> Result<RequestOutcome, ServerError> {
        handle_request(
            &self.capabilities,
            &self.dispatcher,
            self.render.as_ref(),
            request,
            response,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use page_core::Query;

    #[test]
    fn test_cache_path_keeps_locales_apart() {
        let mut query = Query::new();
        assert_eq!(cache_path(&ParsedRequestUrl::new("/about", query.clone())), "/about");

        query.insert(LOCALE_QUERY_KEY, "fr");
        assert_eq!(cache_path(&ParsedRequestUrl::new("/about", query.clone())), "/fr/about");
        assert_eq!(cache_path(&ParsedRequestUrl::new("/", query)), "/fr");
    }

    #[test]
    fn test_delivery_options_from_request() {
        let config = ServerConfig::default();
        let mut request = PageRequest::get("/").unwrap();
        assert_eq!(delivery_options(&config, &request).content_kind, ContentKind::Html);

        request
            .headers
            .insert(DATA_REQUEST_HEADER, http::HeaderValue::from_static("1"));
        request
            .headers
            .insert(IF_NONE_MATCH, http::HeaderValue::from_static("\"abc\""));
        let options = delivery_options(&config, &request);
        assert_eq!(options.content_kind, ContentKind::Json);
        assert_eq!(options.if_none_match.as_deref(), Some("\"abc\""));
        assert!(options.advertise_powered_by);
    }
}
