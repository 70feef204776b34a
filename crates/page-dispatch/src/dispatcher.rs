//! Invokes the render function for a resolved route.

use std::borrow::Cow;

use page_core::{
    PageError, PageRequest, ParsedRequestUrl, RenderOptions, RenderOverlay, Runtime,
    BUBBLE_NO_FALLBACK_QUERY_KEY,
};
use page_router::{is_api_route, RouteDefinition};
use page_streaming::{RenderResult, ResponseHead};
use tracing::{debug, warn};

use crate::error::RenderError;
use crate::render::RenderFn;

/// Not-found marker pathname in development.
pub const DEV_NOT_FOUND_MARKER: &str = "/not-found";

/// Not-found marker pathname in production.
pub const NOT_FOUND_MARKER: &str = "/_not-found";

/// Canonical not-found page.
pub const NOT_FOUND_PAGE: &str = "/404";

/// Overlay applied to every render call from this dispatcher.
pub const DISPATCH_OVERLAY: RenderOverlay = RenderOverlay {
    runtime: Some(Runtime::Edge),
    disable_optimized_loading: Some(true),
    supports_dynamic_response: Some(true),
};

/// Outcome of a dispatch.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The page rendered.
    Finished(RenderResult),
    /// No static fallback exists and the caller asked for the signal to bubble.
    Bubbled,
}

impl DispatchOutcome {
    /// Whether rendering produced a result.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }

    /// The render result, if finished.
    pub fn into_result(self) -> Option<RenderResult> {
        match self {
            Self::Finished(result) => Some(result),
            Self::Bubbled => None,
        }
    }
}

/// A resolved URL ready for rendering, with the bubble flag extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRender {
    pub url: ParsedRequestUrl,
    pub bubble_no_fallback: bool,
}

/// Dispatches resolved requests to the render function.
#[derive(Debug, Clone)]
pub struct RenderDispatcher {
    options: RenderOptions,
    honor_bubble_flag: bool,
}

impl RenderDispatcher {
    /// Create a dispatcher over the process-wide render options.
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            honor_bubble_flag: true,
        }
    }

    /// Whether the private bubble flag is honored at all.
    pub fn with_bubble_flag(mut self, honor: bool) -> Self {
        self.honor_bubble_flag = honor;
        self
    }

    /// Base render options.
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Not-found marker for the current mode.
    pub fn not_found_marker(&self) -> &'static str {
        if self.options.dev {
            DEV_NOT_FOUND_MARKER
        } else {
            NOT_FOUND_MARKER
        }
    }

    /// Map the not-found marker and extract the bubble flag.
    ///
    /// The flag is always removed from the query so it never reaches the
    /// render function or the logs. API routes never bubble.
    pub fn prepare(&self, mut url: ParsedRequestUrl, route: &RouteDefinition) -> PreparedRender {
        if url.pathname == self.not_found_marker() {
            debug!(from = %url.pathname, to = NOT_FOUND_PAGE, "mapping not-found marker");
            url.pathname = NOT_FOUND_PAGE.to_string();
        }

        let requested = url
            .query
            .remove(BUBBLE_NO_FALLBACK_QUERY_KEY)
            .is_some_and(|v| v.is_truthy());
        let api = is_api_route(route.page()) || is_api_route(&url.pathname);

        PreparedRender {
            url,
            bubble_no_fallback: requested && !api && self.honor_bubble_flag,
        }
    }

    /// Render `url` for `route`.
    ///
    /// Returns [`DispatchOutcome::Bubbled`] when the render raises the
    /// no-fallback signal and bubbling was requested. The signal without
    /// the flag and every other error propagate.
    pub async fn dispatch(
        &self,
        request: &PageRequest,
        head: &mut ResponseHead,
        url: ParsedRequestUrl,
        render: &dyn RenderFn,
        route: &RouteDefinition,
    ) -> Result<DispatchOutcome, RenderError> {
        if url.pathname.is_empty() {
            return Err(PageError::invalid_input("pathname is undefined").into());
        }

        let PreparedRender {
            url,
            bubble_no_fallback,
        } = self.prepare(url, route);
        let options = self.options.merge(&DISPATCH_OVERLAY);
        let request = without_bubble_flag(request);

        match render
            .render(&request, head, &url.pathname, &url.query, &options)
            .await
        {
            Ok(result) => Ok(DispatchOutcome::Finished(result)),
            Err(PageError::NoFallback) if bubble_no_fallback => {
                debug!(page = route.page(), "bubbling no-fallback signal");
                Ok(DispatchOutcome::Bubbled)
            }
            Err(PageError::NoFallback) => {
                warn!(page = route.page(), "no static fallback and bubbling not requested");
                Err(RenderError::NoFallback {
                    page: route.page().to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// The request with the bubble flag removed from its original query.
fn without_bubble_flag(request: &PageRequest) -> Cow<'_, PageRequest> {
    if !request.url.query.contains_key(BUBBLE_NO_FALLBACK_QUERY_KEY) {
        return Cow::Borrowed(request);
    }
    let mut stripped = request.clone();
    stripped.url.query.remove(BUBBLE_NO_FALLBACK_QUERY_KEY);
    Cow::Owned(stripped)
}
