//! The rendering function seam.

use async_trait::async_trait;
use page_core::{PageRequest, PageResult, Query, RenderOptions};
use page_streaming::{RenderResult, ResponseHead};

/// Renders a page.
///
/// Receives the original request, the response head (to set headers such as
/// a content type), the resolved pathname and query, and the merged render
/// options. May fail with [`page_core::PageError::NoFallback`] when a
/// dynamic route has no static fallback yet.
#[async_trait]
pub trait RenderFn: Send + Sync {
    async fn render(
        &self,
        request: &PageRequest,
        head: &mut ResponseHead,
        pathname: &str,
        query: &Query,
        options: &RenderOptions,
    ) -> PageResult<RenderResult>;
}

/// Adapts a synchronous closure of `(pathname, query, options)` into a [`RenderFn`].
pub struct FnRender<F>(pub F);

#[async_trait]
impl<F> RenderFn for FnRender<F>
where
    F: Fn(&str, &Query, &RenderOptions) -> PageResult<RenderResult> + Send + Sync,
{
    async fn render(
        &self,
        _request: &PageRequest,
        _head: &mut ResponseHead,
        pathname: &str,
        query: &Query,
        options: &RenderOptions,
    ) -> PageResult<RenderResult> {
        (self.0)(pathname, query, options)
    }
}
