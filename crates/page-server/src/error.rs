//! Errors surfaced to the caller of the orchestrator.

use page_core::PageError;
use page_dispatch::RenderError;
use page_router::RouteError;
use page_streaming::EmitError;
use thiserror::Error;

/// Errors that can occur while handling a request.
///
/// Mapping these to HTTP status codes is left to the caller.
#[derive(Debug, Error)]
pub enum ServerError {
    /// No page matches the pathname.
    #[error("no route matches {0}")]
    NotFound(String),

    /// Route resolution failed.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// The render failed or the no-fallback signal was not bubbled.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Writing the response failed.
    #[error(transparent)]
    Emit(#[from] EmitError),

    /// Input or lifecycle error.
    #[error(transparent)]
    Page(#[from] PageError),
}
