//! Dispatch errors.

use page_core::PageError;
use thiserror::Error;

/// Errors surfaced by [`crate::RenderDispatcher::dispatch`].
#[derive(Debug, Error)]
pub enum RenderError {
    /// The no-fallback signal was raised but bubbling was not requested.
    #[error("page {page} has no static fallback")]
    NoFallback { page: String },

    /// Input or render failure, propagated unchanged.
    #[error(transparent)]
    Page(#[from] PageError),
}

impl RenderError {
    /// The underlying page error, if any.
    pub fn as_page_error(&self) -> Option<&PageError> {
        match self {
            Self::Page(e) => Some(e),
            Self::NoFallback { .. } => None,
        }
    }
}
