//! Error taxonomy shared by the request pipeline.

use thiserror::Error;

use crate::lifecycle::RequestPhase;

/// Result alias for pipeline operations.
pub type PageResult<T> = Result<T, PageError>;

/// Errors raised while turning a request into a response.
#[derive(Debug, Error)]
pub enum PageError {
    /// Malformed or absent input, e.g. an empty pathname. Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A dynamic route has no precomputed static fallback.
    #[error("no static fallback available for this route")]
    NoFallback,

    /// Any other failure from the rendering function, propagated unchanged.
    #[error(transparent)]
    Render(#[from] anyhow::Error),

    /// The request lifecycle was driven through an impossible transition.
    #[error("invalid lifecycle transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: RequestPhase,
        to: RequestPhase,
    },
}

impl PageError {
    /// Create an input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Check whether this is the no-fallback signal.
    pub fn is_no_fallback(&self) -> bool {
        matches!(self, Self::NoFallback)
    }
}
