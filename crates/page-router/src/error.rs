//! Route error types.

use page_core::PageError;
use thiserror::Error;

/// Errors raised while compiling or resolving routes.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The incoming pathname was empty or missing.
    #[error("pathname is undefined")]
    EmptyPathname,

    /// The page path could not be compiled.
    #[error("invalid route definition '{page}': {reason}")]
    InvalidDefinition { page: String, reason: String },

    /// A required dynamic parameter had no value.
    #[error("missing value for parameter '{param}' of route '{page}'")]
    MissingParam { page: String, param: String },
}

impl RouteError {
    pub(crate) fn invalid(page: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            page: page.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<RouteError> for PageError {
    fn from(err: RouteError) -> Self {
        PageError::InvalidInput(err.to_string())
    }
}
