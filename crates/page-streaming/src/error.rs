//! Errors raised while writing a response.

use page_core::PageError;
use thiserror::Error;

/// Result alias for response emission.
pub type EmitResult<T> = Result<T, EmitError>;

/// Errors that can occur while emitting a response.
#[derive(Debug, Error)]
pub enum EmitError {
    /// Headers cannot change once the head frame is on the wire.
    #[error("headers already sent")]
    HeadersSent,

    /// The response was already finalized.
    #[error("response already finished")]
    Finished,

    /// A header value could not be encoded.
    #[error("invalid value for header {name}")]
    InvalidHeader { name: String },

    /// The transport rejected a frame.
    #[error("transport error: {0}")]
    Transport(String),

    /// The body producer failed.
    #[error(transparent)]
    Body(#[from] PageError),
}
