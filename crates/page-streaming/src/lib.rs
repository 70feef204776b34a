//! Response delivery for rendered pages.
//!
//! A render produces a [`RenderResult`] that is either buffered or streamed.
//! The [`ResponseEmitter`] turns it into frames on an [`OutgoingResponse`]:
//! - `OutgoingResponse` - Head/body/end frames over any `Sink`, head committed once
//! - `CloseListeners` - Client-disconnect and caller close notification
//! - `OnceCallback` - Single-fire guard shared by every exit of a stream
//! - `generate_etag` - Strong ETags for buffered bodies

mod close;
mod emitter;
mod error;
mod etag;
mod response;
mod result;

pub use close::*;
pub use emitter::*;
pub use error::*;
pub use etag::*;
pub use response::*;
pub use result::*;
