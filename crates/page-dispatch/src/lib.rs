//! Render dispatch for resolved routes.
//!
//! - `RenderFn` - The injected rendering function
//! - `RenderDispatcher` - Not-found mapping, render overlay and fallback bubbling
//! - `DispatchOutcome` - Finished with a result, or bubbled to the caller

mod dispatcher;
mod error;
mod render;

pub use dispatcher::*;
pub use error::*;
pub use render::*;
