//! Request orchestration for the page server.
//!
//! Re-exports every crate of the workspace and adds the fixed request
//! orchestrator, parameterized by a [`ServerCapabilities`] implementation:
//!
//! ```ignore
//! use page_server::prelude::*;
//!
//! let routes = RouteTable::from_pages(["/", "/blog/[slug]"])?;
//! let server = PageServer::new(WebCapabilities::new(config, routes), Arc::new(MyRenderer));
//!
//! let mut response = OutgoingResponse::new(response_sink(transport));
//! match server.handle(request, &mut response).await? {
//!     RequestOutcome::Served(report) => tracing::info!(status = %report.cache_status, "served"),
//!     RequestOutcome::Bubbled => generate_on_demand(),
//!     RequestOutcome::Handled(_) => {}
//! }
//! ```

mod capabilities;
mod error;
mod hooks;
mod orchestrator;

pub use capabilities::*;
pub use error::*;
pub use hooks::*;
pub use orchestrator::*;

pub use page_cache;
pub use page_core;
pub use page_dispatch;
pub use page_observability;
pub use page_router;
pub use page_streaming;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::capabilities::*;
    pub use crate::error::*;
    pub use crate::hooks::*;
    pub use crate::orchestrator::*;
    pub use page_cache::*;
    pub use page_core::*;
    pub use page_dispatch::*;
    pub use page_observability::*;
    pub use page_router::*;
    pub use page_streaming::*;
}
