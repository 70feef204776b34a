//! Observability for the page server.
//!
//! - `init_tracing` - Global `tracing` subscriber, JSON or human-readable
//! - `RequestLogger` - Per-request structured logger with timing

mod logging;
mod subscriber;

pub use logging::*;
pub use subscriber::*;
