//! Core abstractions for the hybrid static/dynamic page server.
//!
//! This crate provides the fundamental types shared by every stage of a request:
//! - `ParsedRequestUrl` / `Query` - Normalized pathname and query mapping
//! - `PageRequest` - The incoming request as seen by the render function
//! - `ServerConfig` / `RenderOptions` - Process-wide configuration and per-call overlays
//! - `RequestLifecycle` - Per-request state machine tracking
//! - `PageError` - Error taxonomy shared across crates

mod config;
mod context;
mod error;
mod lifecycle;

pub use config::*;
pub use context::*;
pub use error::*;
pub use lifecycle::*;
