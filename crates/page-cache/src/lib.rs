//! Incremental cache for prerendered pages.
//!
//! This crate provides:
//! - `PrerenderManifest` - Build-time catalog of prerendered routes
//! - `IncrementalCacheConfig` - Per-request cache configuration
//! - `ArtifactStore` / `MemoryStore` - Shared artifact storage
//! - `IncrementalCacheFactory` - Builds a request-scoped `IncrementalCache`
//! - `ResponseCache` - Serve/render/store policy on top of the cache
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use page_cache::{IncrementalCacheConfig, IncrementalCacheFactory, MemoryStore};
//!
//! let factory = IncrementalCacheFactory::new(Arc::new(MemoryStore::with_budget(50 << 20)));
//! let cache = factory.create(&request.headers, IncrementalCacheConfig::from_server_config(&config), None);
//! let lookup = cache.get("/blog/hello").await?;
//! ```

mod config;
mod error;
mod incremental;
mod key;
mod manifest;
mod response;
mod store;

pub use config::*;
pub use error::*;
pub use incremental::*;
pub use key::*;
pub use manifest::*;
pub use response::*;
pub use store::*;
