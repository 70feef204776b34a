//! Boundary hooks for concerns handled outside the request core.
//!
//! Each hook is a plain function with a named default, so a platform only
//! overrides what it actually supports and the orchestrator never branches
//! on a hook being absent.

use std::path::PathBuf;

use page_core::PageRequest;

/// A single rewrite from an exact source path to a destination path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub source: String,
    pub destination: String,
}

impl Rewrite {
    /// Create a rewrite.
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Rewrite rules in evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteRules {
    /// Applied before public files and pages are checked.
    pub before_files: Vec<Rewrite>,
    /// Applied after public files, before pages.
    pub after_files: Vec<Rewrite>,
    /// Applied when no page matches.
    pub fallback: Vec<Rewrite>,
}

impl RewriteRules {
    /// Whether no rules are configured.
    pub fn is_empty(&self) -> bool {
        self.before_files.is_empty() && self.after_files.is_empty() && self.fallback.is_empty()
    }
}

/// Apply the first matching rewrite.
pub fn apply_rewrites<'a>(rules: &'a [Rewrite], pathname: &str) -> Option<&'a str> {
    rules
        .iter()
        .find(|r| r.source == pathname)
        .map(|r| r.destination.as_str())
}

/// Middleware that matched a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiddlewareMatch {
    pub page: String,
}

/// Hooks for API routes, upgrades, public files, middleware and rewrites.
#[derive(Clone, Copy)]
pub struct BoundaryHooks {
    /// Execute an API route. Returns whether the request was handled.
    pub handle_api_request: fn(&PageRequest) -> bool,
    /// Take over a connection upgrade.
    pub handle_upgrade: fn(&PageRequest),
    /// Locate a file in the public directory.
    pub find_public_file: fn(&str) -> Option<PathBuf>,
    /// Find middleware for the request.
    pub middleware: fn(&PageRequest) -> Option<MiddlewareMatch>,
    /// Load the rewrite rules.
    pub rewrites: fn() -> RewriteRules,
}

impl Default for BoundaryHooks {
    fn default() -> Self {
        Self {
            handle_api_request: api_request_not_handled,
            handle_upgrade: ignore_upgrade,
            find_public_file: no_public_file,
            middleware: no_middleware,
            rewrites: no_rewrites,
        }
    }
}

impl std::fmt::Debug for BoundaryHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryHooks").finish_non_exhaustive()
    }
}

/// Default API hook: never handles the request.
pub fn api_request_not_handled(_request: &PageRequest) -> bool {
    false
}

/// Default upgrade hook: does nothing.
pub fn ignore_upgrade(_request: &PageRequest) {}

/// Default public file lookup: finds nothing.
pub fn no_public_file(_pathname: &str) -> Option<PathBuf> {
    None
}

/// Default middleware lookup: matches nothing.
pub fn no_middleware(_request: &PageRequest) -> Option<MiddlewareMatch> {
    None
}

/// Default rewrite manifest: empty.
pub fn no_rewrites() -> RewriteRules {
    RewriteRules::default()
}
