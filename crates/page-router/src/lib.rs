//! Route resolution for the page server.
//!
//! Page paths follow bracket conventions for dynamic segments:
//!
//! ```text
//! /                      -> static
//! /blog/[slug]           -> /blog/hello
//! /docs/[...path]        -> /docs/a/b/c
//! /shop/[[...filters]]   -> /shop, /shop/red/xl
//! ```
//!
//! A [`RouteDefinition`] compiles its page path into a [`RouteMatcher`]; the
//! [`RouteResolver`] uses it to turn the incoming URL into the canonical,
//! fully interpolated pathname the render function expects.

mod error;
mod locale;
mod matcher;
mod resolver;
mod route;

pub use error::*;
pub use locale::*;
pub use matcher::*;
pub use resolver::*;
pub use route::*;
