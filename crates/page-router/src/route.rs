//! Route definitions built from the route manifest.

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::RouteError;
use crate::matcher::RouteMatcher;

/// One segment of a page path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text, e.g. `blog`.
    Static(String),
    /// Named parameter: `[id]`, `[...path]` or `[[...path]]`.
    Dynamic {
        name: String,
        repeat: bool,
        optional: bool,
    },
}

impl Segment {
    fn parse(page: &str, raw: &str) -> Result<Self, RouteError> {
        if !raw.starts_with('[') {
            if raw.contains('[') || raw.contains(']') {
                return Err(RouteError::invalid(
                    page,
                    format!("segment '{}' mixes literal text and brackets", raw),
                ));
            }
            return Ok(Self::Static(raw.to_string()));
        }

        let (inner, optional) = if raw.starts_with("[[") && raw.ends_with("]]") {
            (&raw[2..raw.len() - 2], true)
        } else if raw.ends_with(']') {
            (&raw[1..raw.len() - 1], false)
        } else {
            return Err(RouteError::invalid(page, format!("unclosed segment '{}'", raw)));
        };

        let (name, repeat) = match inner.strip_prefix("...") {
            Some(name) => (name, true),
            None => (inner, false),
        };

        if optional && !repeat {
            return Err(RouteError::invalid(
                page,
                "optional segments must be catch-all ([[...name]])",
            ));
        }
        if name.is_empty() || name.contains(['[', ']', '/']) {
            return Err(RouteError::invalid(page, format!("bad parameter name in '{}'", raw)));
        }

        Ok(Self::Dynamic {
            name: name.to_string(),
            repeat,
            optional,
        })
    }

    /// Whether this segment is a parameter.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic { .. })
    }
}

/// Classification of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Fully literal path.
    Static,
    /// Path with parameter segments.
    Dynamic,
    /// Framework page such as `/404`, `/500` or `/_error`.
    System,
}

/// Immutable descriptor of a page route.
#[derive(Debug, Clone)]
pub struct RouteDefinition {
    page: String,
    kind: PageKind,
    segments: Vec<Segment>,
    matcher: Option<RouteMatcher>,
}

impl RouteDefinition {
    /// Compile a page path such as `/blog/[slug]`.
    pub fn new(page: impl Into<String>) -> Result<Self, RouteError> {
        let page = page.into();
        if !page.starts_with('/') {
            return Err(RouteError::invalid(&page, "page must start with '/'"));
        }

        let segments = page
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| Segment::parse(&page, s))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        for (index, segment) in segments.iter().enumerate() {
            if let Segment::Dynamic { name, repeat, .. } = segment {
                if !seen.insert(name.as_str()) {
                    return Err(RouteError::invalid(
                        &page,
                        format!("duplicate parameter '{}'", name),
                    ));
                }
                if *repeat && index != segments.len() - 1 {
                    return Err(RouteError::invalid(&page, "catch-all must be the last segment"));
                }
            }
        }

        let kind = if segments.iter().any(Segment::is_dynamic) {
            PageKind::Dynamic
        } else if is_system_page(&page) {
            PageKind::System
        } else {
            PageKind::Static
        };

        let matcher = match kind {
            PageKind::Dynamic => Some(RouteMatcher::compile(&page, &segments)?),
            _ => None,
        };

        Ok(Self {
            page,
            kind,
            segments,
            matcher,
        })
    }

    /// Canonical page path.
    pub fn page(&self) -> &str {
        &self.page
    }

    /// Page classification.
    pub fn kind(&self) -> PageKind {
        self.kind
    }

    /// Whether the page has parameter segments.
    pub fn is_dynamic(&self) -> bool {
        self.kind == PageKind::Dynamic
    }

    /// Parsed segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Compiled matcher for dynamic pages.
    pub fn matcher(&self) -> Option<&RouteMatcher> {
        self.matcher.as_ref()
    }

    /// Parameter names in path order.
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Dynamic { name, .. } => Some(name.as_str()),
                Segment::Static(_) => None,
            })
            .collect()
    }

    /// Check whether a concrete path belongs to this route.
    pub fn matches(&self, path: &str) -> bool {
        match &self.matcher {
            Some(matcher) => matcher.match_path(path).is_some(),
            None => strip_trailing_slash(path) == self.page,
        }
    }

    // Static segments first, catch-alls last, so more specific routes win.
    fn specificity(&self) -> (usize, usize, usize) {
        let statics = self.segments.iter().filter(|s| !s.is_dynamic()).count();
        let catch_all = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Dynamic { repeat: true, .. }))
            .count();
        (statics, usize::MAX - catch_all, self.segments.len())
    }
}

/// Route manifest as produced by the build.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteManifest {
    /// Page paths.
    pub pages: Vec<String>,
}

/// All routes known to the server, compiled at startup.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    statics: Vec<RouteDefinition>,
    dynamics: Vec<RouteDefinition>,
}

impl RouteTable {
    /// Compile a set of page paths.
    pub fn from_pages<I, S>(pages: I) -> Result<Self, RouteError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::default();
        for page in pages {
            let route = RouteDefinition::new(page)?;
            if route.is_dynamic() {
                table.dynamics.push(route);
            } else {
                table.statics.push(route);
            }
        }
        table
            .dynamics
            .sort_by(|a, b| b.specificity().cmp(&a.specificity()));
        Ok(table)
    }

    /// Compile the routes of a JSON route manifest.
    pub fn from_manifest_json(json: &str) -> Result<Self, RouteError> {
        let manifest: RouteManifest = serde_json::from_str(json)
            .map_err(|e| RouteError::invalid("<manifest>", e.to_string()))?;
        Self::from_pages(manifest.pages)
    }

    /// Find the route a concrete path belongs to.
    pub fn find(&self, path: &str) -> Option<&RouteDefinition> {
        self.statics
            .iter()
            .find(|r| r.matches(path))
            .or_else(|| self.dynamics.iter().find(|r| r.matches(path)))
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.statics.len() + self.dynamics.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether a path addresses a programmatic API route.
pub fn is_api_route(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

/// Remove a trailing slash, keeping the root as `/`.
pub fn strip_trailing_slash(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

fn is_system_page(page: &str) -> bool {
    page == "/404" || page == "/500" || page.starts_with("/_")
}
