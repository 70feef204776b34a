//! Request context: identifiers, query mapping and the parsed request URL.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use http::{HeaderMap, Method};
use serde::Serialize;

use crate::error::PageError;

/// Private query flag asking the dispatcher to bubble the no-fallback signal.
pub const BUBBLE_NO_FALLBACK_QUERY_KEY: &str = "_nextBubbleNoFallback";

/// Query key under which a detected locale is recorded.
pub const LOCALE_QUERY_KEY: &str = "__nextLocale";

/// Unique request identifier for tracing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new request ID.
    pub fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("{:x}-{:x}", nanos, seq))
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A query value: either a single string or a repeated key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    Single(String),
    Multi(Vec<String>),
}

impl QueryValue {
    /// First value, if any.
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Single(v) => Some(v.as_str()),
            Self::Multi(values) => values.first().map(String::as_str),
        }
    }

    /// All values in order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(v) => vec![v.as_str()],
            Self::Multi(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// Boolean-ish interpretation: a non-empty string or any list is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Single(v) => !v.is_empty(),
            Self::Multi(_) => true,
        }
    }

    fn push(&mut self, value: String) {
        match self {
            Self::Single(existing) => {
                let first = std::mem::take(existing);
                *self = Self::Multi(vec![first, value]);
            }
            Self::Multi(values) => values.push(value),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multi(values)
    }
}

/// Query string mapping, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Query(BTreeMap<String, QueryValue>);

impl Query {
    /// Create an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `key=value` pairs, collecting repeated keys into lists.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut query = Self::new();
        for (key, value) in pairs {
            query.append(key, value);
        }
        query
    }

    /// Parse a raw query string (without the leading `?`).
    pub fn parse(raw: &str) -> Self {
        Self::from_pairs(url::form_urlencoded::parse(raw.as_bytes()).into_owned())
    }

    /// Append a value, turning the key into a list when it already exists.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.get_mut(&key) {
            Some(existing) => existing.push(value),
            None => {
                self.0.insert(key, QueryValue::Single(value));
            }
        }
    }

    /// Set a value, replacing any existing one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.0.get(key)
    }

    /// Get the first value for a key.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(QueryValue::first)
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<QueryValue> {
        self.0.remove(key)
    }

    /// Check whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Rename a key, overwriting the destination.
    pub fn rename(&mut self, from: &str, to: impl Into<String>) {
        if let Some(value) = self.0.remove(from) {
            self.0.insert(to.into(), value);
        }
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &QueryValue)> {
        self.0.iter()
    }

    /// Keys in order.
    pub fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the query has no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The request URL as it moves through normalization.
///
/// The pathname is rewritten in place by the resolver (canonical page,
/// interpolated parameters, trailing slash, locale prefix) and the query
/// picks up annotations such as the detected locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequestUrl {
    /// Request pathname.
    pub pathname: String,
    /// Query parameters.
    pub query: Query,
}

impl ParsedRequestUrl {
    /// Create from parts.
    pub fn new(pathname: impl Into<String>, query: Query) -> Self {
        Self {
            pathname: pathname.into(),
            query,
        }
    }

    /// Parse a request target such as `/blog/hello?draft=1`.
    pub fn parse(target: &str) -> Result<Self, PageError> {
        let target = target.split('#').next().unwrap_or_default();
        let (path, raw_query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };

        if path.is_empty() {
            return Err(PageError::invalid_input("pathname is undefined"));
        }

        Ok(Self::new(path, Query::parse(raw_query)))
    }
}

/// The incoming request handed to the render function.
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// Unique request identifier.
    pub request_id: RequestId,
    /// HTTP method.
    pub method: Method,
    /// Request headers.
    pub headers: HeaderMap,
    /// URL as received, before normalization.
    pub url: ParsedRequestUrl,
}

impl PageRequest {
    /// Create a GET request for a target such as `/blog/hello?x=1`.
    pub fn get(target: &str) -> Result<Self, PageError> {
        Ok(Self {
            request_id: RequestId::generate(),
            method: Method::GET,
            headers: HeaderMap::new(),
            url: ParsedRequestUrl::parse(target)?,
        })
    }

    /// Replace the request headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Get a header value as a string, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
