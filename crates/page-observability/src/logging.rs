//! Structured logging with request context.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use page_core::{Query, RequestId, BUBBLE_NO_FALLBACK_QUERY_KEY};
use serde::Serialize;
use tracing::{debug, error, field, info, info_span, trace, warn, Span};

/// Log level for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace => write!(f, "TRACE"),
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Per-request structured logger.
///
/// Every event carries the request id, the page (once known) and the
/// microseconds elapsed since the logger was created. Events go through
/// `tracing`, so the installed subscriber decides format and filtering.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    request_id: RequestId,
    page: Option<String>,
    start_time: Instant,
}

impl RequestLogger {
    /// Create a logger for a request.
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            page: None,
            start_time: Instant::now(),
        }
    }

    /// Set the page being served.
    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }

    /// Record the page once the route is known.
    pub fn set_page(&mut self, page: impl Into<String>) {
        self.page = Some(page.into());
    }

    /// Span covering the whole request.
    ///
    /// `page` stays empty until recorded, e.g. once the route is known.
    pub fn span(&self) -> Span {
        let span = info_span!(
            "page_request",
            request_id = %self.request_id,
            page = field::Empty,
        );
        if let Some(page) = &self.page {
            span.record("page", page.as_str());
        }
        span
    }

    /// Log at debug level.
    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, BTreeMap::new());
    }

    /// Log at info level.
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, BTreeMap::new());
    }

    /// Log at warn level.
    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message, BTreeMap::new());
    }

    /// Log at error level.
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message, BTreeMap::new());
    }

    /// Start building an entry.
    pub fn builder(&self, level: LogLevel, message: impl Into<String>) -> LogBuilder<'_> {
        LogBuilder::new(self, level, message)
    }

    fn log(&self, level: LogLevel, message: &str, fields: BTreeMap<String, serde_json::Value>) {
        let request_id = self.request_id.to_string();
        let page = self.page.as_deref().unwrap_or("");
        let elapsed_us = self.elapsed_us();
        let fields = if fields.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&fields).unwrap_or_default()
        };

        match level {
            LogLevel::Trace => trace!(%request_id, page, elapsed_us, %fields, "{}", message),
            LogLevel::Debug => debug!(%request_id, page, elapsed_us, %fields, "{}", message),
            LogLevel::Info => info!(%request_id, page, elapsed_us, %fields, "{}", message),
            LogLevel::Warn => warn!(%request_id, page, elapsed_us, %fields, "{}", message),
            LogLevel::Error => error!(%request_id, page, elapsed_us, %fields, "{}", message),
        }
    }

    /// Get the request ID.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Get the page, if set.
    pub fn page(&self) -> Option<&str> {
        self.page.as_deref()
    }

    /// Get elapsed time since logger creation.
    pub fn elapsed_us(&self) -> u64 {
        self.start_time.elapsed().as_micros() as u64
    }
}

/// Builder for log entries with fluent API.
pub struct LogBuilder<'a> {
    logger: &'a RequestLogger,
    level: LogLevel,
    message: String,
    fields: BTreeMap<String, serde_json::Value>,
}

impl<'a> LogBuilder<'a> {
    /// Create a new log builder.
    pub fn new(logger: &'a RequestLogger, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            logger,
            level,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a string field.
    pub fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields
            .insert(key.to_string(), serde_json::json!(value.into()));
        self
    }

    /// Add an integer field.
    pub fn field_u64(mut self, key: &str, value: u64) -> Self {
        self.fields.insert(key.to_string(), serde_json::json!(value));
        self
    }

    /// Add a boolean field.
    pub fn field_bool(mut self, key: &str, value: bool) -> Self {
        self.fields.insert(key.to_string(), serde_json::json!(value));
        self
    }

    /// Add the request query, without private flags.
    pub fn query(mut self, query: &Query) -> Self {
        self.fields
            .insert("query".to_string(), loggable_query(query));
        self
    }

    /// Fields collected so far.
    pub fn fields(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.fields
    }

    /// Emit the log entry.
    pub fn emit(self) {
        self.logger.log(self.level, &self.message, self.fields);
    }
}

/// The query as JSON with the bubble-no-fallback flag removed.
pub fn loggable_query(query: &Query) -> serde_json::Value {
    let mut query = query.clone();
    query.remove(BUBBLE_NO_FALLBACK_QUERY_KEY);
    serde_json::to_value(&query).unwrap_or_default()
}
