//! Global subscriber installation.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Directive used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_DIRECTIVE: &str = "info";

/// Output format for logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (for production/log aggregation).
    #[default]
    Json,
    /// Human-readable format (for development).
    Human,
}

impl LogFormat {
    /// Human-readable in development, JSON otherwise.
    pub fn for_mode(dev: bool) -> Self {
        if dev {
            Self::Human
        } else {
            Self::Json
        }
    }
}

/// Subscriber installation failed.
#[derive(Debug, Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct ObservabilityError(String);

/// Install the global tracing subscriber.
///
/// Filtering follows `RUST_LOG`, falling back to [`DEFAULT_LOG_DIRECTIVE`].
/// Fails if a global subscriber is already set.
pub fn init_tracing(format: LogFormat) -> Result<(), ObservabilityError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));

    let fmt_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Human => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| ObservabilityError(err.to_string()))
}
