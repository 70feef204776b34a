//! Server configuration and render options.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default in-memory budget for the incremental cache (50 MB).
pub const DEFAULT_MAX_MEMORY_CACHE_SIZE: u64 = 50 * 1024 * 1024;

/// Process-wide server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Development mode: no persistence, everything is stale.
    pub dev: bool,

    /// Read-only cache mode without on-demand regeneration.
    pub minimal_mode: bool,

    /// Build identifier of the deployed pages.
    pub build_id: String,

    /// Whether to advertise the server with `X-Powered-By`.
    pub powered_by_header: bool,

    /// Value of the `X-Powered-By` header.
    pub powered_by_value: String,

    /// Whether to compute ETags for buffered bodies.
    pub generate_etags: bool,

    /// Whether the private bubble-no-fallback query flag is honored.
    pub honor_bubble_flag: bool,

    /// Incremental cache settings.
    pub cache: CacheSettings,

    /// Locale routing, if enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub i18n: Option<I18nConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            dev: false,
            minimal_mode: false,
            build_id: "development".to_string(),
            powered_by_header: true,
            powered_by_value: "page-server".to_string(),
            generate_etags: true,
            honor_bubble_flag: true,
            cache: CacheSettings::default(),
            i18n: None,
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file, or JSON when the path ends in `.json`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path))
        } else {
            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path))
        }
    }

    /// Parse config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Incremental cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// In-memory budget in bytes. Zero disables the memory store.
    pub max_memory_cache_size: u64,

    /// Prefix applied to every cache key.
    pub fetch_cache_key_prefix: String,

    /// Request headers forwarded to revalidation.
    pub allowed_revalidate_header_keys: BTreeSet<String>,

    /// Whether fetch-level caching is enabled.
    pub fetch_cache: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_memory_cache_size: DEFAULT_MAX_MEMORY_CACHE_SIZE,
            fetch_cache_key_prefix: String::new(),
            allowed_revalidate_header_keys: BTreeSet::new(),
            fetch_cache: true,
        }
    }
}

/// Locale routing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct I18nConfig {
    /// Supported locales, e.g. `["en", "fr"]`.
    pub locales: Vec<String>,
    /// Locale used when none is present in the path.
    pub default_locale: String,
}

/// Execution target for the render function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Runtime {
    #[serde(rename = "nodejs")]
    NodeJs,
    #[serde(rename = "experimental-edge")]
    Edge,
}

/// Options passed to every render call.
///
/// Built once per process. Per-call changes go through [`RenderOptions::merge`],
/// which returns a new value instead of mutating the shared one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderOptions {
    /// Build identifier.
    pub build_id: String,
    /// Development mode.
    pub dev: bool,
    /// Whether `X-Powered-By` is advertised.
    pub powered_by_header: bool,
    /// Whether ETags are generated.
    pub generate_etags: bool,
    /// Pinned execution target, if any.
    pub runtime: Option<Runtime>,
    /// Disables the optimized script loading strategy.
    pub disable_optimized_loading: bool,
    /// Whether the render may produce a dynamic (streamed) response.
    pub supports_dynamic_response: bool,
    /// Supported locales.
    pub locales: Vec<String>,
    /// Default locale.
    pub default_locale: Option<String>,
}

impl RenderOptions {
    /// Build the process-wide render options from server config.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            build_id: config.build_id.clone(),
            dev: config.dev,
            powered_by_header: config.powered_by_header,
            generate_etags: config.generate_etags,
            runtime: None,
            disable_optimized_loading: false,
            supports_dynamic_response: false,
            locales: config
                .i18n
                .as_ref()
                .map(|i| i.locales.clone())
                .unwrap_or_default(),
            default_locale: config.i18n.as_ref().map(|i| i.default_locale.clone()),
        }
    }

    /// Return a copy with the overlay applied.
    pub fn merge(&self, overlay: &RenderOverlay) -> Self {
        let mut merged = self.clone();
        if let Some(runtime) = overlay.runtime {
            merged.runtime = Some(runtime);
        }
        if let Some(disable) = overlay.disable_optimized_loading {
            merged.disable_optimized_loading = disable;
        }
        if let Some(dynamic) = overlay.supports_dynamic_response {
            merged.supports_dynamic_response = dynamic;
        }
        merged
    }
}

/// Request-specific fields laid over [`RenderOptions`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOverlay {
    pub runtime: Option<Runtime>,
    pub disable_optimized_loading: Option<bool>,
    pub supports_dynamic_response: Option<bool>,
}
