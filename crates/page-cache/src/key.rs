//! Cache key composition.

use serde::{Deserialize, Serialize};

/// A cache key uniquely identifying a cached page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// The computed key string.
    key: String,
    /// Components that make up the key (for debugging).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    components: Vec<String>,
}

impl CacheKey {
    /// Create a cache key from a string.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            components: Vec::new(),
        }
    }

    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Get the key components (for debugging).
    pub fn components(&self) -> &[String] {
        &self.components
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// Key policy: an optional prefix followed by the page path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheKeyPolicy {
    prefix: Option<String>,
}

impl CacheKeyPolicy {
    /// Create a policy without prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a prefix. Empty prefixes are ignored.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// Build the key for a path.
    pub fn key_for(&self, path: &str) -> CacheKey {
        let mut components = Vec::new();
        let key = match &self.prefix {
            Some(prefix) => {
                components.push(format!("prefix:{}", prefix));
                format!("{}:{}", prefix, path)
            }
            None => path.to_string(),
        };
        components.push(format!("route:{}", path));

        CacheKey { key, components }
    }
}
