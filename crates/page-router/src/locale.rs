//! Locale detection from path prefixes.

use page_core::I18nConfig;

/// Result of analyzing a pathname for a locale prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleAnalysis {
    /// Pathname with the locale prefix removed.
    pub pathname: String,
    /// Locale found in the first segment, if any.
    pub detected_locale: Option<String>,
}

/// Detects locale prefixes in pathnames.
pub trait LocaleProvider: Send + Sync {
    /// Analyze a pathname.
    fn analyze(&self, pathname: &str) -> LocaleAnalysis;
}

/// Locale provider over a fixed list of configured locales.
#[derive(Debug, Clone)]
pub struct I18nLocaleProvider {
    locales: Vec<String>,
    default_locale: String,
}

impl I18nLocaleProvider {
    /// Create a provider.
    pub fn new(locales: Vec<String>, default_locale: impl Into<String>) -> Self {
        Self {
            locales,
            default_locale: default_locale.into(),
        }
    }

    /// Create a provider from server config.
    pub fn from_config(config: &I18nConfig) -> Self {
        Self::new(config.locales.clone(), config.default_locale.clone())
    }

    /// Configured default locale.
    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }
}

impl LocaleProvider for I18nLocaleProvider {
    fn analyze(&self, pathname: &str) -> LocaleAnalysis {
        let trimmed = pathname.trim_start_matches('/');
        let (first, rest) = match trimmed.split_once('/') {
            Some((first, rest)) => (first, rest),
            None => (trimmed, ""),
        };

        let detected = self
            .locales
            .iter()
            .find(|locale| locale.eq_ignore_ascii_case(first));

        match detected {
            Some(locale) => LocaleAnalysis {
                pathname: format!("/{}", rest),
                detected_locale: Some(locale.clone()),
            },
            None => LocaleAnalysis {
                pathname: pathname.to_string(),
                detected_locale: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> I18nLocaleProvider {
        I18nLocaleProvider::new(vec!["en-US".into(), "fr".into()], "en-US")
    }

    #[test]
    fn test_detects_prefix_case_insensitively() {
        let analysis = provider().analyze("/en-us/blog/hello");
        assert_eq!(analysis.pathname, "/blog/hello");
        assert_eq!(analysis.detected_locale.as_deref(), Some("en-US"));
    }

    #[test]
    fn test_locale_root() {
        let analysis = provider().analyze("/fr");
        assert_eq!(analysis.pathname, "/");
        assert_eq!(analysis.detected_locale.as_deref(), Some("fr"));
    }

    #[test]
    fn test_no_locale() {
        let analysis = provider().analyze("/french/page");
        assert_eq!(analysis.pathname, "/french/page");
        assert!(analysis.detected_locale.is_none());
    }
}
