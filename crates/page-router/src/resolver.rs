//! Request URL normalization against a matched route.

use page_core::{ParsedRequestUrl, LOCALE_QUERY_KEY};
use tracing::debug;

use crate::error::RouteError;
use crate::locale::LocaleProvider;
use crate::route::{strip_trailing_slash, RouteDefinition};

/// Normalizes incoming URLs into canonical page paths.
#[derive(Default)]
pub struct RouteResolver {
    locale_provider: Option<Box<dyn LocaleProvider>>,
}

impl RouteResolver {
    /// Create a resolver without locale support.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable locale detection.
    pub fn with_locale_provider(mut self, provider: impl LocaleProvider + 'static) -> Self {
        self.locale_provider = Some(Box::new(provider));
        self
    }

    /// Resolve `url` against the route it was matched to.
    ///
    /// The result always has a trailing-slash-free pathname and, for dynamic
    /// routes, no unresolved parameter segments.
    pub fn resolve(
        &self,
        route: &RouteDefinition,
        mut url: ParsedRequestUrl,
    ) -> Result<ParsedRequestUrl, RouteError> {
        if url.pathname.is_empty() {
            return Err(RouteError::EmptyPathname);
        }

        let mut incoming_locale = None;
        if url.pathname != route.page() {
            let incoming = std::mem::replace(&mut url.pathname, route.page().to_string());
            let candidate = match &self.locale_provider {
                Some(provider) => {
                    let analysis = provider.analyze(&incoming);
                    incoming_locale = analysis.detected_locale;
                    analysis.pathname
                }
                None => incoming,
            };

            if let Some(matcher) = route.matcher() {
                matcher.normalize_query_keys(&mut url.query);

                // Values already in the query win over values in the path.
                if let Some(matched) = matcher.match_path(&candidate) {
                    for (name, value) in matched {
                        if !url.query.contains_key(&name) {
                            url.query.insert(name, value);
                        }
                    }
                }

                url.pathname = matcher.interpolate(&url.query)?;
            }
        } else if let Some(matcher) = route.matcher() {
            matcher.normalize_query_keys(&mut url.query);
            url.pathname = matcher.interpolate(&url.query)?;
        }

        url.pathname = strip_trailing_slash(&url.pathname).to_string();

        if let Some(provider) = &self.locale_provider {
            let analysis = provider.analyze(&url.pathname);
            if let Some(locale) = analysis.detected_locale.or(incoming_locale) {
                url.pathname = analysis.pathname;
                url.query.insert(LOCALE_QUERY_KEY, locale);
            }
        }

        debug!(page = route.page(), pathname = %url.pathname, "resolved route");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::I18nLocaleProvider;
    use page_core::Query;

    fn url(path: &str, pairs: &[(&str, &str)]) -> ParsedRequestUrl {
        ParsedRequestUrl::new(path, Query::from_pairs(pairs.iter().copied()))
    }

    // === Canonical Path Tests ===

    #[test]
    fn test_dynamic_route_interpolates_query() {
        let route = RouteDefinition::new("/blog/[slug]").unwrap();
        let resolved = RouteResolver::new()
            .resolve(&route, url("/blog/[slug]", &[("slug", "hello")]))
            .unwrap();
        assert_eq!(resolved.pathname, "/blog/hello");
    }

    #[test]
    fn test_incoming_path_replaced_by_canonical_page() {
        let route = RouteDefinition::new("/about").unwrap();
        let resolved = RouteResolver::new()
            .resolve(&route, url("/about-us/", &[]))
            .unwrap();
        assert_eq!(resolved.pathname, "/about");
    }

    #[test]
    fn test_params_recovered_from_incoming_path() {
        let route = RouteDefinition::new("/blog/[slug]").unwrap();
        let resolved = RouteResolver::new()
            .resolve(&route, url("/blog/from-path", &[]))
            .unwrap();
        assert_eq!(resolved.pathname, "/blog/from-path");
        assert_eq!(resolved.query.get_str("slug"), Some("from-path"));
    }

    #[test]
    fn test_prefixed_query_keys_normalized() {
        let route = RouteDefinition::new("/blog/[slug]").unwrap();
        let resolved = RouteResolver::new()
            .resolve(&route, url("/blog/x", &[("nxtPslug", "renamed")]))
            .unwrap();
        assert_eq!(resolved.pathname, "/blog/renamed");
        assert!(!resolved.query.contains_key("nxtPslug"));
    }

    #[test]
    fn test_missing_param_is_error() {
        let route = RouteDefinition::new("/blog/[slug]").unwrap();
        let err = RouteResolver::new()
            .resolve(&route, url("/elsewhere", &[]))
            .unwrap_err();
        assert!(matches!(err, RouteError::MissingParam { .. }));
    }

    #[test]
    fn test_empty_pathname_is_fatal() {
        let route = RouteDefinition::new("/").unwrap();
        let err = RouteResolver::new().resolve(&route, url("", &[])).unwrap_err();
        assert!(matches!(err, RouteError::EmptyPathname));
    }

    // === Trailing Slash Tests ===

    #[test]
    fn test_trailing_slash_equivalence() {
        let resolver = RouteResolver::new();
        for page in ["/", "/about", "/blog/[slug]", "/docs/[...path]"] {
            let route = RouteDefinition::new(page).unwrap();
            let query = [("slug", "s"), ("path", "a")];
            let with = resolver.resolve(&route, url(&format!("{}/", page), &query));
            let without = resolver.resolve(&route, url(page, &query));
            assert_eq!(with.unwrap().pathname, without.unwrap().pathname);
        }
    }

    #[test]
    fn test_root_keeps_slash() {
        let route = RouteDefinition::new("/").unwrap();
        let resolved = RouteResolver::new().resolve(&route, url("/", &[])).unwrap();
        assert_eq!(resolved.pathname, "/");
    }

    // === Locale Tests ===

    #[test]
    fn test_locale_prefix_stripped_and_recorded() {
        let route = RouteDefinition::new("/fr/about").unwrap();
        let resolver = RouteResolver::new()
            .with_locale_provider(I18nLocaleProvider::new(vec!["en".into(), "fr".into()], "en"));

        let resolved = resolver.resolve(&route, url("/fr/about/", &[])).unwrap();

        assert_eq!(resolved.pathname, "/about");
        assert_eq!(resolved.query.get_str(LOCALE_QUERY_KEY), Some("fr"));
    }

    #[test]
    fn test_locale_prefix_ignored_when_matching_params() {
        let route = RouteDefinition::new("/blog/[slug]").unwrap();
        let resolver = RouteResolver::new()
            .with_locale_provider(I18nLocaleProvider::new(vec!["fr".into()], "fr"));

        let resolved = resolver.resolve(&route, url("/fr/blog/bonjour", &[])).unwrap();

        assert_eq!(resolved.pathname, "/blog/bonjour");
        assert_eq!(resolved.query.get_str("slug"), Some("bonjour"));
        assert_eq!(resolved.query.get_str(LOCALE_QUERY_KEY), Some("fr"));
    }

    #[test]
    fn test_locale_kept_when_static_page_replaces_path() {
        let route = RouteDefinition::new("/about").unwrap();
        let resolver = RouteResolver::new()
            .with_locale_provider(I18nLocaleProvider::new(vec!["en".into(), "fr".into()], "en"));

        let resolved = resolver.resolve(&route, url("/FR/about", &[])).unwrap();

        assert_eq!(resolved.pathname, "/about");
        assert_eq!(resolved.query.get_str(LOCALE_QUERY_KEY), Some("fr"));
    }
}
