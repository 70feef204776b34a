//! Named-capture matcher and path interpolation for dynamic routes.

use std::collections::BTreeMap;

use page_core::{Query, QueryValue};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;

use crate::error::RouteError;
use crate::route::Segment;

/// Prefix of capture group names and of normalized query keys.
pub const ROUTE_KEY_PREFIX: &str = "nxtP";

/// Characters left as-is by `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A capture group in the compiled matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGroup {
    /// Parameter name as written in the page path.
    pub name: String,
    /// Capture group name in the regex.
    pub key: String,
    /// `[...name]` or `[[...name]]`.
    pub repeat: bool,
    /// `[[...name]]`.
    pub optional: bool,
}

/// Compiled matcher for a dynamic page path.
#[derive(Debug, Clone)]
pub struct RouteMatcher {
    page: String,
    regex: Regex,
    segments: Vec<Segment>,
    groups: Vec<RouteGroup>,
}

impl RouteMatcher {
    /// Compile the named-capture regex for a page.
    pub(crate) fn compile(page: &str, segments: &[Segment]) -> Result<Self, RouteError> {
        let mut pattern = String::from("^");
        let mut groups = Vec::new();

        for segment in segments {
            match segment {
                Segment::Static(text) => {
                    pattern.push('/');
                    pattern.push_str(&regex::escape(text));
                }
                Segment::Dynamic {
                    name,
                    repeat,
                    optional,
                } => {
                    let key = route_key(name, &groups);
                    match (*repeat, *optional) {
                        (true, true) => pattern.push_str(&format!("(?:/(?P<{}>.+?))?", key)),
                        (true, false) => pattern.push_str(&format!("/(?P<{}>.+?)", key)),
                        _ => pattern.push_str(&format!("/(?P<{}>[^/]+?)", key)),
                    }
                    groups.push(RouteGroup {
                        name: name.clone(),
                        key,
                        repeat: *repeat,
                        optional: *optional,
                    });
                }
            }
        }

        pattern.push_str("(?:/)?$");

        let regex = Regex::new(&pattern).map_err(|e| RouteError::invalid(page, e.to_string()))?;

        Ok(Self {
            page: page.to_string(),
            regex,
            segments: segments.to_vec(),
            groups,
        })
    }

    /// The regex source.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Capture groups in path order.
    pub fn groups(&self) -> &[RouteGroup] {
        &self.groups
    }

    /// Match a concrete path, returning decoded parameters.
    ///
    /// Catch-all parameters come back as lists of segments.
    pub fn match_path(&self, path: &str) -> Option<BTreeMap<String, QueryValue>> {
        let captures = self.regex.captures(path)?;
        let mut params = BTreeMap::new();

        for group in &self.groups {
            let Some(raw) = captures.name(&group.key) else {
                continue;
            };
            let value = if group.repeat {
                QueryValue::Multi(raw.as_str().split('/').map(decode).collect())
            } else {
                QueryValue::Single(decode(raw.as_str()))
            };
            params.insert(group.name.clone(), value);
        }

        Some(params)
    }

    /// Substitute parameter values into the page path.
    ///
    /// Values are percent-encoded like `encodeURIComponent`; catch-all values
    /// are encoded per segment and joined with `/`. Missing optional
    /// catch-alls drop out of the path; any other missing value is an error.
    pub fn interpolate(&self, params: &Query) -> Result<String, RouteError> {
        let mut path = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Static(text) => {
                    path.push('/');
                    path.push_str(text);
                }
                Segment::Dynamic {
                    name,
                    repeat,
                    optional,
                } => {
                    let values: Vec<&str> = params
                        .get(name)
                        .map(|v| {
                            if *repeat {
                                v.values()
                            } else {
                                v.first().into_iter().collect()
                            }
                        })
                        .unwrap_or_default()
                        .into_iter()
                        .filter(|v| !v.is_empty())
                        .collect();

                    if values.is_empty() {
                        if *optional {
                            continue;
                        }
                        return Err(RouteError::MissingParam {
                            page: self.page.clone(),
                            param: name.clone(),
                        });
                    }

                    let encoded: Vec<String> = values.iter().map(|v| encode(v)).collect();
                    path.push('/');
                    path.push_str(&encoded.join("/"));
                }
            }
        }

        if path.is_empty() {
            path.push('/');
        }
        Ok(path)
    }

    /// Rename `nxtP<name>` query keys to `<name>` for this route's parameters.
    pub fn normalize_query_keys(&self, query: &mut Query) {
        for key in query.keys() {
            let Some(name) = key.strip_prefix(ROUTE_KEY_PREFIX) else {
                continue;
            };
            if self.groups.iter().any(|g| g.name == name) {
                let name = name.to_string();
                query.rename(&key, name);
            }
        }
    }
}

/// Percent-encode a single path component.
pub fn encode(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

fn decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

// Regex group names only allow word characters; fall back to a positional
// key when sanitizing leaves nothing or collides.
fn route_key(name: &str, existing: &[RouteGroup]) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    let candidate = format!("{}{}", ROUTE_KEY_PREFIX, cleaned);

    if cleaned.is_empty() || existing.iter().any(|g| g.key == candidate) {
        format!("{}_{}", ROUTE_KEY_PREFIX, existing.len())
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::RouteDefinition;
    use proptest::prelude::*;

    fn matcher(page: &str) -> RouteMatcher {
        RouteDefinition::new(page).unwrap().matcher().unwrap().clone()
    }

    // === Compile Tests ===

    #[test]
    fn test_named_regex() {
        assert_eq!(
            matcher("/blog/[slug]").pattern(),
            "^/blog/(?P<nxtPslug>[^/]+?)(?:/)?$"
        );
    }

    #[test]
    fn test_sanitized_group_keys() {
        let m = matcher("/[post-id]/[post_id]");
        assert_eq!(m.groups()[0].key, "nxtPpostid");
        assert_eq!(m.groups()[1].key, "nxtPpost_id");

        let m = matcher("/[a-b]/[ab]");
        assert_eq!(m.groups()[1].key, "nxtP_1");
    }

    // === Match Tests ===

    #[test]
    fn test_match_single_and_catch_all() {
        let m = matcher("/docs/[version]/[...path]");
        let params = m.match_path("/docs/v2/guide/setup/").unwrap();
        assert_eq!(params["version"], QueryValue::from("v2"));
        assert_eq!(
            params["path"],
            QueryValue::Multi(vec!["guide".into(), "setup".into()])
        );
        assert!(m.match_path("/docs/v2").is_none());
    }

    #[test]
    fn test_optional_catch_all_matches_bare_path() {
        let m = matcher("/shop/[[...filters]]");
        assert!(m.match_path("/shop").unwrap().is_empty());
        assert_eq!(
            m.match_path("/shop/red").unwrap()["filters"],
            QueryValue::Multi(vec!["red".into()])
        );
    }

    // === Interpolation Tests ===

    #[test]
    fn test_interpolate_encodes_values() {
        let m = matcher("/blog/[slug]");
        let query = Query::from_pairs([("slug", "a b/c")]);
        assert_eq!(m.interpolate(&query).unwrap(), "/blog/a%20b%2Fc");
    }

    #[test]
    fn test_interpolate_catch_all_and_optional() {
        let m = matcher("/shop/[[...filters]]");
        assert_eq!(m.interpolate(&Query::new()).unwrap(), "/shop");

        let mut query = Query::new();
        query.insert("filters", vec!["red".to_string(), "xl".to_string()]);
        assert_eq!(m.interpolate(&query).unwrap(), "/shop/red/xl");
    }

    #[test]
    fn test_interpolate_missing_param() {
        let err = matcher("/blog/[slug]").interpolate(&Query::new()).unwrap_err();
        assert!(matches!(err, RouteError::MissingParam { ref param, .. } if param == "slug"));
    }

    #[test]
    fn test_normalize_query_keys() {
        let m = matcher("/blog/[slug]");
        let mut query = Query::from_pairs([("nxtPslug", "hello"), ("nxtPother", "x")]);
        m.normalize_query_keys(&mut query);
        assert_eq!(query.get_str("slug"), Some("hello"));
        assert_eq!(query.get_str("nxtPother"), Some("x"));
    }

    // === Round-trip Property ===

    proptest! {
        #[test]
        fn prop_interpolate_then_match_recovers_params(
            single in "\\PC{1,12}",
            rest in proptest::collection::vec("\\PC{1,8}", 1..4),
        ) {
            let m = matcher("/p/[id]/files/[...rest]");
            let mut query = Query::new();
            query.insert("id", single.clone());
            query.insert("rest", rest.clone());

            let path = m.interpolate(&query).unwrap();
            let params = m.match_path(&path).unwrap();

            prop_assert_eq!(&params["id"], &QueryValue::Single(single));
            prop_assert_eq!(&params["rest"], &QueryValue::Multi(rest));
        }
    }
}
