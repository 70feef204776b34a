//! Prerender manifest produced at build time.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CacheResult;

/// Version marking an unversioned (development) manifest.
pub const UNVERSIONED: i64 = -1;

/// Preview mode id used when no manifest is available.
pub const DEVELOPMENT_PREVIEW_MODE_ID: &str = "development-id";

/// How long a prerendered page stays fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Revalidate {
    /// Never stale.
    #[default]
    Never,
    /// Stale once older than the duration.
    After(Duration),
}

/// `initialRevalidateSeconds`: a number of seconds or `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RevalidateSetting {
    Seconds(u64),
    Flag(bool),
}

impl Default for RevalidateSetting {
    fn default() -> Self {
        Self::Flag(false)
    }
}

impl From<RevalidateSetting> for Revalidate {
    fn from(setting: RevalidateSetting) -> Self {
        match setting {
            RevalidateSetting::Seconds(secs) => Self::After(Duration::from_secs(secs)),
            RevalidateSetting::Flag(_) => Self::Never,
        }
    }
}

/// A statically known prerendered route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerenderRoute {
    #[serde(default)]
    pub initial_revalidate_seconds: RevalidateSetting,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_route: Option<String>,
}

/// `fallback` of a dynamic route: a fallback page path or a boolean.
/// `null` (blocking) deserializes to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FallbackSetting {
    Page(String),
    Enabled(bool),
}

/// A dynamic route with on-demand generated paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicPrerenderRoute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_regex: Option<String>,
    #[serde(default)]
    pub fallback: Option<FallbackSetting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_route: Option<String>,
}

/// Preview mode identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewProps {
    pub preview_mode_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preview_mode_signing_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preview_mode_encryption_key: String,
}

/// Build-time catalog of prerendered routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerenderManifest {
    pub version: i64,
    #[serde(default)]
    pub routes: BTreeMap<String, PrerenderRoute>,
    #[serde(default)]
    pub dynamic_routes: BTreeMap<String, DynamicPrerenderRoute>,
    #[serde(default)]
    pub not_found_routes: Vec<String>,
    pub preview: PreviewProps,
}

impl PrerenderManifest {
    /// Permissive manifest used when the build artifact is absent.
    pub fn development() -> Self {
        Self {
            version: UNVERSIONED,
            routes: BTreeMap::new(),
            dynamic_routes: BTreeMap::new(),
            not_found_routes: Vec::new(),
            preview: PreviewProps {
                preview_mode_id: DEVELOPMENT_PREVIEW_MODE_ID.to_string(),
                ..Default::default()
            },
        }
    }

    /// Parse the JSON build artifact.
    pub fn from_json(json: &str) -> CacheResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Whether this is the unversioned development marker.
    pub fn is_unversioned(&self) -> bool {
        self.version == UNVERSIONED
    }

    /// Revalidation policy for a concrete path.
    pub fn revalidate_for(&self, path: &str) -> Revalidate {
        self.routes
            .get(path)
            .map(|r| r.initial_revalidate_seconds.into())
            .unwrap_or_default()
    }

    /// Whether rendered output for `path` belongs in the cache.
    ///
    /// True for statically listed paths and for paths of a dynamic route
    /// (`route_page`) that participates in prerendering.
    pub fn is_prerendered(&self, path: &str, route_page: Option<&str>) -> bool {
        self.routes.contains_key(path)
            || route_page.is_some_and(|page| self.dynamic_routes.contains_key(page))
    }

    /// Whether `path` was prerendered as not found.
    pub fn is_not_found(&self, path: &str) -> bool {
        self.not_found_routes.iter().any(|p| p == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "version": 4,
        "routes": {
            "/": { "initialRevalidateSeconds": false, "srcRoute": null, "dataRoute": "/index.json" },
            "/blog/hello": { "initialRevalidateSeconds": 60, "srcRoute": "/blog/[slug]", "dataRoute": null }
        },
        "dynamicRoutes": {
            "/blog/[slug]": { "routeRegex": "^/blog/([^/]+?)(?:/)?$", "fallback": null, "dataRoute": null },
            "/docs/[...path]": { "fallback": "/docs/[...path].html" },
            "/shop/[id]": { "fallback": false }
        },
        "notFoundRoutes": ["/gone"],
        "preview": { "previewModeId": "abc", "previewModeSigningKey": "k1", "previewModeEncryptionKey": "k2" }
    }"#;

    #[test]
    fn test_development_manifest() {
        let manifest = PrerenderManifest::development();
        assert_eq!(manifest.version, -1);
        assert!(manifest.is_unversioned());
        assert!(manifest.routes.is_empty());
        assert!(manifest.dynamic_routes.is_empty());
        assert!(manifest.not_found_routes.is_empty());
        assert_eq!(manifest.preview.preview_mode_id, "development-id");
    }

    #[test]
    fn test_parse_build_manifest() {
        let manifest = PrerenderManifest::from_json(MANIFEST).unwrap();
        assert_eq!(manifest.version, 4);
        assert!(!manifest.is_unversioned());
        assert_eq!(manifest.preview.preview_mode_id, "abc");
        assert_eq!(manifest.dynamic_routes["/blog/[slug]"].fallback, None);
        assert_eq!(
            manifest.dynamic_routes["/docs/[...path]"].fallback,
            Some(FallbackSetting::Page("/docs/[...path].html".into()))
        );
        assert_eq!(
            manifest.dynamic_routes["/shop/[id]"].fallback,
            Some(FallbackSetting::Enabled(false))
        );
    }

    #[test]
    fn test_revalidate_for() {
        let manifest = PrerenderManifest::from_json(MANIFEST).unwrap();
        assert_eq!(manifest.revalidate_for("/"), Revalidate::Never);
        assert_eq!(
            manifest.revalidate_for("/blog/hello"),
            Revalidate::After(Duration::from_secs(60))
        );
        assert_eq!(manifest.revalidate_for("/unknown"), Revalidate::Never);
    }

    #[test]
    fn test_prerendered_and_not_found() {
        let manifest = PrerenderManifest::from_json(MANIFEST).unwrap();
        assert!(manifest.is_prerendered("/", None));
        assert!(manifest.is_prerendered("/blog/other", Some("/blog/[slug]")));
        assert!(!manifest.is_prerendered("/about", Some("/about")));
        assert!(manifest.is_not_found("/gone"));
    }

    #[test]
    fn test_invalid_manifest() {
        assert!(PrerenderManifest::from_json("{\"version\": 1}").is_err());
    }
}
