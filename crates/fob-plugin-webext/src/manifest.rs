//! Typed view of an extension manifest.
//!
//! Only the fields the build pipeline reads or rewrites are typed. Everything
//! else is carried through untouched in the flattened `extra` maps.

use crate::error::{Result, WebextError};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Manifest schema major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestVersion {
    V2,
    V3,
}

impl ManifestVersion {
    pub fn as_u32(self) -> u32 {
        match self {
            ManifestVersion::V2 => 2,
            ManifestVersion::V3 => 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub manifest_version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<Background>,

    /// V3 toolbar button.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,

    /// V2 toolbar button.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_action: Option<Action>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options_ui: Option<OptionsUi>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devtools_page: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_url_overrides: Option<UrlOverrides>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_scripts: Option<Vec<ContentScript>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_accessible_resources: Option<Vec<WebAccessibleResource>>,

    /// A string in V2, an object with `extension_pages` in V3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_security_policy: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Background {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_worker: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_popup: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionsUi {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newtab: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarks: Option<String>,
}

impl UrlOverrides {
    pub fn pages(&self) -> impl Iterator<Item = &String> {
        [&self.newtab, &self.history, &self.bookmarks]
            .into_iter()
            .flatten()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentScript {
    #[serde(default)]
    pub matches: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentScript {
    /// Declared JS files followed by declared CSS files.
    pub fn files(&self) -> impl Iterator<Item = &String> {
        self.js.iter().flatten().chain(self.css.iter().flatten())
    }
}

/// One allowlist entry: a bare path (V2) or a scoped group (V3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WebAccessibleResource {
    Path(String),
    Group(ResourceGroup),
}

impl WebAccessibleResource {
    pub fn as_path(&self) -> Option<&str> {
        match self {
            WebAccessibleResource::Path(path) => Some(path),
            WebAccessibleResource::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&ResourceGroup> {
        match self {
            WebAccessibleResource::Group(group) => Some(group),
            WebAccessibleResource::Path(_) => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut ResourceGroup> {
        match self {
            WebAccessibleResource::Group(group) => Some(group),
            WebAccessibleResource::Path(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<String>>,

    #[serde(default)]
    pub resources: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_dynamic_url: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    /// Parse a manifest from JSON text.
    /// Parse manifest text; shape errors become [`WebextError::InvalidManifest`].
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| WebextError::InvalidManifest(e.to_string()))
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| WebextError::InvalidManifest(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The dialect this manifest is written in.
    pub fn dialect_version(&self) -> Result<ManifestVersion> {
        match self.manifest_version {
            2 => Ok(ManifestVersion::V2),
            3 => Ok(ManifestVersion::V3),
            other => Err(WebextError::UnsupportedManifestVersion(other.to_string())),
        }
    }

    /// Replace a `version` of `DATE` with `YY.M.D` for `today`.
    pub fn apply_date_version(&mut self, today: NaiveDate) {
        if self.version.as_deref() == Some("DATE") {
            self.version = Some(date_version(today));
        }
    }

    /// Flat allowlist paths (V2 shape).
    pub fn war_paths(&self) -> impl Iterator<Item = &str> {
        self.web_accessible_resources
            .iter()
            .flatten()
            .filter_map(WebAccessibleResource::as_path)
    }

    /// Allowlist groups (V3 shape).
    pub fn war_groups(&self) -> impl Iterator<Item = &ResourceGroup> {
        self.web_accessible_resources
            .iter()
            .flatten()
            .filter_map(WebAccessibleResource::as_group)
    }
}

/// Two-digit year, then month and day without padding.
pub fn date_version(date: NaiveDate) -> String {
    format!("{}.{}.{}", date.format("%y"), date.month(), date.day())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let value = json!({
            "manifest_version": 3,
            "name": "demo",
            "version": "1.0.0",
            "permissions": ["storage"],
            "icons": { "16": "icons/16.png" },
            "background": { "service_worker": "src/bg.ts", "persistent": false }
        });
        let manifest = Manifest::from_value(value).unwrap();
        let back: Value = serde_json::from_str(&manifest.to_json_pretty().unwrap()).unwrap();
        assert_eq!(back["permissions"], json!(["storage"]));
        assert_eq!(back["icons"]["16"], "icons/16.png");
        assert_eq!(back["background"]["persistent"], false);
        assert!(back.get("content_scripts").is_none());
    }

    #[test]
    fn test_dialect_version() {
        let mut manifest = Manifest {
            manifest_version: 2,
            ..Default::default()
        };
        assert_eq!(manifest.dialect_version().unwrap(), ManifestVersion::V2);
        manifest.manifest_version = 4;
        let err = manifest.dialect_version().unwrap_err();
        assert!(matches!(err, WebextError::UnsupportedManifestVersion(v) if v == "4"));
    }

    #[test]
    fn test_malformed_manifest_is_invalid() {
        let err = Manifest::from_value(json!(["not", "an", "object"])).unwrap_err();
        assert!(matches!(err, WebextError::InvalidManifest(_)));

        let err = Manifest::from_json(r#"{ "manifest_version": "three" }"#).unwrap_err();
        assert!(err.to_string().starts_with("Invalid manifest: "));
    }

    #[test]
    fn test_war_shapes() {
        let v2 = Manifest::from_value(json!({
            "manifest_version": 2,
            "web_accessible_resources": ["src/inject.ts", "*.png"]
        }))
        .unwrap();
        assert_eq!(v2.war_paths().collect::<Vec<_>>(), vec!["src/inject.ts", "*.png"]);

        let v3 = Manifest::from_value(json!({
            "manifest_version": 3,
            "web_accessible_resources": [
                { "matches": ["<all_urls>"], "resources": ["src/page.html"] }
            ]
        }))
        .unwrap();
        let group = v3.war_groups().next().unwrap();
        assert_eq!(group.resources, vec!["src/page.html"]);
        assert_eq!(group.use_dynamic_url, None);
    }

    #[test]
    fn test_date_version() {
        let mut manifest = Manifest {
            version: Some("DATE".into()),
            ..Default::default()
        };
        manifest.apply_date_version(NaiveDate::from_ymd_opt(2026, 3, 7).unwrap());
        assert_eq!(manifest.version.as_deref(), Some("26.3.7"));

        assert_eq!(date_version(NaiveDate::from_ymd_opt(2005, 12, 31).unwrap()), "05.12.31");
    }

    #[test]
    fn test_content_script_files_order() {
        let script = ContentScript {
            matches: vec!["*://*/*".into()],
            js: Some(vec!["a.ts".into(), "b.ts".into()]),
            css: Some(vec!["a.css".into()]),
            ..Default::default()
        };
        let files: Vec<_> = script.files().cloned().collect();
        assert_eq!(files, vec!["a.ts", "b.ts", "a.css"]);
    }
}
