//! `webext.config.json` handling with multi-source loading.
//!
//! Priority: CLI flags > `FOB_WEBEXT_*` environment > config file > defaults.
//! Nested keys use a double underscore in the environment, so
//! `FOB_WEBEXT_SERVER__PORT=3000` sets `server.port`.

mod loading;

pub use loading::{CONFIG_FILES, ConfigOverrides};

use crate::error::{ConfigError, Result};
use fob_plugin_webext::config::{HmrOptions, HmrSetting};
use fob_plugin_webext::{Manifest, ResolvedConfig, ScriptFilterOptions, WebExtensionOptions};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

fn default_true() -> bool {
    true
}

fn default_manifest() -> ManifestSource {
    ManifestSource::Path(PathBuf::from("manifest.json"))
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_port() -> u16 {
    5173
}

/// Project configuration, loaded from `webext.config.json` or `.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WebextConfig {
    /// Path to manifest.json, or the manifest object itself
    #[serde(default = "default_manifest")]
    pub manifest: ManifestSource,

    /// Static files copied verbatim into the out dir
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,

    /// Output directory (defaults to `.extension`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,

    /// Content-hashed chunk and asset names
    #[serde(default = "default_true")]
    pub use_hashed_file_name: bool,

    /// Set `use_dynamic_url` on generated web-accessible resource groups
    #[serde(default = "default_true")]
    pub use_dynamic_url: bool,

    /// Inject the React refresh preamble during dev
    #[serde(default = "default_true")]
    pub use_react_hmr: bool,

    /// Which web-accessible resources are compiled as scripts
    #[serde(default)]
    pub web_accessible_scripts: ScriptFilterConfig,

    #[serde(default)]
    pub sourcemap: bool,

    #[serde(default = "default_true")]
    pub minify: bool,

    /// Clear the out dir before writing
    #[serde(default = "default_true")]
    pub empty_out_dir: bool,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Where the manifest comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ManifestSource {
    Path(PathBuf),
    Inline(Value),
}

/// Include/exclude regexes for web-accessible scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ScriptFilterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Dev server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for WebextConfig {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            public_dir: default_public_dir(),
            out_dir: None,
            use_hashed_file_name: true,
            use_dynamic_url: true,
            use_react_hmr: true,
            web_accessible_scripts: ScriptFilterConfig::default(),
            sourcemap: false,
            minify: true,
            empty_out_dir: true,
            server: ServerConfig::default(),
        }
    }
}

/// Plugin options plus host configuration for one project.
#[derive(Debug, Clone)]
pub struct ResolvedProject {
    pub options: WebExtensionOptions,
    pub config: ResolvedConfig,
    pub port: u16,
    /// Manifest file on disk; `None` when the manifest is inline.
    pub manifest_path: Option<PathBuf>,
}

impl WebextConfig {
    /// JSON schema for `webext.config.json`.
    pub fn json_schema() -> Value {
        serde_json::to_value(schemars::schema_for!(WebextConfig)).unwrap_or(Value::Null)
    }

    /// Read the manifest this config points at.
    pub fn load_manifest(&self, root: &Path) -> Result<Manifest> {
        match &self.manifest {
            ManifestSource::Inline(value) => {
                Manifest::from_value(value.clone()).map_err(|e| {
                    ConfigError::InvalidManifest {
                        path: PathBuf::from("webext.config.json#manifest"),
                        error: e.to_string(),
                    }
                    .into()
                })
            }
            ManifestSource::Path(path) => {
                let path = root.join(path);
                let text = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => ConfigError::ManifestNotFound(path.clone()),
                    _ => ConfigError::Io(e),
                })?;
                Manifest::from_json(&text).map_err(|e| {
                    ConfigError::InvalidManifest {
                        path,
                        error: e.to_string(),
                    }
                    .into()
                })
            }
        }
    }

    /// Resolve everything relative to `root`.
    pub fn resolve(&self, root: &Path) -> Result<ResolvedProject> {
        let manifest = self.load_manifest(root)?;
        let options = WebExtensionOptions {
            manifest: Some(manifest),
            use_hashed_file_name: self.use_hashed_file_name,
            use_dynamic_url: self.use_dynamic_url,
            use_react_hmr: self.use_react_hmr,
            web_accessible_scripts: ScriptFilterOptions {
                include: self.web_accessible_scripts.include.clone(),
                exclude: self.web_accessible_scripts.exclude.clone(),
            },
        };

        let mut config = ResolvedConfig::new(root);
        config.public_dir = Some(root.join(&self.public_dir));
        config.out_dir = self.out_dir.as_ref().map(|dir| root.join(dir));
        config.sourcemap = self.sourcemap;
        config.minify = Some(self.minify);
        config.empty_out_dir = Some(self.empty_out_dir);
        config.hmr = Some(HmrSetting::Options(HmrOptions {
            port: Some(self.server.port),
            ..Default::default()
        }));

        let manifest_path = match &self.manifest {
            ManifestSource::Path(path) => Some(root.join(path)),
            ManifestSource::Inline(_) => None,
        };

        Ok(ResolvedProject {
            options,
            config,
            port: self.server.port,
            manifest_path,
        })
    }
}
