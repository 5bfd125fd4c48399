//! Plugin options.

use crate::error::{Result, WebextError};
use crate::manifest::Manifest;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default pattern for web-accessible scripts compiled by the bundler.
pub const DEFAULT_SCRIPT_FILTER: &str = r"\.(([cem]?js|ts)|(s?[ca]ss))$";

fn default_true() -> bool {
    true
}

/// Options accepted by the web-extension plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebExtensionOptions {
    /// The manifest to generate the extension from.
    #[serde(default)]
    pub manifest: Option<Manifest>,

    /// Content-hashed output names for chunks and assets.
    #[serde(default = "default_true")]
    pub use_hashed_file_name: bool,

    /// Sets `use_dynamic_url` on generated web-accessible resource groups.
    #[serde(default = "default_true")]
    pub use_dynamic_url: bool,

    /// Inject the React refresh preamble into `jsx`/`tsx` modules during dev.
    #[serde(default = "default_true", alias = "useReactHMR")]
    pub use_react_hmr: bool,

    /// Which web-accessible resources are compiled as scripts.
    #[serde(default)]
    pub web_accessible_scripts: ScriptFilterOptions,
}

impl Default for WebExtensionOptions {
    fn default() -> Self {
        Self {
            manifest: None,
            use_hashed_file_name: true,
            use_dynamic_url: true,
            use_react_hmr: true,
            web_accessible_scripts: ScriptFilterOptions::default(),
        }
    }
}

impl WebExtensionOptions {
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest: Some(manifest),
            ..Default::default()
        }
    }

    pub fn with_hashed_file_name(mut self, enabled: bool) -> Self {
        self.use_hashed_file_name = enabled;
        self
    }

    pub fn with_dynamic_url(mut self, enabled: bool) -> Self {
        self.use_dynamic_url = enabled;
        self
    }

    pub fn with_react_hmr(mut self, enabled: bool) -> Self {
        self.use_react_hmr = enabled;
        self
    }

    pub fn with_script_filter(mut self, filter: ScriptFilterOptions) -> Self {
        self.web_accessible_scripts = filter;
        self
    }

    /// The configured manifest, or [`WebextError::MissingManifest`].
    pub fn manifest(&self) -> Result<&Manifest> {
        self.manifest.as_ref().ok_or(WebextError::MissingManifest)
    }

    /// Check everything that can be checked before a build starts.
    pub fn validate(&self) -> Result<()> {
        self.manifest()?.dialect_version()?;
        ScriptFilter::new(&self.web_accessible_scripts)?;
        Ok(())
    }
}

/// Raw include/exclude patterns for web-accessible scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptFilterOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
}

/// Compiled script filter: excluded paths never match, otherwise `include` decides.
#[derive(Debug, Clone)]
pub struct ScriptFilter {
    include: Regex,
    exclude: Option<Regex>,
}

impl ScriptFilter {
    pub fn new(options: &ScriptFilterOptions) -> Result<Self> {
        let include = compile(options.include.as_deref().unwrap_or(DEFAULT_SCRIPT_FILTER))?;
        let exclude = options
            .exclude
            .as_deref()
            .filter(|pattern| !pattern.is_empty())
            .map(compile)
            .transpose()?;
        Ok(Self { include, exclude })
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = path.replace('\\', "/");
        if self.exclude.as_ref().is_some_and(|re| re.is_match(&path)) {
            return false;
        }
        self.include.is_match(&path)
    }
}

impl Default for ScriptFilter {
    fn default() -> Self {
        Self {
            include: Regex::new(DEFAULT_SCRIPT_FILTER).expect("valid default script filter"),
            exclude: None,
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| WebextError::InvalidFilter {
        pattern: pattern.to_string(),
        source,
    })
}

/// How the host is running the bundler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// One-shot production build.
    #[default]
    Build,
    /// Dev server with the dev builder writing loader shims.
    Dev,
    /// Production build re-run on file changes.
    Watch,
}

impl BuildMode {
    pub fn is_dev(self) -> bool {
        matches!(self, BuildMode::Dev)
    }
}
