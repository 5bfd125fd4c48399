//! Host build configuration.
//!
//! [`ResolvedConfig`] is the slice of the host's configuration the engine
//! reads: where the project lives, where output goes, and how the dev server
//! is reachable. [`update_config`] fills in the defaults an extension build
//! needs before the host resolves the rest.

use crate::error::{Result, WebextError};
use crate::manifest::ManifestVersion;
use crate::options::WebExtensionOptions;
use crate::parser::InputScript;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default output directory, relative to the project root.
pub const DEFAULT_OUT_DIR: &str = ".extension";

/// Output name pattern for hashed script chunks.
pub const HASHED_CHUNK_PATTERN: &str = "assets/js/[name].[hash:6].js";

/// Output name pattern for hashed assets.
pub const HASHED_ASSET_PATTERN: &str = "assets/[ext]/[name].[hash:6].[ext]";

#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    pub root: PathBuf,
    pub public_dir: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub sourcemap: bool,
    pub watch: bool,
    pub minify: Option<bool>,
    pub empty_out_dir: Option<bool>,
    /// Browser targets such as `chrome91`.
    pub targets: Option<Vec<String>>,
    pub hmr: Option<HmrSetting>,
    pub file_names: FileNamePatterns,
    pub input: HostInput,
}

impl ResolvedConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            public_dir: Some(root.join("public")),
            root,
            ..Default::default()
        }
    }

    /// Output directory, defaulting to `<root>/.extension`.
    pub fn out_dir(&self) -> PathBuf {
        self.out_dir
            .clone()
            .unwrap_or_else(|| self.root.join(DEFAULT_OUT_DIR))
    }

    pub fn minify(&self) -> bool {
        self.minify.unwrap_or(true)
    }

    pub fn empty_out_dir(&self) -> bool {
        self.empty_out_dir.unwrap_or(true)
    }

    /// Origin of the dev server's HMR endpoint, `http://<host>:<port>`.
    pub fn hmr_origin(&self, port: u16) -> Result<String> {
        match &self.hmr {
            Some(HmrSetting::Options(hmr)) => {
                let host = hmr.host.as_deref().unwrap_or("localhost");
                Ok(format!("http://{host}:{port}"))
            }
            Some(HmrSetting::Flag(flag)) => Err(WebextError::HmrMisconfigured(format!(
                "hmr is set to `{flag}`, expected an object with host and protocol"
            ))),
            None => Err(WebextError::HmrMisconfigured(
                "hmr settings are missing".to_string(),
            )),
        }
    }
}

/// Hot-reload transport: a bare switch or explicit settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HmrSetting {
    Flag(bool),
    Options(HmrOptions),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmrOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileNamePatterns {
    pub entry: Option<String>,
    pub chunk: Option<String>,
    pub asset: Option<String>,
}

/// Entry points the host already had before the plugin adds its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostInput {
    #[default]
    None,
    Single(String),
    List(Vec<String>),
    Map(IndexMap<String, String>),
}

/// Fill in the build defaults an extension needs.
///
/// Values the user already set are never overwritten, except the HMR
/// transport which is always pinned to `ws` on `localhost`.
pub fn update_config(config: &mut ResolvedConfig, options: &WebExtensionOptions) -> Result<()> {
    let version = options.manifest()?.dialect_version()?;

    if config.targets.is_none() {
        config.targets = Some(match version {
            ManifestVersion::V2 => vec!["chrome64".into(), "firefox89".into()],
            ManifestVersion::V3 => vec!["chrome91".into()],
        });
    }

    if config.out_dir.is_none() {
        config.out_dir = Some(config.root.join(DEFAULT_OUT_DIR));
    }
    config.minify.get_or_insert(true);
    config.empty_out_dir.get_or_insert(true);

    let mut hmr = match config.hmr.take() {
        Some(HmrSetting::Options(hmr)) => hmr,
        Some(HmrSetting::Flag(_)) | None => HmrOptions::default(),
    };
    hmr.protocol = Some("ws".to_string());
    hmr.host = Some("localhost".to_string());
    config.hmr = Some(HmrSetting::Options(hmr));

    if options.use_hashed_file_name {
        let names = &mut config.file_names;
        names.entry.get_or_insert_with(|| HASHED_CHUNK_PATTERN.to_string());
        names.chunk.get_or_insert_with(|| HASHED_CHUNK_PATTERN.to_string());
        names.asset.get_or_insert_with(|| HASHED_ASSET_PATTERN.to_string());
    }

    Ok(())
}

/// Merge the parser's entry points into the host input map.
///
/// A string or list input becomes a map keyed by the entry itself. Later
/// writes to the same output name win.
pub fn append_input_scripts(
    input_scripts: &[InputScript],
    input: &HostInput,
) -> IndexMap<String, String> {
    let mut merged: IndexMap<String, String> = match input {
        HostInput::None => IndexMap::new(),
        HostInput::Single(entry) if entry.trim().is_empty() => IndexMap::new(),
        HostInput::Single(entry) => IndexMap::from([(entry.clone(), entry.clone())]),
        HostInput::List(entries) => entries.iter().map(|e| (e.clone(), e.clone())).collect(),
        HostInput::Map(map) => map.clone(),
    };

    for script in input_scripts {
        merged.insert(
            script.output_file.clone(),
            script.input_file.to_string_lossy().into_owned(),
        );
    }

    merged
}
