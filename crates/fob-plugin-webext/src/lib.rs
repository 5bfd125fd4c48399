//! Browser-extension builds for the rolldown bundler.
//!
//! This crate turns an extension manifest into bundler entry points, then
//! rewrites the manifest against the finished bundle so every path it declares
//! names a file that really exists in the output directory.
//!
//! ## Build flow
//!
//! ```text
//! manifest ─► ManifestParser::parse_input ─► entry scripts + emitted files
//!                                                   │
//!                                            rolldown + WebExtPlugin
//!                                                   │
//! bundle ──► ManifestParser::parse_output ─► loader shims, rewritten manifest
//! ```
//!
//! Manifest V2 and V3 differ only in where a few declarations live; each
//! dialect is handled by its own parser behind the [`parser::Dialect`] trait.
//!
//! ## Dev builds
//!
//! [`dev::DevBuilder`] writes an out dir whose scripts are loader shims that
//! import from the running dev server, so the browser can load the extension
//! unpacked while modules hot-reload.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fob_plugin_webext::{BuildMode, Manifest, ResolvedConfig, WebExtension, WebExtensionOptions};
//!
//! # async fn example() -> fob_plugin_webext::Result<()> {
//! let manifest = Manifest::from_json(&std::fs::read_to_string("manifest.json").unwrap())?;
//! let extension = WebExtension::new(
//!     WebExtensionOptions::new(manifest),
//!     ResolvedConfig::new("."),
//!     BuildMode::Build,
//! )?;
//! let report = extension.build().await?;
//! println!("{} files written to {}", report.files.len(), report.out_dir.display());
//! # Ok(())
//! # }
//! ```

pub mod assets;
pub mod bundle;
pub mod config;
pub mod dev;
pub mod error;
pub mod files;
pub mod host;
pub mod html;
pub mod loader;
pub mod manifest;
pub mod options;
pub mod output;
pub mod parser;
pub mod plugin;
pub mod store;
pub mod transform;
pub mod walker;

pub use bundle::{AssetInfo, ChunkInfo, OutputBundle};
pub use config::{HostInput, ResolvedConfig, append_input_scripts, update_config};
pub use dev::{DevBuilder, DevServer, WatchTarget};
pub use error::{Result, WebextError};
pub use host::{BuildReport, WebExtension};
pub use manifest::{Manifest, ManifestVersion};
pub use options::{BuildMode, ScriptFilterOptions, WebExtensionOptions};
pub use output::WrittenFile;
pub use parser::{EmitFile, InputScript, MANIFEST_FILE, ManifestParser, ParseResult};
pub use plugin::{CLIENT_MODULE_ID, DEV_CLIENT_PATH, PluginSettings, WebExtPlugin};
pub use store::ModuleStore;
