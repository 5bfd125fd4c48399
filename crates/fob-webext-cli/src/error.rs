//! Error types for the fob-webext CLI.
//!
//! `CliError` is what every command returns. Domain errors (`ConfigError`,
//! `BuildError`) carry a `Hint:` line telling the user what to do next, and
//! convert into `CliError` through `#[from]`. At the `main` boundary errors are
//! turned into `miette` reports.
//!
//! # Example
//!
//! ```rust,no_run
//! use fob_webext_cli::error::{Result, ResultExt};
//! use std::path::Path;
//!
//! fn read_manifest(path: &Path) -> Result<String> {
//!     std::fs::read_to_string(path)
//!         .with_path(path)
//!         .with_hint("Point `manifest` in webext.config.json at your manifest.json")
//! }
//! ```

mod report;

pub use report::cli_error_to_miette;

use fob_plugin_webext::WebextError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Development server errors
    #[error("Server error: {0}")]
    Server(String),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Any error with a hint appended by [`ResultExt::with_hint`].
    #[error("{0}")]
    Custom(String),
}

/// Errors while loading `webext.config.json` and the manifest it names.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}\n\nHint: Create a webext.config.json file or pass --config <path>", .0.display())]
    NotFound(PathBuf),

    #[error("Manifest not found: {}\n\nHint: Set `manifest` in webext.config.json or pass --manifest <path>", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("Invalid manifest {}: {error}\n\nHint: The manifest must be a JSON object with a manifest_version of 2 or 3", .path.display())]
    InvalidManifest { path: PathBuf, error: String },

    #[error("Invalid value for '{field}': {value}\n\nHint: {hint}")]
    InvalidValue {
        field: String,
        value: String,
        hint: String,
    },

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the extension build itself.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{message}\n\nHint: {hint}")]
    Extension { message: String, hint: String },
}

impl From<WebextError> for BuildError {
    fn from(err: WebextError) -> Self {
        let hint = match &err {
            WebextError::MissingManifest => "Add a manifest to webext.config.json",
            WebextError::UnsupportedManifestVersion(_) => "Set manifest_version to 2 or 3",
            WebextError::InvalidManifest(_) => "The manifest must be a JSON object following the manifest.json format",
            WebextError::HmrMisconfigured(_) => "Remove the `hmr` override from your config",
            WebextError::InvalidFilter { .. } => "Fix the webAccessibleScripts include/exclude pattern",
            WebextError::MissingSource { .. } => "Check that every file the manifest references exists",
            WebextError::MissingChunk { .. } | WebextError::MissingCssAsset { .. } => {
                "The bundle did not contain this entry; run with --verbose for details"
            }
            WebextError::PathTraversal(_) => "Output names must stay inside the out dir",
            _ => "Run with --verbose for more details",
        };
        BuildError::Extension {
            message: err.to_string(),
            hint: hint.to_string(),
        }
    }
}

impl From<WebextError> for CliError {
    fn from(err: WebextError) -> Self {
        CliError::Build(err.into())
    }
}

/// Result type alias using `CliError` as the default error type.
pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Attach context to any error that converts into [`CliError`].
pub trait ResultExt<T> {
    /// Turn a not-found I/O error into [`CliError::FileNotFound`] for `path`.
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    /// Append a `Hint:` line.
    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<CliError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            match err {
                CliError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                    CliError::FileNotFound(path.as_ref().to_path_buf())
                }
                other => other,
            }
        })
    }

    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{}\n\nHint: {}", err, hint))
        })
    }
}
