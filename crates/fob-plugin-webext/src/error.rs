//! Error types for manifest parsing and extension builds.
//!
//! Configuration errors surface before any file I/O happens. Resolution
//! errors name the logical manifest path that failed so the user can fix the
//! declaration directly.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the web-extension engine.
#[derive(Debug, Error)]
pub enum WebextError {
    /// No manifest was supplied with the plugin options.
    #[error("Missing manifest definition")]
    MissingManifest,

    /// `manifest_version` is neither 2 nor 3.
    #[error("Unsupported manifest_version: {0} (expected 2 or 3)")]
    UnsupportedManifestVersion(String),

    /// The dev server has no usable hot-reload transport.
    #[error("HMR is misconfigured: {0}")]
    HmrMisconfigured(String),

    /// A user supplied include/exclude pattern is not a valid regex.
    #[error("Invalid script filter pattern '{pattern}': {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A manifest declared a script or page whose source file does not exist.
    #[error("Failed to find source file for {file}")]
    MissingSource { file: String },

    /// A declared script has no matching chunk in the bundle output.
    #[error("Failed to find chunk info for {file}")]
    MissingChunk { file: String },

    /// A declared stylesheet has no matching CSS asset in the bundle output.
    #[error("Failed to find CSS asset info for {file}")]
    MissingCssAsset { file: String },

    /// The manifest does not have the shape its dialect requires.
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// CSS parsing or printing failed.
    #[error("CSS error in {}: {message}", .path.display())]
    Css { path: PathBuf, message: String },

    /// Output path escapes the output directory.
    #[error("Path traversal detected: '{0}' is outside the output directory")]
    PathTraversal(String),

    /// Rolldown reported a build failure.
    #[error("Bundler error: {0}")]
    Bundler(String),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WebextError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for errors raised while validating options, before any build work.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::MissingManifest
                | Self::InvalidManifest(_)
                | Self::UnsupportedManifestVersion(_)
                | Self::HmrMisconfigured(_)
                | Self::InvalidFilter { .. }
        )
    }
}

/// Result alias used across the crate.
pub type Result<T, E = WebextError> = std::result::Result<T, E>;
