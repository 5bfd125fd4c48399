//! Development server for `fob-webext dev`.
//!
//! The extension is bundled in memory and served over HTTP. The unpacked
//! extension written by [`fob_plugin_webext::DevBuilder`] only holds loader
//! shims, so every script the browser runs comes from here:
//!
//! - source paths (`/src/popup/main.ts`) redirect to the chunk built from them
//! - chunk and asset names are served from the in-memory bundle
//! - anything else falls back to the project root
//! - `/@webext/client` serves the dev client, `/__webext_sse__` its events

pub mod server;
pub mod state;
pub mod watcher;

pub use server::{DevHttpServer, SSE_PATH, router};
pub use state::{BuildStatus, DevBundle, DevState, SharedState, inject_client};
pub use watcher::{DEFAULT_IGNORES, FileChange, FileWatcher};

use serde::{Deserialize, Serialize};

/// Messages pushed to connected dev clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DevEvent {
    Connected,
    /// Full reload of every extension page and the background context.
    Reload,
    /// Replace the stylesheet registered under `id`.
    Style { id: String, content: String },
    StyleRemoved { id: String },
    BuildFailed { error: String },
}
