//! # fob-webext
//!
//! Command-line front end for [`fob_plugin_webext`]: scaffold an extension
//! project, build it for release, or run it against a dev server.
//!
//! ```bash
//! fob-webext create my-extension --framework react
//! fob-webext build
//! fob-webext dev --port 5173
//! ```
//!
//! The modules are public so the binary stays a thin dispatcher and the
//! pieces can be tested in isolation.

pub mod cli;
pub mod commands;
pub mod config;
pub mod dev;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{CliError, Result};
