//! Command implementations for `fob-webext`.
//!
//! - [`create`] - Scaffold a project from the embedded templates
//! - [`build`] - Production build of the extension
//! - [`dev`] - Dev server, dev build, and hot reload
//!
//! Each command exposes an `execute` function taking its parsed arguments.

pub mod build;
pub mod create;
pub mod dev;
mod templates;
pub(crate) mod utils;

pub use build::execute as build_execute;
pub use create::execute as create_execute;
pub use dev::execute as dev_execute;
