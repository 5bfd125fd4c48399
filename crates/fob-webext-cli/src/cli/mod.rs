//! Command-line interface definition.
//!
//! - `fob-webext create` scaffolds a new extension project
//! - `fob-webext build` bundles the extension for production
//! - `fob-webext dev` serves modules and writes a dev extension

mod commands;
pub mod enums;

use clap::Parser;

pub use commands::{BuildArgs, Command, CreateArgs, DevArgs, ProjectArgs};
pub use enums::*;

/// Build browser extensions from a manifest
#[derive(Parser, Debug)]
#[command(
    name = "fob-webext",
    version,
    about = "Build browser extensions from a manifest",
    long_about = "fob-webext reads your extension manifest, bundles every script, page and\n\
                  stylesheet it references, and rewrites the manifest so each declared path\n\
                  exists in the output. `dev` serves modules from memory and reloads on change."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}
