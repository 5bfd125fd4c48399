use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::cli::enums::{Framework, PackageManager};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scaffold a new extension project
    ///
    /// Copies the base template, the chosen framework and optionally tailwind
    /// into the target directory, then installs dependencies.
    Create(CreateArgs),

    /// Build the extension for production
    ///
    /// Bundles everything the manifest references into the out dir
    /// (`.extension` by default) and writes the rewritten manifest.
    Build(BuildArgs),

    /// Start the dev server and write a development extension
    ///
    /// Serves source modules over HTTP and writes loader shims into the out
    /// dir. Load the out dir as an unpacked extension once; edits reload.
    Dev(DevArgs),
}

/// Arguments for `create`
#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    /// Project directory; its basename becomes the package name
    #[arg(value_name = "PROJECT_DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Use the TypeScript version of the templates (default)
    #[arg(long = "ts", alias = "typescript", conflicts_with = "javascript")]
    pub typescript: bool,

    /// Use the JavaScript version of the templates
    #[arg(long = "js", alias = "javascript")]
    pub javascript: bool,

    /// UI framework to start from
    #[arg(long, visible_alias = "fw", value_enum, default_value = "vanilla")]
    pub framework: Framework,

    /// Add tailwindcss and postcss configuration
    #[arg(long)]
    pub tailwind: bool,

    /// Do not run a package manager install after creating the project
    #[arg(long)]
    pub skip_install: bool,

    /// Package manager to install with (detected from the invoking tool otherwise)
    #[arg(short, long, value_enum)]
    pub packman: Option<PackageManager>,
}

impl CreateArgs {
    /// TypeScript unless `--js` was given.
    pub fn use_typescript(&self) -> bool {
        self.typescript || !self.javascript
    }
}

/// Options shared by `build` and `dev`.
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Path to the config file (defaults to webext.config.json or webext.config.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to the manifest, overriding the config file
    #[arg(short, long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Project root (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Output directory, relative to the project root
    #[arg(short = 'd', long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
}

/// Arguments for `build`
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Emit source maps next to the chunks
    #[arg(long)]
    pub sourcemap: bool,

    /// Skip minification
    #[arg(long)]
    pub no_minify: bool,

    /// Rebuild when source files change
    #[arg(short, long)]
    pub watch: bool,
}

/// Arguments for `dev`
#[derive(Args, Debug, Clone, Default)]
pub struct DevArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Port for the dev server
    #[arg(short, long)]
    pub port: Option<u16>,
}
