//! `fob-webext build`: bundle the extension into the out dir.

use crate::cli::BuildArgs;
use crate::commands::utils;
use crate::config::ConfigOverrides;
use crate::dev::FileWatcher;
use crate::error::Result;
use crate::ui;
use fob_plugin_webext::{BuildMode, BuildReport, WebExtension};
use std::path::Path;
use tokio::signal;

/// Execute the build command.
///
/// 1. Load configuration (CLI > env > file > defaults) and the manifest
/// 2. Bundle with the web-extension plugin and write the out dir
/// 3. Print the summary
///
/// With `--watch` the build re-runs on every change under the project root
/// until Ctrl+C. Failed rebuilds are reported and the watch continues.
pub async fn execute(args: BuildArgs) -> Result<()> {
    let root = utils::resolve_root(args.project.root.as_deref())?;
    let report = build(&root, &args).await?;

    if args.watch {
        watch(&root, &args, &report.out_dir).await?;
    }
    Ok(())
}

fn overrides(args: &BuildArgs) -> ConfigOverrides {
    ConfigOverrides {
        sourcemap: args.sourcemap.then_some(true),
        minify: args.no_minify.then_some(false),
        ..Default::default()
    }
}

/// Load the project and run one build.
pub async fn build(root: &Path, args: &BuildArgs) -> Result<BuildReport> {
    let project = utils::load_project(root, &args.project, overrides(args))?;
    let mode = if args.watch { BuildMode::Watch } else { BuildMode::Build };
    let extension = WebExtension::new(project.options, project.config, mode)?;

    let spinner = ui::Spinner::new("Building extension...");
    match extension.build().await {
        Ok(report) => {
            spinner.finish(&format!(
                "Built {} files in {}",
                report.files.len(),
                ui::format_duration(report.duration)
            ));
            ui::print_build_summary(&report);
            Ok(report)
        }
        Err(err) => {
            spinner.fail("Build failed");
            Err(err.into())
        }
    }
}

async fn watch(root: &Path, args: &BuildArgs, out_dir: &Path) -> Result<()> {
    let (_watcher, mut changes) =
        FileWatcher::new(root.to_path_buf(), utils::watch_ignores(root, out_dir), 100)?;
    ui::info("Watching for changes. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            Some(change) = changes.recv() => {
                ui::step(&format!("Changed: {}", display_path(root, change.path())));
                // Config and manifest are re-read on every build.
                if let Err(err) = build(root, args).await {
                    ui::error(&err.to_string());
                }
            }
            _ = signal::ctrl_c() => {
                ui::info("Stopping watch");
                return Ok(());
            }
        }
    }
}

pub(crate) fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
