//! `fob-webext dev`: dev server, dev build, and the watch loop.
//!
//! The extension is bundled in memory and served by the dev server. The
//! [`DevBuilder`] writes the unpacked extension once; afterwards only the
//! shims fed by a changed file are rewritten, and connected pages are told to
//! reload or swap a stylesheet.

use crate::cli::DevArgs;
use crate::commands::build::display_path;
use crate::commands::utils;
use crate::config::ConfigOverrides;
use crate::dev::{DevBundle, DevEvent, DevHttpServer, DevState, FileChange, FileWatcher, SharedState};
use crate::error::{CliError, Result};
use crate::ui;
use fob_plugin_webext::{BuildMode, DevBuilder, DevServer, WebExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::debug;

pub async fn execute(args: DevArgs) -> Result<()> {
    let root = utils::resolve_root(args.project.root.as_deref())?;
    let overrides = ConfigOverrides {
        port: args.port,
        ..Default::default()
    };
    let project = utils::load_project(&root, &args.project, overrides)?;
    let port = project.port;
    let public_dir = project.config.public_dir.clone();

    let mut restart_files = Vec::new();
    restart_files.extend(project.manifest_path.clone());

    let extension = WebExtension::new(project.options, project.config, BuildMode::Dev)?;
    let origin = extension.config().hmr_origin(port)?;
    let extension = extension.with_dev_origin(origin.clone());

    let state: SharedState = Arc::new(
        DevState::new(root.clone())
            .with_public_dir(public_dir)
            .with_origin(origin.clone()),
    );
    let server = DevHttpServer::bind(Arc::clone(&state), port).await?;
    let mut server_task = tokio::spawn(server.serve());
    ui::success(&format!("Dev server running at {origin}"));

    rebuild(&state, &extension).await;

    let mut builder = DevBuilder::new(extension.options(), extension.config())?;
    builder.write_build(state.as_ref(), port).await?;
    ui::success(&format!(
        "Load {} as an unpacked extension",
        display_path(&root, builder.out_dir())
    ));

    let (_watcher, mut changes) = FileWatcher::new(
        root.clone(),
        utils::watch_ignores(&root, builder.out_dir()),
        100,
    )?;
    let session = Session {
        root,
        config: args.project.config.clone(),
        restart_files,
        state,
        extension,
    };

    loop {
        tokio::select! {
            Some(change) = changes.recv() => {
                session.handle_change(&change, &mut builder).await;
            }
            result = &mut server_task => {
                return match result {
                    Ok(served) => served,
                    Err(e) => Err(CliError::Server(e.to_string())),
                };
            }
            _ = signal::ctrl_c() => {
                ui::info("Shutting down dev server");
                server_task.abort();
                return Ok(());
            }
        }
    }
}

struct Session {
    root: PathBuf,
    config: Option<PathBuf>,
    restart_files: Vec<PathBuf>,
    state: SharedState,
    extension: WebExtension,
}

impl Session {
    async fn handle_change(&self, change: &FileChange, builder: &mut DevBuilder) {
        let path = change.path();
        let shown = display_path(&self.root, path);

        if self.needs_restart(path) {
            ui::warning(&format!("{shown} changed; restart `fob-webext dev` to apply it"));
            return;
        }

        match builder.on_change(self.state.as_ref(), path).await {
            Ok(true) => ui::step(&format!("Updated {shown}")),
            Ok(false) => {}
            Err(err) => ui::error(&err.to_string()),
        }

        if self.update_style(change).await {
            // Keep the bundle current for pages opened later; no reload needed.
            rebuild(&self.state, &self.extension).await;
            return;
        }

        debug!(file = %shown, "rebuilding dev bundle");
        if rebuild(&self.state, &self.extension).await {
            ui::step(&format!("Reloading after {shown}"));
            self.state.broadcast(&DevEvent::Reload).await;
        }
    }

    fn needs_restart(&self, path: &Path) -> bool {
        utils::is_config_file(&self.root, path, self.config.as_deref())
            || self.restart_files.iter().any(|file| file == path)
    }

    /// Push a changed stylesheet to connected pages. Returns true when the
    /// change was fully handled that way.
    async fn update_style(&self, change: &FileChange) -> bool {
        let Some(id) = self.state.style_id(change.path()) else {
            return false;
        };
        if !self.state.bundle().has_stylesheet(&id) {
            return false;
        }

        if change.is_removal() {
            self.state.broadcast(&DevEvent::StyleRemoved { id }).await;
            return false;
        }

        match self.state.load_stylesheet(change.path()).await {
            Ok(content) => {
                ui::step(&format!("Updated style {id}"));
                self.state.broadcast(&DevEvent::Style { id, content }).await;
                true
            }
            Err(err) => {
                ui::error(&err.to_string());
                false
            }
        }
    }
}

/// Bundle in memory and swap the result into the server state.
///
/// On failure the previous bundle keeps being served and clients get a
/// `build_failed` event.
async fn rebuild(state: &DevState, extension: &WebExtension) -> bool {
    state.start_build();
    match extension.bundle().await {
        Ok(outputs) => {
            let bundle = DevBundle::from_outputs(&outputs, state.root());
            debug!(files = bundle.len(), "dev bundle ready");
            state.complete_build(bundle);
            true
        }
        Err(err) => {
            let error = err.to_string();
            ui::error(&format!("Build failed: {error}"));
            state.fail_build(error.clone());
            state.broadcast(&DevEvent::BuildFailed { error }).await;
            false
        }
    }
}
