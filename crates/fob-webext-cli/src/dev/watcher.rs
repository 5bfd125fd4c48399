//! Project watcher for `fob-webext dev`.
//!
//! Watches the project root recursively. Dependencies, the out dir, and hidden
//! entries are filtered before anything reaches the dev loop.

use crate::error::{CliError, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Directories never worth a rebuild.
pub const DEFAULT_IGNORES: &[&str] = &["node_modules", "dist", "target", "*.log", "*.map"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Modified(PathBuf),
    Created(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, FileChange::Removed(_))
    }
}

/// Debounced recursive watcher. Dropping it stops the notifications.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Watch `root`, skipping paths that match `ignore_patterns`.
    ///
    /// Patterns are either `*.ext` suffixes or path prefixes relative to the
    /// root. Repeated events for one path inside `debounce_ms` collapse into one.
    pub fn new(
        root: PathBuf,
        ignore_patterns: Vec<String>,
        debounce_ms: u64,
    ) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        if !root.exists() {
            return Err(CliError::FileNotFound(root));
        }

        let (tx, rx) = mpsc::channel(100);
        let debounce = Duration::from_millis(debounce_ms);
        let mut last_event: Option<(PathBuf, Instant)> = None;
        let watch_root = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else {
                return;
            };
            for path in &event.paths {
                if should_ignore(path, &watch_root, &ignore_patterns) {
                    continue;
                }

                let now = Instant::now();
                if let Some((last_path, last_time)) = &last_event {
                    if last_path == path && now.duration_since(*last_time) < debounce {
                        continue;
                    }
                }
                last_event = Some((path.clone(), now));

                let change = match event.kind {
                    EventKind::Create(_) => FileChange::Created(path.clone()),
                    EventKind::Modify(_) => FileChange::Modified(path.clone()),
                    EventKind::Remove(_) => FileChange::Removed(path.clone()),
                    _ => continue,
                };
                let _ = tx.blocking_send(change);
            }
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn should_ignore(path: &Path, root: &Path, ignore_patterns: &[String]) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return true;
    };
    let relative_str = relative.to_string_lossy().replace('\\', "/");

    for pattern in ignore_patterns {
        if let Some(suffix) = pattern.strip_prefix('*') {
            if relative_str.ends_with(suffix) {
                return true;
            }
        } else {
            let pattern = pattern.trim_end_matches('/');
            if relative_str == pattern
                || relative_str.starts_with(&format!("{pattern}/"))
                || relative_str.contains(&format!("/{pattern}/"))
            {
                return true;
            }
        }
    }

    relative.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
    })
}
