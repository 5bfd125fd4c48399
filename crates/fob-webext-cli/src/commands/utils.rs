//! Helpers shared by `build` and `dev`.

use crate::cli::ProjectArgs;
use crate::config::{CONFIG_FILES, ConfigOverrides, ResolvedProject, WebextConfig};
use crate::error::{CliError, Result, ResultExt};
use std::path::{Path, PathBuf};

/// Absolute, canonical project root: `--root` or the current directory.
///
/// Canonical so bundler module ids (which are canonical) strip cleanly.
pub fn resolve_root(root: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    let root = match root {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => cwd.join(path),
        None => cwd,
    };
    if !root.is_dir() {
        return Err(CliError::InvalidArgument(format!(
            "Project root is not a directory: {}",
            root.display()
        )));
    }
    root.canonicalize().with_path(&root)
}

/// Layer the config sources for `root` and resolve the project.
pub fn load_project(root: &Path, project: &ProjectArgs, overrides: ConfigOverrides) -> Result<ResolvedProject> {
    let overrides = ConfigOverrides {
        manifest: project.manifest.clone(),
        out_dir: project.out_dir.clone(),
        ..overrides
    };
    let config = WebextConfig::load(root, project.config.as_deref(), &overrides)?;
    config.resolve(root)
}

/// Whether `path` is a file whose change requires reloading the config.
pub fn is_config_file(root: &Path, path: &Path, explicit: Option<&Path>) -> bool {
    if let Some(explicit) = explicit {
        if root.join(explicit) == path {
            return true;
        }
    }
    CONFIG_FILES.iter().any(|name| root.join(name) == path)
}

/// Patterns the watcher skips for a project writing to `out_dir`.
pub fn watch_ignores(root: &Path, out_dir: &Path) -> Vec<String> {
    let mut patterns: Vec<String> = crate::dev::DEFAULT_IGNORES.iter().map(|p| p.to_string()).collect();
    if let Ok(relative) = out_dir.strip_prefix(root) {
        let relative = relative.to_string_lossy().replace('\\', "/");
        if !relative.is_empty() {
            patterns.push(relative);
        }
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_resolve_root_rejects_missing_dir() {
        let err = resolve_root(Some(Path::new("/definitely/not/a/project"))).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument(_)));
    }

    #[test]
    fn test_resolve_root_is_canonical() {
        let temp = tempfile::tempdir().unwrap();
        let root = resolve_root(Some(temp.path())).unwrap();
        assert_eq!(root, temp.path().canonicalize().unwrap());
    }

    #[test]
    fn test_is_config_file() {
        let root = Path::new("/project");
        assert!(is_config_file(root, Path::new("/project/webext.config.json"), None));
        assert!(is_config_file(
            root,
            Path::new("/project/config/ext.json"),
            Some(Path::new("config/ext.json"))
        ));
        assert!(!is_config_file(root, Path::new("/project/src/main.ts"), None));
    }

    #[test]
    fn test_watch_ignores_out_dir() {
        let ignores = watch_ignores(Path::new("/project"), Path::new("/project/build/ext"));
        assert!(ignores.contains(&"build/ext".to_string()));
        assert!(ignores.contains(&"node_modules".to_string()));

        let outside = watch_ignores(Path::new("/project"), Path::new("/tmp/ext"));
        assert_eq!(outside.len(), crate::dev::DEFAULT_IGNORES.len());
    }

    #[test]
    #[serial]
    fn test_load_project_applies_flags() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(
            temp.path().join("manifest.json"),
            r#"{"manifest_version": 3, "name": "x", "version": "1.0.0"}"#,
        )
        .unwrap();
        let args = ProjectArgs {
            out_dir: Some(PathBuf::from("dist-ext")),
            ..Default::default()
        };
        let project = load_project(temp.path(), &args, ConfigOverrides::default()).unwrap();
        assert_eq!(project.config.out_dir(), temp.path().join("dist-ext"));
    }
}
