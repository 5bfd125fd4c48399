//! `fob-webext create`: scaffold a new extension project.

use crate::cli::{CreateArgs, PackageManager};
use crate::commands::templates::{self, TemplateOptions};
use crate::error::{CliError, Result, ResultExt};
use crate::ui;
use owo_colors::{OwoColorize, Stream::Stderr};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Project directory used when none is given.
pub const DEFAULT_NAME: &str = "web-extension";

/// Entries tolerated in a target directory, compared lowercased.
const IGNORABLE_FILES: &[&str] = &[
    ".ds_store",
    ".idea",
    ".vscode",
    ".git",
    ".gitattributes",
    ".gitignore",
    ".npmignore",
    ".travis.yml",
    "license",
    "thumbs.db",
    "npm-debug.log",
    "yarn-debug.log",
    "yarn-error.log",
    "yarnrc.yml",
    ".yarn",
];

/// Node core modules; npm refuses them as new package names.
const BUILTIN_MODULES: &[&str] = &[
    "assert", "buffer", "child_process", "cluster", "crypto", "dgram", "dns", "events", "fs",
    "http", "http2", "https", "module", "net", "os", "path", "process", "punycode", "querystring",
    "readline", "stream", "string_decoder", "timers", "tls", "tty", "url", "util", "v8", "vm",
    "worker_threads", "zlib",
];

/// Execute the create command.
///
/// 1. Resolve the project directory and validate its basename as a package name
/// 2. Refuse non-empty directories
/// 3. Render `base`, the framework template, and optionally `tailwind`
/// 4. Install dependencies unless `--skip-install`
/// 5. Print next steps
pub async fn execute(args: CreateArgs) -> Result<()> {
    print_banner();

    let cwd = std::env::current_dir()?;
    let directory = args
        .directory
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_NAME));
    let project_path = if directory.is_absolute() {
        directory.clone()
    } else {
        cwd.join(&directory)
    };
    let project_name = project_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| CliError::InvalidArgument(format!("Invalid project directory: {}", directory.display())))?;

    if let Err(reason) = validate_project_name(&project_name) {
        return Err(CliError::InvalidArgument(format!(
            "Invalid project name '{project_name}': {reason}"
        )));
    }
    if !is_folder_empty(&project_path)? {
        return Err(CliError::InvalidArgument(format!(
            "{} is not empty. Choose a new project name or clear out the directory",
            project_path.display()
        )));
    }

    let packman = args.packman.unwrap_or_else(PackageManager::detect);
    let options = TemplateOptions {
        name: project_name.clone(),
        framework: args.framework,
        typescript: args.use_typescript(),
        tailwind: args.tailwind,
    };

    eprintln!(
        "\n{} Using {} as package manager\n  Initializing project with: {}{}\n",
        "*".if_supports_color(Stderr, |t| t.dimmed()),
        packman.if_supports_color(Stderr, |t| t.blue()),
        options.framework.if_supports_color(Stderr, |t| t.cyan()),
        if options.typescript { " (TypeScript)" } else { "" },
    );

    fs::create_dir_all(&project_path)
        .with_hint(format!("Check that {} is writable", cwd.display()))?;
    let written = templates::render(&project_path, &options)?;
    ui::success(&format!("Created {} files in {}", written.len(), project_path.display()));

    if !args.skip_install {
        install_packages(packman, &project_path).await;
    }

    print_next_steps(&cwd, &project_path, packman, args.skip_install);
    Ok(())
}

fn print_banner() {
    let name = env!("CARGO_PKG_NAME").replace('-', " ").to_uppercase();
    eprintln!("{}", name.if_supports_color(Stderr, |t| t.bold()));
    eprintln!(
        "{}",
        env!("CARGO_PKG_DESCRIPTION").if_supports_color(Stderr, |t| t.dimmed())
    );
}

/// The rules npm applies to names of new packages, for an unscoped name.
pub fn validate_project_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("name length must be greater than zero".to_string());
    }
    if name.len() > 214 {
        return Err("name can no longer contain more than 214 characters".to_string());
    }
    if name.trim() != name {
        return Err("name cannot contain leading or trailing spaces".to_string());
    }
    if name.starts_with('.') {
        return Err("name cannot start with a period".to_string());
    }
    if name.starts_with('_') {
        return Err("name cannot start with an underscore".to_string());
    }
    if matches!(name.to_lowercase().as_str(), "node_modules" | "favicon.ico") {
        return Err(format!("{name} is not a valid package name"));
    }
    if BUILTIN_MODULES.contains(&name) {
        return Err(format!("{name} is a core module name"));
    }
    if name.to_lowercase() != name {
        return Err("name can no longer contain capital letters".to_string());
    }
    if name.chars().any(|c| "~'!()*".contains(c)) {
        return Err(r#"name can no longer contain special characters ("~\'!()*")"#.to_string());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err("name can only contain URL-friendly characters".to_string());
    }
    Ok(())
}

/// True when `root` is missing or holds nothing but editor and VCS leftovers.
pub fn is_folder_empty(root: &Path) -> Result<bool> {
    if !root.exists() {
        return Ok(true);
    }
    for entry in fs::read_dir(root).with_path(root)? {
        let name = entry?.file_name().to_string_lossy().to_lowercase();
        if !IGNORABLE_FILES.contains(&name.as_str()) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// `<pm> install`, then `<pm> run format`. Failures are reported, not fatal.
async fn install_packages(packman: PackageManager, project: &Path) {
    let mut args = vec!["install"];
    if !is_online().await {
        ui::warning("You appear to be offline");
        ui::info("Using the local cache");
        args.push("--offline");
    }

    ui::step("Installing packages");
    let installed = Command::new(packman.command())
        .args(&args)
        .current_dir(project)
        .env("ADBLOCK", "1")
        .env("NODE_ENV", "development")
        .status()
        .await;

    let formatted = match installed {
        Ok(status) if status.success() => {
            Command::new(packman.command())
                .args(["run", "format"])
                .current_dir(project)
                .env("ADBLOCK", "1")
                .env("NODE_ENV", "development")
                .output()
                .await
                .map(|output| output.status.success())
        }
        Ok(_) => Ok(false),
        Err(e) => Err(e),
    };

    match formatted {
        Ok(true) => ui::success("Packages installed"),
        Ok(false) => ui::warning("Installation failed"),
        Err(e) => ui::warning(&format!("Installation failed: could not run {packman}: {e}")),
    }
}

/// Resolve the registry, or the configured https proxy when that fails.
async fn is_online() -> bool {
    if tokio::net::lookup_host("registry.yarnpkg.com:443").await.is_ok() {
        return true;
    }
    let Some(proxy) = std::env::var("https_proxy")
        .ok()
        .or_else(|| std::env::var("HTTPS_PROXY").ok())
    else {
        return false;
    };
    match proxy_host(&proxy) {
        Some(host) => tokio::net::lookup_host(host).await.is_ok(),
        None => false,
    }
}

/// `http://user@proxy.local:8080/` -> `proxy.local:8080`, defaulting the port.
fn proxy_host(proxy: &str) -> Option<String> {
    let rest = proxy.split_once("://").map_or(proxy, |(_, rest)| rest);
    let authority = rest.split('/').next()?;
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    if host.is_empty() {
        return None;
    }
    if host.contains(':') {
        Some(host.to_string())
    } else {
        Some(format!("{host}:443"))
    }
}

fn print_next_steps(cwd: &Path, project: &Path, packman: PackageManager, skipped_install: bool) {
    let shown = project.strip_prefix(cwd).unwrap_or(project);
    eprintln!("\n{}", "Done. Now run:".if_supports_color(Stderr, |t| t.bold()));
    eprintln!("  cd {}", shown.display());
    if skipped_install {
        eprintln!("  {} install", packman.command());
    }
    eprintln!("  {}", packman.run_cmd("dev"));
    eprintln!();
}
