//! Dev builder: writes an unpacked extension that loads from the dev server.
//!
//! Nothing is bundled here. Every file the manifest references is replaced by
//! a shim pointing back at the dev server origin: HTML pages get a `<base>`
//! element, scripts get loader shims, stylesheets are written from the dev
//! server's transform. The CSP is widened so extension pages may reach the
//! server, and `manifest.json` is written last.

mod client_patch;
mod csp;

pub use client_patch::{PatchedClient, patch_client, weak_etag};
pub use csp::{ContentSecurityPolicy, DEV_SCRIPT_SOURCES, dev_policy};

use crate::config::ResolvedConfig;
use crate::error::{Result, WebextError};
use crate::files::{FileResolver, sanitize};
use crate::loader::{FileLoader, script_loader, sw_loader};
use crate::manifest::{Manifest, ManifestVersion, WebAccessibleResource};
use crate::options::{ScriptFilter, WebExtensionOptions};
use crate::parser::{MANIFEST_FILE, ManifestParser};
use crate::store::ModuleStore;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use indexmap::IndexSet;
use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::task::JoinSet;
use tracing::{debug, info};
use walkdir::WalkDir;

static HEAD_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<head.*?>").expect("valid head regex"));

static HTML_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<html.*?>").expect("valid html regex"));

static INLINE_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script.*?>([^<]+)</script>").expect("valid inline script regex")
});

/// What the dev builder needs from the running dev server.
#[async_trait]
pub trait DevServer: Send + Sync {
    /// Rewrite a page so its module scripts load from the server.
    async fn transform_index_html(&self, url: &str, html: &str) -> Result<String>;

    /// Stylesheet text for a CSS source file.
    async fn load_stylesheet(&self, file: &Path) -> Result<String>;
}

/// A source file whose shim is regenerated when it changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchTarget {
    Html { file: String, input: PathBuf },
    Stylesheet { output: String, input: PathBuf },
}

impl WatchTarget {
    pub fn input(&self) -> &Path {
        match self {
            WatchTarget::Html { input, .. } | WatchTarget::Stylesheet { input, .. } => input,
        }
    }
}

/// Builds and maintains the dev output directory.
#[derive(Debug)]
pub struct DevBuilder {
    manifest: Manifest,
    html_files: Vec<String>,
    version: ManifestVersion,
    resolver: FileResolver,
    filter: ScriptFilter,
    store: ModuleStore,
    out_dir: PathBuf,
    config: ResolvedConfig,
    hmr_server: String,
    script_hashes: IndexSet<String>,
    watched: Vec<WatchTarget>,
}

impl DevBuilder {
    /// Run the input phase and keep its manifest for shim generation.
    pub fn new(options: &WebExtensionOptions, config: &ResolvedConfig) -> Result<Self> {
        let mut parser = ManifestParser::new(options, config)?;
        let result = parser.parse_input()?;
        let html_files = parser.html_files();

        Ok(Self {
            version: parser.version(),
            resolver: parser.context().resolver.clone(),
            filter: parser.context().filter.clone(),
            store: parser.store().clone(),
            manifest: result.manifest,
            html_files,
            out_dir: config.out_dir(),
            config: config.clone(),
            hmr_server: String::new(),
            script_hashes: IndexSet::new(),
            watched: Vec::new(),
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn hmr_server(&self) -> &str {
        &self.hmr_server
    }

    /// Source files to watch after [`write_build`](Self::write_build).
    pub fn watch_targets(&self) -> &[WatchTarget] {
        &self.watched
    }

    /// Write the whole dev output for a server listening on `port`.
    pub async fn write_build(&mut self, server: &dyn DevServer, port: u16) -> Result<()> {
        self.hmr_server = self.config.hmr_origin(port)?;
        self.watched.clear();
        self.script_hashes.clear();

        empty_dir(&self.out_dir).await?;
        if let Some(public_dir) = self.resolver.public_dir() {
            copy_dir(public_dir, &self.out_dir).await?;
        }

        self.write_html(server).await?;
        self.write_content_scripts().await?;
        self.write_stylesheets(server).await?;
        self.write_web_accessible().await?;
        self.write_extras().await?;
        self.update_csp();

        let manifest = self.manifest.to_json_pretty()?;
        write_file(self.out_dir.join(MANIFEST_FILE), manifest).await?;

        info!(out_dir = %self.out_dir.display(), server = %self.hmr_server, "dev build written");
        Ok(())
    }

    /// Regenerate the shim fed by `path`. Returns false when nothing watches it.
    pub async fn on_change(&mut self, server: &dyn DevServer, path: &Path) -> Result<bool> {
        let targets: Vec<WatchTarget> = self
            .watched
            .iter()
            .filter(|target| target.input() == path)
            .cloned()
            .collect();

        for target in &targets {
            match target {
                WatchTarget::Html { file, input } => {
                    self.write_html_file(server, file, input).await?;
                }
                WatchTarget::Stylesheet { output, input } => {
                    let css = server.load_stylesheet(input).await?;
                    write_file(self.out_dir.join(output), css).await?;
                }
            }
            debug!(file = %path.display(), "dev shim regenerated");
        }
        Ok(!targets.is_empty())
    }

    async fn write_html(&mut self, server: &dyn DevServer) -> Result<()> {
        let files = self.html_files.clone();
        for file in files {
            let input = self
                .resolver
                .resolve(&file, false)
                .input_file
                .ok_or_else(|| WebextError::MissingSource { file: file.clone() })?;
            self.write_html_file(server, &file, &input).await?;
            self.watched.push(WatchTarget::Html { file, input });
        }
        Ok(())
    }

    async fn write_html_file(&mut self, server: &dyn DevServer, file: &str, input: &Path) -> Result<()> {
        let source = match self.store.get(&input.to_string_lossy()) {
            Some(source) => source,
            None => tokio::fs::read_to_string(input)
                .await
                .map_err(|e| WebextError::io(input, e))?,
        };
        let relative = sanitize([file]).path;
        let html = server.transform_index_html(&relative, &source).await?;
        let html = insert_base(&html, &format!("{}/{relative}", self.hmr_server));

        if self.version == ManifestVersion::V2 {
            self.script_hashes.extend(inline_script_hashes(&html));
        }
        write_file(self.out_dir.join(&relative), html).await
    }

    async fn write_content_scripts(&mut self) -> Result<()> {
        let mut loaders = Vec::new();
        for script in self.manifest.content_scripts.iter_mut().flatten() {
            for js in script.js.iter_mut().flatten() {
                let loader = dev_loader(&self.hmr_server, js);
                *js = loader.file_name.clone();
                loaders.push(loader);
            }
        }
        write_loaders(&self.out_dir, loaders).await
    }

    async fn write_stylesheets(&mut self, server: &dyn DevServer) -> Result<()> {
        let mut pending = Vec::new();
        for script in self.manifest.content_scripts.iter_mut().flatten() {
            for css in script.css.iter_mut().flatten() {
                let resolved = self.resolver.resolve(css, true);
                let Some(input) = resolved.input_file else {
                    continue;
                };
                let output = format!("{}.css", resolved.output_file);
                *css = output.clone();
                pending.push((output, input));
            }
        }

        for (output, input) in pending {
            let stylesheet = server.load_stylesheet(&input).await?;
            write_file(self.out_dir.join(&output), stylesheet).await?;
            self.watched.push(WatchTarget::Stylesheet { output, input });
        }
        Ok(())
    }

    async fn write_web_accessible(&mut self) -> Result<()> {
        let Some(resources) = self.manifest.web_accessible_resources.as_mut() else {
            return Ok(());
        };

        let mut loaders = Vec::new();
        let hmr_server = &self.hmr_server;
        let filter = &self.filter;
        let mut shim = |path: &mut String| {
            if path.contains('*') || !filter.matches(path) {
                return;
            }
            let loader = dev_loader(hmr_server, path);
            *path = loader.file_name.clone();
            loaders.push(loader);
        };

        for resource in resources.iter_mut() {
            match resource {
                WebAccessibleResource::Path(path) if self.version == ManifestVersion::V2 => shim(path),
                WebAccessibleResource::Group(group) if self.version == ManifestVersion::V3 => {
                    group.resources.iter_mut().for_each(&mut shim);
                }
                _ => {}
            }
        }
        write_loaders(&self.out_dir, loaders).await
    }

    async fn write_extras(&mut self) -> Result<()> {
        if self.version != ManifestVersion::V3 {
            return Ok(());
        }
        let Some(background) = self.manifest.background.as_mut() else {
            return Ok(());
        };
        let Some(worker) = background.service_worker.as_mut() else {
            return Ok(());
        };

        let loader = sw_loader(&format!("{}/{}", self.hmr_server, sanitize([&*worker]).path));
        *worker = loader.file_name.clone();
        write_loaders(&self.out_dir, vec![loader]).await
    }

    fn update_csp(&mut self) {
        match self.version {
            ManifestVersion::V2 => {
                let current = self.manifest.content_security_policy.as_ref().and_then(Value::as_str);
                let policy = dev_policy(current, &self.script_hashes);
                self.manifest.content_security_policy = Some(Value::String(policy));
            }
            ManifestVersion::V3 => {
                let csp = self
                    .manifest
                    .content_security_policy
                    .get_or_insert_with(|| Value::Object(Default::default()));
                if !csp.is_object() {
                    *csp = Value::Object(Default::default());
                }
                if let Value::Object(map) = csp {
                    let current = map.get("extension_pages").and_then(Value::as_str);
                    let policy = dev_policy(current, []);
                    map.insert("extension_pages".to_string(), Value::String(policy));
                }
            }
        }
    }
}

/// Loader shim importing `file` from the dev server.
fn dev_loader(hmr_server: &str, file: &str) -> FileLoader {
    let sanitized = sanitize([file]);
    script_loader(&sanitized.name, &format!("{hmr_server}/{}", sanitized.path))
}

/// Insert `<base href>` after the opening head tag, creating one if absent.
pub fn insert_base(html: &str, href: &str) -> String {
    let base = format!(r#"<base href="{href}">"#);
    if let Some(head) = HEAD_OPEN.find(html) {
        let mut out = html.to_string();
        out.insert_str(head.end(), &base);
        return out;
    }
    if let Some(root) = HTML_OPEN.find(html) {
        let mut out = html.to_string();
        out.insert_str(root.end(), &format!("<head>{base}</head>"));
        return out;
    }
    html.to_string()
}

/// `'sha256-<base64>'` for each inline script body.
pub fn inline_script_hashes(html: &str) -> Vec<String> {
    INLINE_SCRIPT
        .captures_iter(html)
        .map(|caps| format!("'sha256-{}'", STANDARD.encode(Sha256::digest(caps[1].as_bytes()))))
        .collect()
}

async fn empty_dir(dir: &Path) -> Result<()> {
    if tokio::fs::try_exists(dir).await.map_err(|e| WebextError::io(dir, e))? {
        tokio::fs::remove_dir_all(dir)
            .await
            .map_err(|e| WebextError::io(dir, e))?;
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| WebextError::io(dir, e))
}

/// Mirror `from` into `to`. A missing source directory is not an error.
pub async fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    if !from.is_dir() {
        return Ok(());
    }
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            WebextError::io(path, e.into())
        })?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            tokio::fs::create_dir_all(&target)
                .await
                .map_err(|e| WebextError::io(&target, e))?;
        } else {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| WebextError::io(parent, e))?;
            }
            tokio::fs::copy(entry.path(), &target)
                .await
                .map_err(|e| WebextError::io(&target, e))?;
        }
    }
    Ok(())
}

async fn write_file(path: PathBuf, contents: String) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| WebextError::io(parent, e))?;
    }
    tokio::fs::write(&path, contents)
        .await
        .map_err(|e| WebextError::io(&path, e))
}

/// Write independent loader files concurrently.
async fn write_loaders(out_dir: &Path, loaders: Vec<FileLoader>) -> Result<()> {
    let mut writes = JoinSet::new();
    for loader in loaders {
        writes.spawn(write_file(out_dir.join(&loader.file_name), loader.source));
    }
    while let Some(joined) = writes.join_next().await {
        joined.map_err(|e| WebextError::Bundler(format!("dev write task failed: {e}")))??;
    }
    Ok(())
}
