//! Shared state of the dev server: the in-memory bundle, build status, and
//! connected SSE clients.

use super::DevEvent;
use async_trait::async_trait;
use fob_plugin_webext::assets::process_css;
use fob_plugin_webext::dev::{PatchedClient, patch_client};
use fob_plugin_webext::{DEV_CLIENT_PATH, DevServer, WebextError};
use parking_lot::RwLock;
use regex::Regex;
use rolldown_common::Output;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tokio::sync::mpsc;

const DEV_CLIENT_SOURCE: &str = include_str!("../../../fob-plugin-webext/assets/dev-client.js");

/// `src="/..."`, `href='/...'`, `from "/..."` and `import("/...")`, but not `//host` URLs.
static ROOT_RELATIVE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"((?:src|href)\s*=\s*|from\s*|import\s*\(\s*|import\s+)(["'])/([^/"'])"#)
        .expect("valid root-relative url regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    NotStarted,
    InProgress { started_at: Instant },
    Success { duration_ms: u64 },
    Failed { error: String },
}

impl BuildStatus {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, BuildStatus::InProgress { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            BuildStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// One in-memory build of the extension.
#[derive(Debug, Clone, Default)]
pub struct DevBundle {
    /// URL path (`/assets/js/main.js`) -> (content, content type)
    files: HashMap<String, (Vec<u8>, &'static str)>,
    /// Source path relative to the root -> chunk file name
    sources: HashMap<String, String>,
    /// Root-relative ids of stylesheets imported by chunks
    stylesheets: HashSet<String>,
}

impl DevBundle {
    /// Index bundler outputs. Module ids outside `root` are skipped.
    pub fn from_outputs(outputs: &[Output], root: &Path) -> Self {
        let mut bundle = Self::default();

        for output in outputs {
            match output {
                Output::Chunk(chunk) => {
                    let file_name = chunk.filename.to_string();
                    for id in &chunk.modules.keys {
                        let Some(relative) = relative_id(root, &id.to_string()) else {
                            continue;
                        };
                        if relative.ends_with(".css") {
                            bundle.stylesheets.insert(relative.clone());
                        }
                        bundle.sources.entry(relative).or_insert_with(|| file_name.clone());
                    }
                    // The facade chunk wins over any chunk that merely inlines the module.
                    if let Some(facade) = &chunk.facade_module_id {
                        if let Some(relative) = relative_id(root, &facade.to_string()) {
                            bundle.sources.insert(relative, file_name.clone());
                        }
                    }
                    bundle.insert(&file_name, chunk.code.as_bytes().to_vec());
                }
                Output::Asset(asset) => {
                    bundle.insert(asset.filename.as_str(), asset.source.as_bytes().to_vec());
                }
            }
        }
        bundle
    }

    pub(crate) fn insert(&mut self, file_name: &str, content: Vec<u8>) {
        let path = format!("/{}", file_name.replace('\\', "/"));
        let content_type = content_type(&path);
        self.files.insert(path, (content, content_type));
    }

    #[cfg(test)]
    pub(crate) fn insert_source(&mut self, relative: &str, chunk: &str) {
        self.sources.insert(relative.to_string(), chunk.to_string());
    }

    pub fn get(&self, path: &str) -> Option<&(Vec<u8>, &'static str)> {
        self.files.get(path)
    }

    /// Chunk built from the source at `relative`, if any.
    pub fn chunk_for(&self, relative: &str) -> Option<&str> {
        self.sources.get(relative).map(String::as_str)
    }

    pub fn has_stylesheet(&self, relative: &str) -> bool {
        self.stylesheets.contains(relative)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn relative_id(root: &Path, id: &str) -> Option<String> {
    Path::new(id)
        .strip_prefix(root)
        .ok()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
}

/// Content type by file extension.
pub fn content_type(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    match ext.to_ascii_lowercase().as_str() {
        "js" | "mjs" | "cjs" | "ts" | "mts" | "tsx" | "jsx" => "application/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "html" | "htm" => "text/html; charset=utf-8",
        "json" | "map" => "application/json; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Add the dev client script to a page, inside `<head>` when there is one.
pub fn inject_client(html: &str) -> String {
    let tag = format!(r#"<script type="module" src="{DEV_CLIENT_PATH}"></script>"#);
    match html.find("</head>") {
        Some(index) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..index]);
            out.push_str(&tag);
            out.push_str(&html[index..]);
            out
        }
        None => format!("{tag}\n{html}"),
    }
}

/// Point root-relative URLs of a page at the dev server.
///
/// Extension pages are served from the extension origin, where `/src/main.ts`
/// does not exist.
pub fn rewrite_root_urls(html: &str, origin: &str) -> String {
    let origin = origin.trim_end_matches('/');
    ROOT_RELATIVE_URL
        .replace_all(html, |caps: &regex::Captures<'_>| {
            format!("{}{}{origin}/{}", &caps[1], &caps[2], &caps[3])
        })
        .into_owned()
}

type ClientRegistry = Arc<RwLock<HashMap<usize, mpsc::Sender<String>>>>;

pub struct DevState {
    root: PathBuf,
    public_dir: Option<PathBuf>,
    origin: Option<String>,
    status: RwLock<BuildStatus>,
    bundle: RwLock<Arc<DevBundle>>,
    clients: ClientRegistry,
    next_client_id: RwLock<usize>,
    client: PatchedClient,
}

impl DevState {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            public_dir: None,
            origin: None,
            status: RwLock::new(BuildStatus::NotStarted),
            bundle: RwLock::new(Arc::new(DevBundle::default())),
            clients: Arc::new(RwLock::new(HashMap::new())),
            next_client_id: RwLock::new(0),
            client: patch_client(DEV_CLIENT_SOURCE),
        }
    }

    /// Serve static files from `dir` before falling back to the root.
    pub fn with_public_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.public_dir = dir;
        self
    }

    /// Origin pages are rewritten against, `http://localhost:5173`.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_dir(&self) -> Option<&Path> {
        self.public_dir.as_deref()
    }

    /// Dev client code served at `/@webext/client`.
    pub fn client(&self) -> &PatchedClient {
        &self.client
    }

    pub fn start_build(&self) {
        *self.status.write() = BuildStatus::InProgress {
            started_at: Instant::now(),
        };
    }

    /// Swap in a new bundle and mark the build successful.
    pub fn complete_build(&self, bundle: DevBundle) {
        let duration_ms = match &*self.status.read() {
            BuildStatus::InProgress { started_at } => started_at.elapsed().as_millis() as u64,
            _ => 0,
        };
        *self.bundle.write() = Arc::new(bundle);
        *self.status.write() = BuildStatus::Success { duration_ms };
    }

    /// Keep the last good bundle and record the failure.
    pub fn fail_build(&self, error: String) {
        *self.status.write() = BuildStatus::Failed { error };
    }

    pub fn status(&self) -> BuildStatus {
        self.status.read().clone()
    }

    pub fn bundle(&self) -> Arc<DevBundle> {
        Arc::clone(&self.bundle.read())
    }

    /// Root-relative id of `path`, the key stylesheets are registered under.
    pub fn style_id(&self, path: &Path) -> Option<String> {
        relative_id(&self.root, &path.to_string_lossy())
    }

    /// Register an SSE client. Events queued before the first poll are kept.
    pub fn register_client(&self) -> (usize, mpsc::Receiver<String>) {
        let id = {
            let mut next_id = self.next_client_id.write();
            let id = *next_id;
            *next_id += 1;
            id
        };

        let (tx, rx) = mpsc::channel(100);
        let _ = tx.try_send(encode(&DevEvent::Connected));
        if let Some(error) = self.status().error() {
            let _ = tx.try_send(encode(&DevEvent::BuildFailed {
                error: error.to_string(),
            }));
        }
        self.clients.write().insert(id, tx);
        (id, rx)
    }

    pub fn unregister_client(&self, id: usize) {
        self.clients.write().remove(&id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Send `event` to every client, dropping the ones that went away.
    pub async fn broadcast(&self, event: &DevEvent) {
        let json = encode(event);
        let clients = self.clients.read().clone();

        let mut failed = Vec::new();
        for (id, tx) in clients {
            if tx.send(json.clone()).await.is_err() {
                failed.push(id);
            }
        }
        for id in failed {
            self.unregister_client(id);
        }
    }
}

fn encode(event: &DevEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string())
}

#[async_trait]
impl DevServer for DevState {
    async fn transform_index_html(&self, _url: &str, html: &str) -> fob_plugin_webext::Result<String> {
        let html = inject_client(html);
        Ok(match &self.origin {
            Some(origin) => rewrite_root_urls(&html, origin),
            None => html,
        })
    }

    async fn load_stylesheet(&self, file: &Path) -> fob_plugin_webext::Result<String> {
        let source = tokio::fs::read_to_string(file)
            .await
            .map_err(|e| WebextError::io(file, e))?;
        process_css(file, &source, false)
    }
}

pub type SharedState = Arc<DevState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_status_transitions() {
        let state = DevState::new(PathBuf::from("/project"));
        assert_eq!(state.status(), BuildStatus::NotStarted);

        state.start_build();
        assert!(state.status().is_in_progress());

        state.complete_build(DevBundle::default());
        assert!(state.status().is_success());

        state.fail_build("syntax error".into());
        assert_eq!(state.status().error(), Some("syntax error"));
    }

    #[test]
    fn test_failed_build_keeps_last_bundle() {
        let state = DevState::new(PathBuf::from("/project"));
        let mut bundle = DevBundle::default();
        bundle.insert("assets/js/main.js", b"console.log(1)".to_vec());
        state.complete_build(bundle);

        state.fail_build("boom".into());
        assert!(state.bundle().get("/assets/js/main.js").is_some());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type("/a/b.js"), "application/javascript; charset=utf-8");
        assert_eq!(content_type("/style.CSS"), "text/css; charset=utf-8");
        assert_eq!(content_type("/icon.png"), "image/png");
        assert_eq!(content_type("/LICENSE"), "application/octet-stream");
    }

    #[test]
    fn test_inject_client() {
        let html = "<html><head><title>x</title></head><body></body></html>";
        let out = inject_client(html);
        assert!(out.contains(r#"<script type="module" src="/@webext/client"></script></head>"#));

        let bare = inject_client("<div></div>");
        assert!(bare.starts_with(r#"<script type="module" src="/@webext/client"></script>"#));
    }

    #[test]
    fn test_dev_client_is_patched() {
        let state = DevState::new(PathBuf::from("/project"));
        assert!(state.client().patched);
        assert!(state.client().code.contains("function addStyleTarget"));
        assert!(state.client().etag.starts_with("W/\""));
    }

    #[test]
    fn test_style_id() {
        let state = DevState::new(PathBuf::from("/project"));
        assert_eq!(
            state.style_id(Path::new("/project/src/content/style.css")).as_deref(),
            Some("src/content/style.css")
        );
        assert_eq!(state.style_id(Path::new("/elsewhere/a.css")), None);
    }

    #[tokio::test]
    async fn test_register_sends_connected_and_failure() {
        let state = DevState::new(PathBuf::from("/project"));
        state.fail_build("Unexpected token".into());

        let (_, mut rx) = state.register_client();
        assert_eq!(rx.recv().await.unwrap(), r#"{"type":"connected"}"#);
        assert_eq!(
            rx.recv().await.unwrap(),
            r#"{"type":"build_failed","error":"Unexpected token"}"#
        );
    }

    #[tokio::test]
    async fn test_broadcast_drops_disconnected_clients() {
        let state = DevState::new(PathBuf::from("/project"));
        let (_, mut rx) = state.register_client();
        let (_, gone) = state.register_client();
        drop(gone);
        assert_eq!(state.client_count(), 2);

        state.broadcast(&DevEvent::Reload).await;
        assert_eq!(state.client_count(), 1);

        assert_eq!(rx.recv().await.unwrap(), r#"{"type":"connected"}"#);
        assert_eq!(rx.recv().await.unwrap(), r#"{"type":"reload"}"#);
    }

    #[test]
    fn test_rewrite_root_urls() {
        let html = r#"<link href="/src/popup/style.css"><script type="module" src='/src/popup/main.ts'></script>
<a href="//cdn.example.com/x.js"></a><img src="logo.png"><img src="https://example.com/a.png">
<script type="module">import { boot } from "/src/boot.ts"; import("/src/lazy.ts"); import "/src/side.ts";</script>"#;
        let out = rewrite_root_urls(html, "http://localhost:5173/");

        assert!(out.contains(r#"href="http://localhost:5173/src/popup/style.css""#));
        assert!(out.contains(r#"src='http://localhost:5173/src/popup/main.ts'"#));
        assert!(out.contains(r#"from "http://localhost:5173/src/boot.ts""#));
        assert!(out.contains(r#"import("http://localhost:5173/src/lazy.ts")"#));
        assert!(out.contains(r#"import "http://localhost:5173/src/side.ts""#));
        assert!(out.contains(r#"href="//cdn.example.com/x.js""#));
        assert!(out.contains(r#"src="logo.png""#));
        assert!(out.contains(r#"src="https://example.com/a.png""#));
    }

    #[tokio::test]
    async fn test_transform_index_html_targets_dev_origin() {
        let page = r#"<html><head></head><body><script type="module" src="/src/popup/main.ts"></script></body></html>"#;

        let state = DevState::new(std::env::temp_dir()).with_origin("http://localhost:5173");
        let html = state.transform_index_html("src/popup/index.html", page).await.unwrap();
        assert!(html.contains(r#"src="http://localhost:5173/@webext/client""#));
        assert!(html.contains(r#"src="http://localhost:5173/src/popup/main.ts""#));

        let bare = DevState::new(std::env::temp_dir());
        let html = bare.transform_index_html("src/popup/index.html", page).await.unwrap();
        assert!(html.contains(r#"src="/src/popup/main.ts""#));
    }

    #[tokio::test]
    async fn test_load_stylesheet_processes_css() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("style.css");
        std::fs::write(&file, "a { color: red; }").unwrap();

        let state = DevState::new(temp.path().to_path_buf());
        let css = state.load_stylesheet(&file).await.unwrap();
        assert!(css.contains("color: red"));

        let missing = state.load_stylesheet(&temp.path().join("nope.css")).await;
        assert!(missing.is_err());
    }
}
