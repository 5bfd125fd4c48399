//! Rolldown plugin wiring the manifest parser into the bundle lifecycle.
//!
//! ```text
//! resolve_id / load   synthesized modules, HTML pages, CSS and binary assets
//! transform           self.location URLs, React refresh preamble (dev)
//! generate_bundle     HTML pages, asset files, manifest rewrite (build/watch)
//! ```

use crate::assets::{
    AssetKind, AssetRegistry, EmittedAsset, asset_file_name, dev_style_module_code,
    dev_url_module_code, process_css, style_module_code, url_module_code,
};
use crate::bundle::{AssetInfo, ChunkInfo, OutputBundle};
use crate::files::FileResolver;
use crate::html::{Page, PageRegistry, entry_module, rewrite_page};
use crate::options::{BuildMode, WebExtensionOptions};
use crate::parser::{EmitFile, ManifestParser};
use crate::store::ModuleStore;
use crate::transform::CodeTransform;
use crate::walker::ChunkWalker;
use anyhow::Context;
use parking_lot::Mutex;
use regex::Regex;
use rolldown_common::{
    ModuleType, Output, OutputAsset, OutputChunk, ResolvedExternal, StrOrBytes,
};
use rolldown_plugin::{
    HookGenerateBundleArgs, HookLoadArgs, HookLoadOutput, HookLoadReturn, HookNoopReturn,
    HookResolveIdArgs, HookResolveIdOutput, HookResolveIdReturn, HookTransformArgs,
    HookTransformOutput, HookTransformReturn, HookUsage, Plugin, PluginContext,
    SharedTransformPluginContext,
};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Import specifier of the content-script client runtime.
pub const CLIENT_MODULE_ID: &str = "fob-plugin-webext/client";

/// Placeholder in the client runtime replaced by the dev client URL.
const DEV_CLIENT_PLACEHOLDER: &str = "__WEBEXT_DEV_CLIENT__";

/// Path the dev server serves its client runtime under.
pub const DEV_CLIENT_PATH: &str = "/@webext/client";

const CLIENT_SOURCE: &str = include_str!("../assets/client.js");

static SCRIPT_MODULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.(m?[jt]sx?|c[jt]s)$").expect("valid script module regex")
});

/// Settings fixed for the lifetime of one plugin instance.
#[derive(Debug, Clone)]
pub struct PluginSettings {
    pub root: PathBuf,
    pub mode: BuildMode,
    pub minify: bool,
    pub hashed_file_names: bool,
    /// Dev server origin; assets resolve against it instead of the extension.
    pub dev_origin: Option<String>,
}

impl PluginSettings {
    pub fn new(root: impl Into<PathBuf>, mode: BuildMode) -> Self {
        Self {
            root: root.into(),
            mode,
            minify: true,
            hashed_file_names: true,
            dev_origin: None,
        }
    }

    pub fn with_minify(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }

    pub fn with_hashed_file_names(mut self, hashed: bool) -> Self {
        self.hashed_file_names = hashed;
        self
    }

    pub fn with_dev_origin(mut self, origin: impl Into<String>) -> Self {
        self.dev_origin = Some(origin.into());
        self
    }
}

/// Browser-extension plugin for rolldown.
#[derive(Debug, Clone)]
pub struct WebExtPlugin {
    options: Arc<WebExtensionOptions>,
    settings: Arc<PluginSettings>,
    parser: Arc<Mutex<ManifestParser>>,
    store: ModuleStore,
    assets: AssetRegistry,
    pages: PageRegistry,
    pending: Arc<Mutex<Vec<EmitFile>>>,
}

impl WebExtPlugin {
    /// Create the plugin around a parser whose input phase already ran.
    pub fn new(
        options: Arc<WebExtensionOptions>,
        parser: ManifestParser,
        settings: PluginSettings,
    ) -> Self {
        Self {
            store: parser.store().clone(),
            options,
            settings: Arc::new(settings),
            parser: Arc::new(Mutex::new(parser)),
            assets: AssetRegistry::new(),
            pages: PageRegistry::new(),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue files produced before bundling (input-phase emits).
    pub fn queue_emit(&self, files: impl IntoIterator<Item = EmitFile>) {
        self.pending.lock().extend(files);
    }

    pub fn assets(&self) -> &AssetRegistry {
        &self.assets
    }

    pub fn store(&self) -> &ModuleStore {
        &self.store
    }

    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    /// Register a stylesheet that is an entry of its own rather than an import.
    pub fn register_stylesheet(&self, path: &Path, source: &str) -> crate::error::Result<()> {
        let css = process_css(path, source, self.settings.minify)?;
        let asset = stylesheet_asset(&self.settings, path, css);
        let file_name = self.assets.insert(path.to_string_lossy(), asset);
        debug!(file = %file_name, "stylesheet entry");
        Ok(())
    }
}

fn stylesheet_asset(settings: &PluginSettings, path: &Path, css: String) -> EmittedAsset {
    let file_name = asset_file_name(path, AssetKind::Style, css.as_bytes(), settings.hashed_file_names);
    EmittedAsset {
        kind: AssetKind::Style,
        file_name,
        name: logical_name(path),
        original_file_name: source_name(settings, path),
        source: css.into_bytes(),
    }
}

/// Root-relative source path recorded on emitted assets.
fn source_name(settings: &PluginSettings, path: &Path) -> Option<String> {
    FileResolver::new(settings.root.clone(), None).relative_to_root(path)
}

fn logical_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn client_source(dev_origin: Option<&str>) -> String {
    let dev_client = match dev_origin {
        Some(origin) => format!("\"{origin}{DEV_CLIENT_PATH}\""),
        None => "null".to_string(),
    };
    CLIENT_SOURCE.replace(DEV_CLIENT_PLACEHOLDER, &dev_client)
}

fn js_module(code: String) -> HookLoadReturn {
    Ok(Some(HookLoadOutput {
        code: code.into(),
        module_type: Some(ModuleType::Js),
        ..Default::default()
    }))
}

impl Plugin for WebExtPlugin {
    fn name(&self) -> Cow<'static, str> {
        "fob-webext".into()
    }

    fn register_hook_usage(&self) -> HookUsage {
        HookUsage::ResolveId | HookUsage::Load | HookUsage::Transform | HookUsage::GenerateBundle
    }

    /// Claim synthesized modules and the client runtime; everything else is
    /// left to the default resolver.
    fn resolve_id(
        &self,
        _ctx: &PluginContext,
        args: &HookResolveIdArgs,
    ) -> impl std::future::Future<Output = HookResolveIdReturn> + Send {
        let specifier = args.specifier.to_string();
        let store = self.store.clone();

        async move {
            if specifier.starts_with("http://") || specifier.starts_with("https://") {
                return Ok(Some(HookResolveIdOutput {
                    id: specifier.into(),
                    external: Some(ResolvedExternal::Bool(true)),
                    ..Default::default()
                }));
            }
            if specifier == CLIENT_MODULE_ID || store.contains(&specifier) {
                return Ok(Some(HookResolveIdOutput {
                    id: specifier.into(),
                    external: Some(ResolvedExternal::Bool(false)),
                    ..Default::default()
                }));
            }
            Ok(None)
        }
    }

    fn load(
        &self,
        _ctx: &PluginContext,
        args: &HookLoadArgs<'_>,
    ) -> impl std::future::Future<Output = HookLoadReturn> + Send {
        let id = args.id.to_string();
        let store = self.store.clone();
        let assets = self.assets.clone();
        let pages = self.pages.clone();
        let settings = Arc::clone(&self.settings);

        async move {
            if id == CLIENT_MODULE_ID {
                return js_module(client_source(settings.dev_origin.as_deref()));
            }

            let path = PathBuf::from(&id);
            if id.ends_with(".html") {
                let source = match store.get(&id) {
                    Some(source) => source,
                    None => tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read HTML page: {id}"))?,
                };
                let resolver = FileResolver::new(settings.root.clone(), None);
                let file_name = resolver
                    .relative_to_root(&path)
                    .unwrap_or_else(|| logical_name(&path));
                let code = entry_module(&source, &path, &settings.root);
                debug!(page = %file_name, "html entry");
                pages.insert(id, Page { file_name, source });
                return js_module(code);
            }

            match AssetKind::of(&id) {
                Some(AssetKind::Style) => {
                    let source = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read stylesheet: {id}"))?;
                    let css = process_css(&path, &source, settings.minify)?;
                    let code = match settings.dev_origin.as_deref() {
                        Some(origin) => {
                            let style_id = FileResolver::new(settings.root.clone(), None)
                                .relative_to_root(&path)
                                .unwrap_or_else(|| id.clone());
                            dev_style_module_code(&format!("{origin}{DEV_CLIENT_PATH}"), &style_id, &css)
                        }
                        None => style_module_code(&css),
                    };
                    assets.insert(id, stylesheet_asset(&settings, &path, css));
                    js_module(code)
                }
                Some(AssetKind::Binary) => {
                    let content = tokio::fs::read(&path)
                        .await
                        .with_context(|| format!("Failed to read asset: {id}"))?;
                    let file_name = asset_file_name(
                        &path,
                        AssetKind::Binary,
                        &content,
                        settings.hashed_file_names,
                    );
                    let file_name = assets.insert(
                        id,
                        EmittedAsset {
                            kind: AssetKind::Binary,
                            file_name,
                            name: logical_name(&path),
                            original_file_name: source_name(&settings, &path),
                            source: content,
                        },
                    );
                    let code = match settings.dev_origin.as_deref() {
                        Some(origin) => dev_url_module_code(origin, &file_name),
                        None => url_module_code(&file_name),
                    };
                    js_module(code)
                }
                None => Ok(None),
            }
        }
    }

    fn transform(
        &self,
        _ctx: SharedTransformPluginContext,
        args: &HookTransformArgs<'_>,
    ) -> impl std::future::Future<Output = HookTransformReturn> + Send {
        let id = args.id.to_string();
        let code = args.code.to_string();
        let options = Arc::clone(&self.options);
        let mode = self.settings.mode;

        async move {
            if !SCRIPT_MODULE.is_match(&id) {
                return Ok(None);
            }
            let transformed = CodeTransform::new(&code, &id)
                .convert_imports()
                .enable_react_hmr(&options, mode)
                .finish();

            Ok(transformed.map(|code| HookTransformOutput {
                code: Some(code),
                map: None,
                side_effects: None,
                module_type: None,
            }))
        }
    }

    /// Emit pages and assets, then rewrite the manifest against the bundle.
    fn generate_bundle(
        &self,
        _ctx: &PluginContext,
        args: &mut HookGenerateBundleArgs<'_>,
    ) -> impl std::future::Future<Output = HookNoopReturn> + Send {
        let parser = Arc::clone(&self.parser);
        let assets = self.assets.clone();
        let pages = self.pages.clone();
        let pending = Arc::clone(&self.pending);
        let mode = self.settings.mode;

        async move {
            let mut bundle = collect_bundle(args.bundle.iter(), &assets);
            let mut emitted: Vec<Output> = Vec::new();

            for asset in assets.all() {
                if let Some(existing) = bundle.asset_mut(&asset.file_name) {
                    if existing.source != asset.source {
                        return Err(anyhow::anyhow!(
                            "Asset {} would overwrite a different file of the same name",
                            asset.file_name
                        ));
                    }
                    // identical content from another module shares the file
                    existing.original_file_names.extend(asset.original_file_name.clone());
                    continue;
                }
                if bundle.contains(&asset.file_name) {
                    return Err(anyhow::anyhow!(
                        "Asset {} collides with a chunk of the same name",
                        asset.file_name
                    ));
                }
                bundle.insert_asset(AssetInfo {
                    file_name: asset.file_name.clone(),
                    name: Some(asset.name.clone()),
                    original_file_names: asset.original_file_name.clone().into_iter().collect(),
                    source: asset.source.clone(),
                });
                emitted.push(binary_output(asset));
            }

            emitted.extend(page_outputs(&bundle, &pages));

            let mut files: Vec<EmitFile> = std::mem::take(&mut *pending.lock());
            if !mode.is_dev() {
                let result = parser.lock().parse_output(&mut bundle)?;
                files.extend(result.emit_files);
            }

            for output in args.bundle.iter_mut() {
                if let Output::Chunk(chunk) = output {
                    if let Some(updated) = bundle.find_script_chunk(&chunk.filename) {
                        if updated.code != chunk.code {
                            Arc::make_mut(chunk).code = updated.code.clone();
                        }
                    }
                }
            }

            emitted.extend(files.into_iter().map(text_output));
            args.bundle.extend(emitted);
            Ok(())
        }
    }
}

/// Snapshot the rolldown output as an [`OutputBundle`].
fn collect_bundle<'a>(outputs: impl Iterator<Item = &'a Output>, assets: &AssetRegistry) -> OutputBundle {
    let mut bundle = OutputBundle::new();
    for output in outputs {
        match output {
            Output::Chunk(chunk) => bundle.insert_chunk(chunk_info(chunk, assets)),
            Output::Asset(asset) => bundle.insert_asset(AssetInfo {
                file_name: asset.filename.to_string(),
                name: asset.names.first().cloned(),
                original_file_names: asset.original_file_names.clone(),
                source: match &asset.source {
                    StrOrBytes::Str(text) => text.clone().into_bytes(),
                    StrOrBytes::Bytes(bytes) => bytes.clone(),
                },
            }),
        }
    }
    bundle
}

fn chunk_info(chunk: &OutputChunk, assets: &AssetRegistry) -> ChunkInfo {
    let module_ids: Vec<String> = chunk.modules.keys.iter().map(|id| id.to_string()).collect();
    let (css, binary) = assets.imported_by(module_ids.iter().map(String::as_str));
    ChunkInfo {
        file_name: chunk.filename.to_string(),
        name: chunk.name.to_string(),
        facade_module_id: chunk.facade_module_id.as_ref().map(|id| id.to_string()),
        is_entry: chunk.is_entry,
        imports: chunk.imports.iter().map(|s| s.to_string()).collect(),
        dynamic_imports: chunk.dynamic_imports.iter().map(|s| s.to_string()).collect(),
        module_ids,
        code: chunk.code.clone(),
        imported_css: css.into_iter().collect(),
        imported_assets: binary.into_iter().collect(),
    }
}

/// HTML pages rewritten to load their entry chunk.
fn page_outputs(bundle: &OutputBundle, pages: &PageRegistry) -> Vec<Output> {
    let mut walker = ChunkWalker::new();
    let mut outputs = Vec::new();
    for chunk in bundle.chunks() {
        let Some(page) = chunk.facade_module_id.as_deref().and_then(|id| pages.get(id)) else {
            continue;
        };
        let metadata = walker.walk(&chunk.file_name, bundle, true);
        let css: Vec<String> = metadata.css.into_iter().collect();
        let html = rewrite_page(&page.source, &chunk.file_name, &css);
        debug!(page = %page.file_name, chunk = %chunk.file_name, "html page");
        outputs.push(text_output(EmitFile {
            file_name: page.file_name,
            source: html,
        }));
    }
    outputs
}

fn text_output(file: EmitFile) -> Output {
    Output::Asset(Arc::new(OutputAsset {
        names: vec![],
        original_file_names: vec![],
        filename: file.file_name.into(),
        source: StrOrBytes::Str(file.source),
    }))
}

fn binary_output(asset: EmittedAsset) -> Output {
    Output::Asset(Arc::new(OutputAsset {
        names: vec![asset.name],
        original_file_names: asset.original_file_name.into_iter().collect(),
        filename: asset.file_name.into(),
        source: StrOrBytes::Bytes(asset.source),
    }))
}
