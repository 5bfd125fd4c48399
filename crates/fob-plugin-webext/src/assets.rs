//! Stylesheet and binary asset modules.
//!
//! Imported `.css` files and media are not bundled into script chunks. Each is
//! written as its own output file and the importing module receives a small JS
//! module in its place: the stylesheet text for CSS, the runtime URL for
//! everything else. The registry remembers which module produced which file so
//! chunk metadata can list the CSS and assets each chunk pulls in.

use crate::error::{Result, WebextError};
use crate::files::get_hash;
use indexmap::IndexMap;
use lightningcss::printer::PrinterOptions;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, StyleSheet};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

/// Extensions handled as binary assets.
pub const ASSET_EXTENSIONS: &[&str] = &[
    "wasm", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "ttf", "woff", "woff2",
];

/// Extensions handled as stylesheets.
pub const STYLE_EXTENSIONS: &[&str] = &["css"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Style,
    Binary,
}

impl AssetKind {
    /// Classify a module id by extension.
    pub fn of(id: &str) -> Option<Self> {
        let ext = Path::new(strip_query(id))
            .extension()
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();
        if STYLE_EXTENSIONS.contains(&ext.as_str()) {
            Some(AssetKind::Style)
        } else if ASSET_EXTENSIONS.contains(&ext.as_str()) {
            Some(AssetKind::Binary)
        } else {
            None
        }
    }
}

fn strip_query(id: &str) -> &str {
    id.split_once('?').map_or(id, |(path, _)| path)
}

/// One emitted asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedAsset {
    pub kind: AssetKind,
    pub file_name: String,
    /// Logical name such as `style.css`.
    pub name: String,
    /// Source path relative to the project root (`src/content/style.css`).
    pub original_file_name: Option<String>,
    pub source: Vec<u8>,
}

/// Parse, optionally minify, and print a stylesheet.
pub fn process_css(path: &Path, source: &str, minify: bool) -> Result<String> {
    let css_error = |message: String| WebextError::Css {
        path: path.to_path_buf(),
        message,
    };

    let mut stylesheet = StyleSheet::parse(
        source,
        ParserOptions {
            filename: path.to_string_lossy().to_string(),
            ..Default::default()
        },
    )
    .map_err(|e| css_error(format!("{e:?}")))?;

    if minify {
        stylesheet
            .minify(MinifyOptions::default())
            .map_err(|e| css_error(format!("{e:?}")))?;
    }

    let printed = stylesheet
        .to_css(PrinterOptions {
            minify,
            ..Default::default()
        })
        .map_err(|e| css_error(format!("{e:?}")))?;

    Ok(printed.code)
}

/// Output file name for an asset module.
///
/// Hashed names carry the first six hex digits of the content digest.
pub fn asset_file_name(path: &Path, kind: AssetKind, content: &[u8], hashed: bool) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("asset");
    let ext = match kind {
        AssetKind::Style => "css".to_string(),
        AssetKind::Binary => path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_ascii_lowercase(),
    };

    if hashed {
        let hash = get_hash(&String::from_utf8_lossy(content), 6);
        format!("assets/{ext}/{stem}.{hash}.{ext}")
    } else {
        format!("assets/{ext}/{stem}.{ext}")
    }
}

/// `assets/css/style.css` with `n = 2` becomes `assets/css/style-2.css`.
fn numbered_file_name(file_name: &str, n: usize) -> String {
    let (dir, file) = match file_name.rfind('/') {
        Some(idx) => file_name.split_at(idx + 1),
        None => ("", file_name),
    };
    match file.find('.') {
        Some(idx) if idx > 0 => format!("{dir}{}-{n}{}", &file[..idx], &file[idx..]),
        _ => format!("{dir}{file}-{n}"),
    }
}

/// JS module standing in for a stylesheet.
pub fn style_module_code(css: &str) -> String {
    format!(
        "export default {};\n",
        serde_json::Value::String(css.to_string())
    )
}

/// Dev-mode stylesheet module: registers the CSS with the dev client under
/// `id` so later updates replace it in place.
pub fn dev_style_module_code(client_url: &str, id: &str, css: &str) -> String {
    format!(
        "import {{ updateStyle }} from {};\nconst css = {};\nupdateStyle({}, css);\nexport default css;\n",
        serde_json::Value::String(client_url.to_string()),
        serde_json::Value::String(css.to_string()),
        serde_json::Value::String(id.to_string()),
    )
}

/// JS module standing in for a binary asset; resolves through the extension runtime.
pub fn url_module_code(file_name: &str) -> String {
    format!(
        r#"export default (globalThis.chrome ?? globalThis.browser)?.runtime?.getURL?.("{file_name}") ?? "/{file_name}";
"#
    )
}

/// JS module for a binary asset served by the dev server at `origin`.
pub fn dev_url_module_code(origin: &str, file_name: &str) -> String {
    format!("export default \"{origin}/{file_name}\";\n")
}

/// Emitted assets keyed by the module id that produced them.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    inner: Arc<RwLock<IndexMap<String, EmittedAsset>>>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `asset` for `module_id` and return the file name it was stored under.
    ///
    /// A file name already held by another module with different content gets
    /// a numeric suffix (`style.css`, `style-1.css`) so neither output is lost.
    pub fn insert(&self, module_id: impl Into<String>, mut asset: EmittedAsset) -> String {
        let module_id = module_id.into();
        let mut inner = self.inner.write();
        let base = asset.file_name.clone();
        let mut counter = 0;
        while inner.iter().any(|(id, other)| {
            *id != module_id && other.file_name == asset.file_name && other.source != asset.source
        }) {
            counter += 1;
            asset.file_name = numbered_file_name(&base, counter);
        }
        let file_name = asset.file_name.clone();
        inner.insert(module_id, asset);
        file_name
    }

    pub fn get(&self, module_id: &str) -> Option<EmittedAsset> {
        self.inner.read().get(module_id).cloned()
    }

    /// All assets, in registration order.
    pub fn all(&self) -> Vec<EmittedAsset> {
        self.inner.read().values().cloned().collect()
    }

    /// Assets produced by any of `module_ids`, split into stylesheets and the rest.
    pub fn imported_by<'a>(
        &self,
        module_ids: impl IntoIterator<Item = &'a str>,
    ) -> (Vec<String>, Vec<String>) {
        let inner = self.inner.read();
        let mut css = Vec::new();
        let mut assets = Vec::new();
        for id in module_ids {
            if let Some(asset) = inner.get(id) {
                match asset.kind {
                    AssetKind::Style => css.push(asset.file_name.clone()),
                    AssetKind::Binary => assets.push(asset.file_name.clone()),
                }
            }
        }
        (css, assets)
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
