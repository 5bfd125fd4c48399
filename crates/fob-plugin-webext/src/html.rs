//! HTML pages as bundle entries.
//!
//! A page is loaded into the bundler as a JS module importing each of its
//! local `<script type="module" src>` files. After bundling the page is
//! written back at its logical path with those scripts replaced by the entry
//! chunk and a stylesheet link for every CSS file the chunk imports.

use crate::files::is_external;
use parking_lot::RwLock;
use regex::{Captures, Regex};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

static SCRIPT_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b([^>]*)>\s*</script>").expect("valid script tag regex")
});

static MODULE_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\btype\s*=\s*["']?module["']?"#).expect("valid type attribute regex")
});

static SRC_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bsrc\s*=\s*["']([^"']+)["']"#).expect("valid src attribute regex")
});

static HEAD_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</head\s*>").expect("valid head regex"));

/// `src` of every local module script, in document order.
pub fn module_scripts(html: &str) -> Vec<String> {
    SCRIPT_TAG
        .captures_iter(html)
        .filter_map(|caps| local_module_src(&caps[1]))
        .collect()
}

fn local_module_src(attrs: &str) -> Option<String> {
    if !MODULE_TYPE.is_match(attrs) {
        return None;
    }
    let src = SRC_ATTR.captures(attrs)?.get(1)?.as_str();
    (!is_external(src) && !src.starts_with("//")).then(|| src.to_string())
}

/// Resolve a script `src` against the page location and project root.
pub fn resolve_script(src: &str, page: &Path, root: &Path) -> PathBuf {
    let src = src.split(['?', '#']).next().unwrap_or(src);
    match src.strip_prefix('/') {
        Some(rooted) => root.join(rooted),
        None => page
            .parent()
            .map_or_else(|| root.join(src), |dir| dir.join(src)),
    }
}

/// JS module body used as the bundler entry for a page.
pub fn entry_module(html: &str, page: &Path, root: &Path) -> String {
    module_scripts(html)
        .iter()
        .map(|src| {
            let path = resolve_script(src, page, root);
            let quoted = serde_json::Value::String(path.to_string_lossy().replace('\\', "/"));
            format!("import {quoted};\n")
        })
        .collect()
}

/// Replace local module scripts with the built chunk and its stylesheets.
pub fn rewrite_page(html: &str, chunk_file: &str, css_files: &[String]) -> String {
    let stripped = SCRIPT_TAG.replace_all(html, |caps: &Captures<'_>| {
        if local_module_src(&caps[1]).is_some() {
            String::new()
        } else {
            caps[0].to_string()
        }
    });

    let mut tags: String = css_files
        .iter()
        .map(|css| format!(r#"<link rel="stylesheet" href="/{css}">"#))
        .collect();
    tags.push_str(&format!(
        r#"<script type="module" src="/{chunk_file}"></script>"#
    ));

    match HEAD_CLOSE.find(&stripped) {
        Some(head) => {
            let mut page = stripped.to_string();
            page.insert_str(head.start(), &tags);
            page
        }
        None => format!("{tags}{stripped}"),
    }
}

/// A page loaded as an entry during the current build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Output path relative to the out dir (`src/popup/index.html`).
    pub file_name: String,
    pub source: String,
}

/// Pages keyed by module id.
#[derive(Debug, Clone, Default)]
pub struct PageRegistry {
    inner: Arc<RwLock<FxHashMap<String, Page>>>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, module_id: impl Into<String>, page: Page) {
        self.inner.write().insert(module_id.into(), page);
    }

    pub fn get(&self, module_id: &str) -> Option<Page> {
        self.inner.read().get(module_id).cloned()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}
