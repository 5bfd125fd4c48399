//! Bundler-neutral view of the build output.
//!
//! The manifest parser never touches rolldown types directly. The plugin
//! converts rolldown's output into an [`OutputBundle`], lets the parser
//! rewrite it, and copies the changed chunk code back.

use crate::files::sanitize;
use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use std::sync::LazyLock;

static STYLE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(s?[ca]ss)$").expect("valid stylesheet regex"));

/// One compiled JavaScript output file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkInfo {
    pub file_name: String,
    pub name: String,
    pub facade_module_id: Option<String>,
    pub is_entry: bool,
    /// File names of statically imported chunks.
    pub imports: Vec<String>,
    /// File names of dynamically imported chunks.
    pub dynamic_imports: Vec<String>,
    pub module_ids: Vec<String>,
    pub code: String,
    /// CSS file names imported by modules of this chunk.
    pub imported_css: IndexSet<String>,
    /// Non-script asset file names imported by modules of this chunk.
    pub imported_assets: IndexSet<String>,
}

impl ChunkInfo {
    /// A chunk with no static or dynamic imports can be referenced directly.
    pub fn is_standalone(&self) -> bool {
        self.imports.is_empty() && self.dynamic_imports.is_empty()
    }
}

/// One non-script output file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetInfo {
    pub file_name: String,
    /// Logical name such as `style.css`.
    pub name: Option<String>,
    /// Root-relative source paths this file was produced from.
    pub original_file_names: Vec<String>,
    pub source: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEntry {
    Chunk(ChunkInfo),
    Asset(AssetInfo),
}

impl OutputEntry {
    pub fn file_name(&self) -> &str {
        match self {
            OutputEntry::Chunk(chunk) => &chunk.file_name,
            OutputEntry::Asset(asset) => &asset.file_name,
        }
    }
}

/// Output files keyed by emitted file name, in emission order.
#[derive(Debug, Clone, Default)]
pub struct OutputBundle {
    entries: IndexMap<String, OutputEntry>,
}

impl OutputBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: OutputEntry) {
        self.entries.insert(entry.file_name().to_string(), entry);
    }

    pub fn insert_chunk(&mut self, chunk: ChunkInfo) {
        self.insert(OutputEntry::Chunk(chunk));
    }

    pub fn insert_asset(&mut self, asset: AssetInfo) {
        self.insert(OutputEntry::Asset(asset));
    }

    pub fn get(&self, file_name: &str) -> Option<&OutputEntry> {
        self.entries.get(file_name)
    }

    pub fn asset_mut(&mut self, file_name: &str) -> Option<&mut AssetInfo> {
        match self.entries.get_mut(file_name) {
            Some(OutputEntry::Asset(asset)) => Some(asset),
            _ => None,
        }
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.entries.contains_key(file_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &OutputEntry> {
        self.entries.values()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &ChunkInfo> {
        self.entries.values().filter_map(|entry| match entry {
            OutputEntry::Chunk(chunk) => Some(chunk),
            OutputEntry::Asset(_) => None,
        })
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetInfo> {
        self.entries.values().filter_map(|entry| match entry {
            OutputEntry::Asset(asset) => Some(asset),
            OutputEntry::Chunk(_) => None,
        })
    }

    /// Find the chunk emitted for `id`.
    ///
    /// Matches when the chunk's facade module id or file name ends with the
    /// normalized path of `id`. Bundlers rename output files, the source path
    /// suffix is the stable anchor.
    pub fn find_script_chunk(&self, id: &str) -> Option<&ChunkInfo> {
        let key = self.script_chunk_key(id)?;
        match self.entries.get(&key) {
            Some(OutputEntry::Chunk(chunk)) => Some(chunk),
            _ => None,
        }
    }

    /// Mutable variant of [`find_script_chunk`](Self::find_script_chunk).
    pub fn find_script_chunk_mut(&mut self, id: &str) -> Option<&mut ChunkInfo> {
        let key = self.script_chunk_key(id)?;
        match self.entries.get_mut(&key) {
            Some(OutputEntry::Chunk(chunk)) => Some(chunk),
            _ => None,
        }
    }

    fn script_chunk_key(&self, id: &str) -> Option<String> {
        let file = sanitize([id]).path;
        self.chunks()
            .find(|chunk| {
                chunk
                    .facade_module_id
                    .as_deref()
                    .is_some_and(|facade| facade.replace('\\', "/").ends_with(&file))
                    || chunk.file_name.ends_with(&file)
            })
            .map(|chunk| chunk.file_name.clone())
    }

    /// Find the CSS asset emitted for the stylesheet `file`.
    ///
    /// Assets are matched on their source path, ignoring the extension so a
    /// preprocessed `.scss` source still finds its `.css` output. Assets with
    /// no recorded source fall back to their logical name, which must equal
    /// the file name of `file` exactly.
    pub fn find_css_asset(&self, file: &str) -> Option<&AssetInfo> {
        let expected = sanitize([file]).name;
        let styles = || {
            self.assets().filter(|asset| {
                STYLE_FILE.is_match(asset.name.as_deref().unwrap_or(&asset.file_name))
            })
        };

        styles()
            .find(|asset| {
                asset
                    .original_file_names
                    .iter()
                    .any(|original| sanitize([original]).name == expected)
            })
            .or_else(|| {
                let base = format!("{}.css", expected.rsplit('/').next().unwrap_or(expected.as_str()));
                styles().find(|asset| {
                    asset.original_file_names.is_empty() && asset.name.as_deref() == Some(base.as_str())
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bundle() -> OutputBundle {
        let mut bundle = OutputBundle::new();
        bundle.insert_chunk(ChunkInfo {
            file_name: "assets/js/main.a1b2c3.js".into(),
            name: "main".into(),
            facade_module_id: Some("/project/src/content/main.ts".into()),
            is_entry: true,
            ..Default::default()
        });
        bundle.insert_asset(AssetInfo {
            file_name: "assets/css/style.d4e5f6.css".into(),
            name: Some("style.css".into()),
            original_file_names: vec!["src/content/style.css".into()],
            source: b"body{}".to_vec(),
        });
        bundle
    }

    #[test]
    fn test_find_script_chunk_by_facade() {
        let bundle = sample_bundle();
        let chunk = bundle.find_script_chunk("./src/content/main.ts").unwrap();
        assert_eq!(chunk.file_name, "assets/js/main.a1b2c3.js");
        assert!(bundle.find_script_chunk("src/content/other.ts").is_none());
    }

    #[test]
    fn test_find_script_chunk_by_file_name() {
        let bundle = sample_bundle();
        assert!(bundle.find_script_chunk("assets/js/main.a1b2c3.js").is_some());
    }

    #[test]
    fn test_find_css_asset() {
        let bundle = sample_bundle();
        let asset = bundle.find_css_asset("src/content/style.css").unwrap();
        assert_eq!(asset.file_name, "assets/css/style.d4e5f6.css");
        assert!(bundle.find_css_asset("src/content/theme.css").is_none());
    }

    fn style_asset(file_name: &str, original: Option<&str>) -> AssetInfo {
        let name = file_name.rsplit('/').next().unwrap_or(file_name);
        AssetInfo {
            file_name: file_name.into(),
            name: Some(name.into()),
            original_file_names: original.into_iter().map(String::from).collect(),
            source: vec![],
        }
    }

    #[test]
    fn test_find_css_asset_same_basename_in_two_directories() {
        let mut bundle = OutputBundle::new();
        let a = style_asset("assets/css/style.css", Some("src/a/style.css"));
        let mut b = style_asset("assets/css/style-1.css", Some("src/b/style.css"));
        b.name = Some("style.css".into());
        bundle.insert_asset(a);
        bundle.insert_asset(b);

        assert_eq!(bundle.find_css_asset("src/a/style.css").unwrap().file_name, "assets/css/style.css");
        assert_eq!(bundle.find_css_asset("./src/b/style.css").unwrap().file_name, "assets/css/style-1.css");
        assert!(bundle.find_css_asset("src/c/style.css").is_none());
    }

    #[test]
    fn test_find_css_asset_requires_whole_file_name() {
        let mut bundle = OutputBundle::new();
        bundle.insert_asset(style_asset("assets/css/style.css", None));

        assert!(bundle.find_css_asset("src/mystyle.css").is_none());
        assert_eq!(bundle.find_css_asset("src/style.css").unwrap().file_name, "assets/css/style.css");

        let mut bundle = OutputBundle::new();
        bundle.insert_asset(style_asset("assets/css/style.css", Some("src/style.css")));
        assert!(bundle.find_css_asset("src/mystyle.css").is_none());
    }

    #[test]
    fn test_find_css_asset_matches_preprocessed_source() {
        let mut bundle = OutputBundle::new();
        bundle.insert_asset(style_asset("assets/css/theme.abc123.css", Some("src/theme.scss")));
        assert!(bundle.find_css_asset("src/theme.scss").is_some());
    }

    #[test]
    fn test_find_css_asset_ignores_non_styles() {
        let mut bundle = OutputBundle::new();
        bundle.insert_asset(AssetInfo {
            file_name: "assets/png/style.png".into(),
            name: Some("style.png".into()),
            original_file_names: vec!["src/style.png".into()],
            source: vec![],
        });
        assert!(bundle.find_css_asset("src/style.css").is_none());
    }

    #[test]
    fn test_insert_replaces_same_file_name() {
        let mut bundle = sample_bundle();
        bundle.insert_asset(AssetInfo {
            file_name: "assets/css/style.d4e5f6.css".into(),
            name: Some("style.css".into()),
            original_file_names: vec!["src/content/style.css".into()],
            source: b"p{}".to_vec(),
        });
        assert_eq!(bundle.len(), 2);
    }
}
