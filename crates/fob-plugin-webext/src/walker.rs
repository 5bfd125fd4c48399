//! Chunk graph traversal.
//!
//! Collects every stylesheet and asset a chunk pulls in, directly or through
//! static and dynamic imports. Chunks reached transitively are themselves
//! reported as assets: the manifest only names the entry, so anything behind
//! it must be allowlisted separately.

use crate::bundle::OutputBundle;
use indexmap::IndexSet;
use rustc_hash::FxHashSet;

/// Compile-time token replaced with the CSS paths of the current chunk.
pub const CSS_PATHS_TOKEN: &str = "import.meta.CURRENT_CHUNK_CSS_PATHS";

/// Files discovered by a walk, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub css: IndexSet<String>,
    pub assets: IndexSet<String>,
}

impl ChunkMetadata {
    /// Assets followed by stylesheets, deduplicated.
    pub fn web_accessible_files(&self) -> IndexSet<String> {
        self.assets.iter().chain(self.css.iter()).cloned().collect()
    }

    /// JSON array literal of the CSS paths, substituted for [`CSS_PATHS_TOKEN`].
    pub fn css_array_literal(&self) -> String {
        let items: Vec<String> = self
            .css
            .iter()
            .map(|path| serde_json::Value::String(path.clone()).to_string())
            .collect();
        format!("[{}]", items.join(","))
    }
}

/// Walks chunk import graphs.
///
/// The visited set lives on the walker and is cleared at the start of every
/// top-level [`walk`](Self::walk), so repeated walks never leak state into
/// each other while a single walk never revisits a chunk.
#[derive(Debug, Default)]
pub struct ChunkWalker {
    visited: FxHashSet<String>,
}

impl ChunkWalker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the metadata reachable from `chunk_id`.
    ///
    /// `include_as_self` adds the starting chunk's own file name to the
    /// assets; every chunk reached through an import is always added.
    pub fn walk(
        &mut self,
        chunk_id: &str,
        bundle: &OutputBundle,
        include_as_self: bool,
    ) -> ChunkMetadata {
        self.visited.clear();
        let mut metadata = ChunkMetadata::default();

        // depth-first, children pushed in reverse to keep import order
        let mut stack: Vec<(String, bool)> = vec![(chunk_id.to_string(), include_as_self)];
        while let Some((id, include)) = stack.pop() {
            if self.visited.contains(&id) {
                continue;
            }
            let Some(chunk) = bundle.find_script_chunk(&id) else {
                continue;
            };
            if !self.visited.insert(chunk.file_name.clone()) {
                continue;
            }
            self.visited.insert(id);

            if include {
                metadata.assets.insert(chunk.file_name.clone());
            }
            metadata.css.extend(chunk.imported_css.iter().cloned());
            metadata.assets.extend(chunk.imported_assets.iter().cloned());

            for next in chunk.dynamic_imports.iter().rev().chain(chunk.imports.iter().rev()) {
                if !self.visited.contains(next) {
                    stack.push((next.clone(), true));
                }
            }
        }

        metadata
    }
}

/// Replace every occurrence of [`CSS_PATHS_TOKEN`] in `code`.
///
/// Returns `None` when the token does not occur.
pub fn substitute_css_paths(code: &str, metadata: &ChunkMetadata) -> Option<String> {
    code.contains(CSS_PATHS_TOKEN)
        .then(|| code.replace(CSS_PATHS_TOKEN, &metadata.css_array_literal()))
}
