//! Loader shim synthesis.
//!
//! Extension manifests need exact, stable file names, while bundle output is
//! content-hashed. A loader is a tiny file with a fixed name whose only job is
//! to pull in the real chunk. All functions here are pure.

use crate::bundle::ChunkInfo;
use crate::files::{get_hash, is_external};

/// A synthesized file: fixed name plus its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLoader {
    pub file_name: String,
    pub source: String,
}

/// A loader that may point straight at an existing chunk (no source to emit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialLoader {
    pub file_name: String,
    pub source: Option<String>,
}

impl From<FileLoader> for PartialLoader {
    fn from(loader: FileLoader) -> Self {
        Self {
            file_name: loader.file_name,
            source: Some(loader.source),
        }
    }
}

/// Wrap `scripts` in a minimal HTML page named `<name>.html`.
pub fn html_loader(name: &str, scripts: &[String]) -> FileLoader {
    let tags: String = scripts
        .iter()
        .map(|src| format!(r#"<script type="module" src="{src}"></script>"#))
        .collect();

    FileLoader {
        file_name: format!("{name}.html"),
        source: format!(
            r#"<!DOCTYPE html><html lang="en"><head><meta charset="UTF-8" />{tags}</head></html>"#
        ),
    }
}

/// Dynamic-import shim for `output_file`, named after a hash of `input_file`.
///
/// Internal paths resolve through the extension runtime; `http` targets are
/// imported literally.
pub fn script_loader(input_file: &str, output_file: &str) -> FileLoader {
    let hash = get_hash(input_file, 6);
    let import_path = if is_external(output_file) {
        format!("'{output_file}'")
    } else {
        format!(r#"(chrome??browser).runtime.getURL("{output_file}")"#)
    };

    FileLoader {
        file_name: format!("assets/js/_cs.{hash}.js"),
        source: format!("(async()=>{{await import({import_path})}})();"),
    }
}

/// Service worker shim importing `file`.
pub fn sw_loader(file: &str) -> FileLoader {
    let import_path = if is_external(file) {
        file.to_string()
    } else {
        format!("/{file}")
    };

    FileLoader {
        file_name: "assets/js/_sw.js".to_string(),
        source: format!(r#"import "{import_path}";"#),
    }
}

/// Content-script loader. Chunks without imports are referenced directly.
pub fn cs_loader(file_name: &str, chunk: &ChunkInfo) -> PartialLoader {
    if chunk.is_standalone() {
        return PartialLoader {
            file_name: chunk.file_name.clone(),
            source: None,
        };
    }
    script_loader(file_name, &chunk.file_name).into()
}

/// Web-accessible script loader. Standalone chunks are copied to the declared path.
pub fn was_loader(file_name: &str, chunk: &ChunkInfo) -> PartialLoader {
    if chunk.is_standalone() {
        return PartialLoader {
            file_name: file_name.to_string(),
            source: Some(chunk.code.clone()),
        };
    }
    script_loader(file_name, &chunk.file_name).into()
}
