//! File-path resolution for manifest declared paths.
//!
//! Manifest paths are written relative to the project root (`./src/popup/index.html`,
//! `/src/content/main.ts`, `src\\content\\style.css`). Every lookup goes through
//! [`sanitize`] so that the logical output name is identical no matter how the
//! path was spelled.

use path_clean::PathClean;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static HTML_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^*]+\.html$").expect("valid html regex"));

/// Canonical forms of a manifest path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedPath {
    /// Directory and stem without extension or leading slash (`src/content/main`).
    pub name: String,
    /// `name` plus the original extension (`src/content/main.ts`).
    pub path: String,
}

/// Join path segments with `/`, normalize them, and split off the extension.
pub fn sanitize<I, S>(segments: I) -> SanitizedPath
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = segments
        .into_iter()
        .map(|s| s.as_ref().replace('\\', "/"))
        .collect::<Vec<_>>()
        .join("/");

    let normalized = normalize(&joined);
    let (dir, file) = match normalized.rfind('/') {
        Some(idx) => (&normalized[..idx], &normalized[idx + 1..]),
        None => ("", normalized.as_str()),
    };

    // a leading dot is part of the stem (".env" has no extension)
    let (stem, ext) = match file.rfind('.') {
        Some(idx) if idx > 0 => (&file[..idx], &file[idx..]),
        _ => (file, ""),
    };

    let name = format!("{dir}/{stem}").trim_start_matches('/').to_string();
    let path = format!("{name}{ext}");
    SanitizedPath { name, path }
}

/// Collapse repeated separators and resolve `.`/`..` segments.
fn normalize(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let cleaned = PathBuf::from(path).clean();
    let text = cleaned.to_string_lossy().replace('\\', "/");
    if text == "." { String::new() } else { text }
}

/// Result of resolving a manifest path against the project roots.
///
/// At most one of `input_file`/`public_file` is expected to be set. When
/// neither is, the reference is external (a URL) or simply absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Path in the source tree, when it exists.
    pub input_file: Option<PathBuf>,
    /// Path in the static public tree, when it exists.
    pub public_file: Option<PathBuf>,
    /// Logical output path without extension.
    pub output_file: String,
}

/// Resolves manifest paths against the source root and public directory.
#[derive(Debug, Clone)]
pub struct FileResolver {
    root: PathBuf,
    public_dir: Option<PathBuf>,
}

impl FileResolver {
    pub fn new(root: impl Into<PathBuf>, public_dir: Option<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_dir,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_dir(&self) -> Option<&Path> {
        self.public_dir.as_deref()
    }

    /// Resolve `file` to its input, public and output forms.
    ///
    /// Candidates are only reported when they exist on disk, unless
    /// `require_exists` is false (used for files that are about to be synthesized).
    pub fn resolve(&self, file: &str, require_exists: bool) -> ResolvedFile {
        let relative = sanitize([file]).path;
        let accept = |candidate: PathBuf| (!require_exists || candidate.exists()).then_some(candidate);

        ResolvedFile {
            input_file: accept(self.root.join(&relative)),
            public_file: self
                .public_dir
                .as_ref()
                .and_then(|dir| accept(dir.join(&relative))),
            output_file: output_name(file),
        }
    }

    /// Path of `file` relative to the source root, with forward slashes.
    pub fn relative_to_root(&self, file: &Path) -> Option<String> {
        file.strip_prefix(&self.root)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }
}

/// Logical output path (no extension) for a manifest path.
pub fn output_name(file: &str) -> String {
    sanitize([file]).name
}

/// Returns true for non-wildcard `.html` paths.
pub fn is_html(file: &str) -> bool {
    HTML_FILE.is_match(file)
}

/// Returns true when the path points outside the extension (`http://`, `https://`).
pub fn is_external(file: &str) -> bool {
    file.starts_with("http")
}

/// First `len` hex characters of the SHA-256 digest of `text`.
pub fn get_hash(text: &str, len: usize) -> String {
    let digest = format!("{:x}", Sha256::digest(text.as_bytes()));
    digest[..len.min(digest.len())].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_strips_leading_dot_and_slash() {
        let a = sanitize(["./src/content/main.ts"]);
        let b = sanitize(["/src/content/main.ts"]);
        let c = sanitize(["src//content/./main.ts"]);
        assert_eq!(a.name, "src/content/main");
        assert_eq!(a.path, "src/content/main.ts");
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_sanitize_backslashes_and_parent_segments() {
        let s = sanitize(["src\\popup\\..\\options\\index.html"]);
        assert_eq!(s.path, "src/options/index.html");
        assert_eq!(s.name, "src/options/index");
    }

    #[test]
    fn test_sanitize_joins_segments() {
        let s = sanitize(["project", "/assets/logo.png"]);
        assert_eq!(s.path, "project/assets/logo.png");
    }

    #[test]
    fn test_sanitize_without_directory_or_extension() {
        assert_eq!(sanitize(["background.html"]).name, "background");
        assert_eq!(sanitize(["LICENSE"]).path, "LICENSE");
        assert_eq!(sanitize([".env"]).name, ".env");
    }

    #[test]
    fn test_resolve_checks_existence() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src/content")).unwrap();
        fs::write(temp.path().join("src/content/main.ts"), "export {}").unwrap();
        let resolver = FileResolver::new(temp.path(), Some(temp.path().join("public")));

        let found = resolver.resolve("./src/content/main.ts", true);
        assert_eq!(found.input_file, Some(temp.path().join("src/content/main.ts")));
        assert_eq!(found.public_file, None);
        assert_eq!(found.output_file, "src/content/main");

        let missing = resolver.resolve("src/content/missing.ts", true);
        assert!(missing.input_file.is_none());
        assert_eq!(missing.output_file, "src/content/missing");
    }

    #[test]
    fn test_resolve_without_existence_check() {
        let temp = TempDir::new().unwrap();
        let resolver = FileResolver::new(temp.path(), None);
        let resolved = resolver.resolve("background.html", false);
        assert_eq!(resolved.input_file, Some(temp.path().join("background.html")));
        assert!(resolved.public_file.is_none());
    }

    #[test]
    fn test_resolve_public_file() {
        let temp = TempDir::new().unwrap();
        let public = temp.path().join("public");
        fs::create_dir_all(public.join("icons")).unwrap();
        fs::write(public.join("icons/16.png"), [0u8; 4]).unwrap();
        let resolver = FileResolver::new(temp.path(), Some(public.clone()));

        let resolved = resolver.resolve("icons/16.png", true);
        assert!(resolved.input_file.is_none());
        assert_eq!(resolved.public_file, Some(public.join("icons/16.png")));
    }

    #[test]
    fn test_is_html() {
        assert!(is_html("src/popup/index.html"));
        assert!(!is_html("*.html"));
        assert!(!is_html("src/main.ts"));
    }

    #[test]
    fn test_get_hash_is_stable() {
        assert_eq!(get_hash("src/content/main.ts", 6), get_hash("src/content/main.ts", 6));
        assert_eq!(get_hash("abc", 6).len(), 6);
        assert_ne!(get_hash("a.ts", 8), get_hash("b.ts", 8));
        // sha256("abc")
        assert_eq!(get_hash("abc", 8), "ba7816bf");
    }
}
