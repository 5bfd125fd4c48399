//! Source transforms applied to every module.
//!
//! - `new URL('x', self.location)` is rewritten to resolve against
//!   `import.meta.url`; `self.location` is the page inside a content script,
//!   not the extension.
//! - In dev mode, modules using React refresh get a preamble so the refresh
//!   runtime is installed before the page's own preamble could run.

use crate::options::{BuildMode, WebExtensionOptions};
use regex::Regex;
use std::sync::LazyLock;

static SELF_LOCATION_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bnew\s+URL\s*\(\s*('[^']+'|"[^"]+"|`[^`]+`)\s*,\s*self\.location\s*\)"#)
        .expect("valid URL regex")
});

/// Installs the refresh runtime globals without the page-level preamble.
pub const REACT_REFRESH_PREAMBLE: &str = "try {
    RefreshRuntime.injectIntoGlobalHook(window);
    window.$RefreshReg$ = () => {};
    window.$RefreshSig$ = () => (type) => type;
    window.__vite_plugin_react_preamble_installed__ = true;
  } catch {}";

const REACT_REFRESH_IMPORT: &str = r#"RefreshRuntime from "/@react-refresh""#;

/// Chained transform over one module's code.
#[derive(Debug, Clone)]
pub struct CodeTransform<'a> {
    file: String,
    code: &'a str,
    updated: Option<String>,
}

impl<'a> CodeTransform<'a> {
    pub fn new(code: &'a str, id: &str) -> Self {
        Self {
            file: id.to_lowercase(),
            code,
            updated: None,
        }
    }

    fn current(&self) -> &str {
        self.updated.as_deref().unwrap_or(self.code)
    }

    /// Resolve `new URL(.., self.location)` against the module instead of the page.
    pub fn convert_imports(mut self) -> Self {
        let code = self.current();
        if !code.contains("new URL") || !code.contains("self.location") {
            return self;
        }
        if !SELF_LOCATION_URL.is_match(code) {
            return self;
        }
        let replaced = SELF_LOCATION_URL
            .replace_all(code, |caps: &regex::Captures<'_>| {
                caps[0].replacen("self.location", "import.meta.url", 1)
            })
            .into_owned();
        self.updated = Some(replaced);
        self
    }

    /// Prepend the React refresh preamble in dev mode.
    pub fn enable_react_hmr(mut self, options: &WebExtensionOptions, mode: BuildMode) -> Self {
        if !mode.is_dev() || !options.use_dynamic_url || !options.use_react_hmr {
            return self;
        }
        let is_jsx = self.file.ends_with("tsx") || self.file.ends_with("jsx");
        let code = self.current();
        if code.is_empty() || (!is_jsx && !code.contains(REACT_REFRESH_IMPORT)) {
            return self;
        }
        self.updated = Some(format!("{REACT_REFRESH_PREAMBLE}{code}"));
        self
    }

    /// The transformed code, or `None` when nothing changed.
    pub fn finish(self) -> Option<String> {
        self.updated
    }
}
