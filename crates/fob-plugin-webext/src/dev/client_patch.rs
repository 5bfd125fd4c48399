//! Shadow-DOM style targets for the dev client.
//!
//! The dev client injects hot-updated `<style>` tags into `document.head`,
//! which a content script's shadow root never sees. The patch adds
//! `addStyleTarget(root)` so every injected style is mirrored into each
//! registered root. Patching is textual: when any anchor is missing the
//! client is served unchanged.

use sha2::{Digest, Sha256};
use tracing::error;

const SHEETS_MAP: &str = "const sheetsMap";
const HEAD_APPEND: &str = "document.head.appendChild(style)";
const HEAD_REMOVE: &str = "document.head.removeChild(style)";
const TEXT_CONTENT: &str = "style.textContent = content";
const INNER_HTML: &str = "style.innerHTML = content";

const STYLE_TARGET_HELPERS: &str = r#"
function addStyleTarget(newStyleTarget) {
  for (const [, style] of sheetsMap.entries()) {
    addStyleToTarget(style, newStyleTarget, styleTargets.size !== 0);
  }
  styleTargets.add(newStyleTarget);
}
function addStyleToTarget(style, target, cloneStyle = true) {
  const addedStyle = cloneStyle ? style.cloneNode(true) : style;
  target.appendChild(addedStyle);
  styleTargetsStyleMap.set(style, [...(styleTargetsStyleMap.get(style) ?? []), addedStyle]);
}
"#;

/// A client response after patching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedClient {
    pub code: String,
    /// Weak validator over the served body.
    pub etag: String,
    pub patched: bool,
}

/// Patch the dev client, or return it unchanged when an anchor is missing.
pub fn patch_client(code: &str) -> PatchedClient {
    match rewrite(code) {
        Some(patched) => PatchedClient {
            etag: weak_etag(&patched),
            code: patched,
            patched: true,
        },
        None => {
            error!("Content script HMR style support disabled -- failed to rewrite dev client");
            PatchedClient {
                code: code.to_string(),
                etag: weak_etag(code),
                patched: false,
            }
        }
    }
}

fn rewrite(code: &str) -> Option<String> {
    let style_property = if code.contains(TEXT_CONTENT) {
        "style.textContent"
    } else if code.contains(INNER_HTML) {
        "style.innerHTML"
    } else {
        return None;
    };
    if !code.contains(SHEETS_MAP) || !code.contains(HEAD_APPEND) || !code.contains(HEAD_REMOVE) {
        return None;
    }

    let mut out = code
        .replacen(
            SHEETS_MAP,
            "const styleTargets = new Set(); const styleTargetsStyleMap = new Map(); const sheetsMap",
            1,
        )
        .replacen("export {", "export { addStyleTarget, ", 1)
        .replacen(
            HEAD_APPEND,
            "styleTargets.size ? styleTargets.forEach(target => addStyleToTarget(style, target)) : document.head.appendChild(style)",
            1,
        )
        .replacen(
            HEAD_REMOVE,
            "styleTargetsStyleMap.get(style) ? styleTargetsStyleMap.get(style).forEach(style => style.parentNode.removeChild(style)) : document.head.removeChild(style)",
            1,
        );

    let assignment = format!("{style_property} = content");
    if let Some(last) = out.rfind(&assignment) {
        let mirrored = format!(
            "{assignment}; styleTargetsStyleMap.get(style)?.forEach(style => {assignment})"
        );
        out.replace_range(last..last + assignment.len(), &mirrored);
    }

    out.push_str(STYLE_TARGET_HELPERS);
    Some(out)
}

/// `W/"<len hex>-<digest>"`, the shape common HTTP stacks use for weak tags.
pub fn weak_etag(body: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(body.as_bytes()));
    format!("W/\"{:x}-{}\"", body.len(), &digest[..27])
}
