use super::{OutputPass, ParseContext, ParseResult};
use crate::error::Result;
use crate::files::is_html;
use crate::manifest::{Manifest, ManifestVersion};

/// Override points that differ between manifest schema versions.
///
/// The shared steps live on [`ParseContext`] and [`OutputPass`]; a dialect
/// decides where its fields live and how its allowlist is shaped.
pub trait Dialect: Send + Sync {
    fn version(&self) -> ManifestVersion;

    /// Every HTML page the manifest declares, in declaration order.
    fn html_files(&self, manifest: &Manifest) -> Vec<String>;

    /// Register compilable web-accessible resources as entries.
    fn parse_input_was(&self, ctx: &ParseContext, result: &mut ParseResult);

    /// Dialect-only input steps, run after the shared ones.
    fn parse_input_extra(&self, ctx: &ParseContext, result: &mut ParseResult) -> Result<()>;

    /// Widen the allowlist with everything allowlisted scripts pull in.
    fn parse_output_was(&self, pass: &mut OutputPass<'_>, result: &mut ParseResult) -> Result<()>;

    /// Point content scripts at their emitted files.
    fn parse_output_cs(&self, pass: &mut OutputPass<'_>, result: &mut ParseResult) -> Result<()>;

    /// Dialect-only output steps, run before `manifest.json` is emitted.
    fn parse_output_extra(&self, pass: &mut OutputPass<'_>, result: &mut ParseResult)
    -> Result<()>;
}

/// Select the strategy for `version`.
pub fn dialect_for(version: ManifestVersion) -> Box<dyn Dialect> {
    match version {
        ManifestVersion::V2 => Box::new(super::ManifestV2),
        ManifestVersion::V3 => Box::new(super::ManifestV3),
    }
}

/// Pages shared by both dialects, after the dialect's own toolbar popup.
pub(super) fn common_pages(manifest: &Manifest, pages: &mut Vec<String>) {
    if let Some(page) = manifest.options_ui.as_ref().and_then(|o| o.page.clone()) {
        pages.push(page);
    }
    if let Some(page) = &manifest.devtools_page {
        pages.push(page.clone());
    }
    if let Some(overrides) = &manifest.chrome_url_overrides {
        pages.extend(overrides.pages().cloned());
    }
}

pub(super) fn push_html<'a>(resources: impl Iterator<Item = &'a str>, pages: &mut Vec<String>) {
    pages.extend(resources.filter(|r| is_html(r)).map(str::to_string));
}
