//! Manifest V3: scoped allowlist groups, `action`, service workers.

use super::dialect::{Dialect, common_pages, push_html};
use super::{OutputPass, ParseContext, ParseResult};
use crate::error::{Result, WebextError};
use crate::files::is_external;
use crate::loader::sw_loader;
use crate::manifest::{Manifest, ManifestVersion, ResourceGroup, WebAccessibleResource};
use indexmap::IndexSet;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// First character pair that ends the origin of a match pattern.
static ORIGIN_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^:/]/").expect("valid origin regex"));

#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestV3;

impl Dialect for ManifestV3 {
    fn version(&self) -> ManifestVersion {
        ManifestVersion::V3
    }

    fn html_files(&self, manifest: &Manifest) -> Vec<String> {
        let mut pages = Vec::new();
        if let Some(popup) = manifest.action.as_ref().and_then(|a| a.default_popup.clone()) {
            pages.push(popup);
        }
        common_pages(manifest, &mut pages);
        for group in manifest.war_groups() {
            push_html(group.resources.iter().map(String::as_str), &mut pages);
        }
        pages
    }

    fn parse_input_was(&self, ctx: &ParseContext, result: &mut ParseResult) {
        let resources: Vec<String> = result
            .manifest
            .war_groups()
            .flat_map(|group| group.resources.iter().cloned())
            .collect();
        for resource in &resources {
            ctx.push_web_accessible(resource, result);
        }
    }

    /// Register the service worker and mark the background as an ES module.
    fn parse_input_extra(&self, ctx: &ParseContext, result: &mut ParseResult) -> Result<()> {
        let Some(background) = result.manifest.background.as_mut() else {
            return Ok(());
        };
        let Some(worker) = background.service_worker.clone() else {
            return Ok(());
        };
        if is_external(&worker) {
            return Ok(());
        }

        let resolved = ctx.resolver.resolve(&worker, true);
        match (resolved.input_file, resolved.public_file) {
            (Some(input), _) => {
                background.kind = Some("module".to_string());
                result.push_input(resolved.output_file, input);
                Ok(())
            }
            (None, Some(_)) => Ok(()),
            (None, None) => Err(WebextError::MissingSource { file: worker }),
        }
    }

    /// Discovered files are nested inside the group that declared the script.
    fn parse_output_was(&self, pass: &mut OutputPass<'_>, result: &mut ParseResult) -> Result<()> {
        let Some(snapshot) = result.manifest.web_accessible_resources.clone() else {
            return Ok(());
        };

        for (group_index, entry) in snapshot.iter().enumerate() {
            let Some(group) = entry.as_group() else {
                continue;
            };
            for (index, file) in group.resources.iter().enumerate() {
                if !pass.is_compiled(file) {
                    continue;
                }

                let parsed = pass.parse_output_wa_script(file, result)?;
                let Some(target) = result
                    .manifest
                    .web_accessible_resources
                    .as_mut()
                    .and_then(|r| r.get_mut(group_index))
                    .and_then(WebAccessibleResource::as_group_mut)
                else {
                    continue;
                };
                if let Some(file_name) = parsed.file_name {
                    target.resources[index] = file_name;
                }
                for found in parsed.web_accessible_files {
                    if !target.resources.contains(&found) {
                        target.resources.push(found);
                    }
                }
            }
        }
        Ok(())
    }

    /// Each content script gets its own group scoped to the origins it runs on.
    fn parse_output_cs(&self, pass: &mut OutputPass<'_>, result: &mut ParseResult) -> Result<()> {
        let mut scripts = result.manifest.content_scripts.take();
        let mut groups: Vec<ResourceGroup> = Vec::new();

        for script in scripts.iter_mut().flatten() {
            let mut resources: IndexSet<String> = IndexSet::new();
            for js in script.js.iter_mut().flatten() {
                if let Some(parsed) = pass.parse_output_js(js, result)? {
                    if let Some(file_name) = parsed.file_name {
                        *js = file_name;
                    }
                    resources.extend(parsed.web_accessible_files);
                }
            }
            for css in script.css.iter_mut().flatten() {
                let file_name = pass.ctx.parse_output_css(css, &*pass.bundle)?;
                *css = file_name.clone();
                resources.insert(file_name);
            }

            if !resources.is_empty() {
                groups.push(ResourceGroup {
                    matches: Some(script.matches.iter().map(|p| scope_match_pattern(p)).collect()),
                    resources: resources.into_iter().collect(),
                    use_dynamic_url: pass.ctx.use_dynamic_url.then_some(true),
                    ..Default::default()
                });
            }
        }
        result.manifest.content_scripts = scripts;

        if !groups.is_empty() {
            let entries = result.manifest.web_accessible_resources.get_or_insert_with(Vec::new);
            for group in groups {
                let entry = WebAccessibleResource::Group(group);
                if !entries.contains(&entry) {
                    entries.push(entry);
                }
            }
        }
        Ok(())
    }

    /// Replace the service worker with a fixed-name loader.
    fn parse_output_extra(&self, pass: &mut OutputPass<'_>, result: &mut ParseResult) -> Result<()> {
        let Some(worker) = result
            .manifest
            .background
            .as_ref()
            .and_then(|b| b.service_worker.clone())
        else {
            return Ok(());
        };
        if is_external(&worker) {
            return Ok(());
        }
        let resolved = pass.ctx.resolver.resolve(&worker, true);
        let Some(input) = resolved.input_file else {
            return Ok(());
        };

        let chunk = pass
            .bundle
            .find_script_chunk(&input.to_string_lossy())
            .ok_or_else(|| WebextError::MissingChunk {
                file: worker.clone(),
            })?;

        let loader = sw_loader(&chunk.file_name);
        debug!(worker = %worker, chunk = %chunk.file_name, "service worker loader");
        if let Some(background) = result.manifest.background.as_mut() {
            background.service_worker = Some(loader.file_name.clone());
        }
        result.emit(loader.file_name, loader.source);
        Ok(())
    }
}

/// Widen a match pattern's path to `/*`, keeping its scheme and host.
///
/// `https://example.com/app/*` becomes `https://example.com/*`. Patterns
/// without a path (`<all_urls>`) or already at the root are returned as-is.
pub fn scope_match_pattern(pattern: &str) -> String {
    let Some(found) = ORIGIN_END.find(pattern) else {
        return pattern.to_string();
    };
    let path = &pattern[found.start() + 1..];
    if path == "/" || path == "/*" {
        return pattern.to_string();
    }
    pattern.replacen(path, "/*", 1)
}
