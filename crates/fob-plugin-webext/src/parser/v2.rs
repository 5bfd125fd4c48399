//! Manifest V2: flat allowlist, `browser_action`, background pages.

use super::dialect::{Dialect, common_pages, push_html};
use super::{OutputPass, ParseContext, ParseResult};
use crate::error::Result;
use crate::loader::html_loader;
use crate::manifest::{Manifest, ManifestVersion, WebAccessibleResource};
use indexmap::IndexSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestV2;

impl Dialect for ManifestV2 {
    fn version(&self) -> ManifestVersion {
        ManifestVersion::V2
    }

    fn html_files(&self, manifest: &Manifest) -> Vec<String> {
        let mut pages = Vec::new();
        if let Some(page) = manifest.background.as_ref().and_then(|b| b.page.clone()) {
            pages.push(page);
        }
        if let Some(popup) = manifest
            .browser_action
            .as_ref()
            .and_then(|a| a.default_popup.clone())
        {
            pages.push(popup);
        }
        common_pages(manifest, &mut pages);
        push_html(manifest.war_paths(), &mut pages);
        pages
    }

    fn parse_input_was(&self, ctx: &ParseContext, result: &mut ParseResult) {
        let resources: Vec<String> = result.manifest.war_paths().map(str::to_string).collect();
        for resource in &resources {
            ctx.push_web_accessible(resource, result);
        }
    }

    /// Promote `background.scripts` to a synthesized background page.
    fn parse_input_extra(&self, ctx: &ParseContext, result: &mut ParseResult) -> Result<()> {
        let Some(background) = result.manifest.background.as_mut() else {
            return Ok(());
        };
        let Some(scripts) = background.scripts.take() else {
            return Ok(());
        };

        let sources: Vec<String> = scripts
            .iter()
            .map(|script| match script.strip_prefix("./") {
                Some(rest) => format!("/{rest}"),
                None => script.clone(),
            })
            .collect();
        let loader = html_loader("background", &sources);
        background.page = Some(loader.file_name.clone());

        let resolved = ctx.resolver.resolve(&loader.file_name, false);
        if let Some(input) = resolved.input_file {
            debug!(scripts = sources.len(), page = %loader.file_name, "background scripts promoted to page");
            ctx.store.set(input.to_string_lossy(), loader.source);
            result.push_input(resolved.output_file, input);
        }
        Ok(())
    }

    fn parse_output_was(&self, pass: &mut OutputPass<'_>, result: &mut ParseResult) -> Result<()> {
        let Some(snapshot) = result.manifest.web_accessible_resources.clone() else {
            return Ok(());
        };

        for (index, resource) in snapshot.iter().enumerate() {
            let Some(path) = resource.as_path() else {
                continue;
            };
            if !pass.is_compiled(path) {
                continue;
            }

            let parsed = pass.parse_output_wa_script(path, result)?;
            let Some(resources) = result.manifest.web_accessible_resources.as_mut() else {
                continue;
            };
            if let Some(file_name) = parsed.file_name {
                resources[index] = WebAccessibleResource::Path(file_name);
            }
            for file in parsed.web_accessible_files {
                append_path(resources, file);
            }
        }
        Ok(())
    }

    /// Content-script dependencies go into one manifest-wide allowlist.
    fn parse_output_cs(&self, pass: &mut OutputPass<'_>, result: &mut ParseResult) -> Result<()> {
        let mut scripts = result.manifest.content_scripts.take();
        let mut accessible: IndexSet<String> = IndexSet::new();

        for script in scripts.iter_mut().flatten() {
            for js in script.js.iter_mut().flatten() {
                if let Some(parsed) = pass.parse_output_js(js, result)? {
                    if let Some(file_name) = parsed.file_name {
                        *js = file_name;
                    }
                    accessible.extend(parsed.web_accessible_files);
                }
            }
            for css in script.css.iter_mut().flatten() {
                let file_name = pass.ctx.parse_output_css(css, &*pass.bundle)?;
                *css = file_name.clone();
                accessible.insert(file_name);
            }
        }
        result.manifest.content_scripts = scripts;

        if !accessible.is_empty() {
            let resources = result.manifest.web_accessible_resources.get_or_insert_with(Vec::new);
            for file in accessible {
                append_path(resources, file);
            }
        }
        Ok(())
    }

    /// Watch builds expose every script so hosts that skip manifest reloads keep working.
    fn parse_output_extra(&self, pass: &mut OutputPass<'_>, result: &mut ParseResult) -> Result<()> {
        if !pass.ctx.watch {
            return Ok(());
        }
        if let Some(resources) = result.manifest.web_accessible_resources.as_mut() {
            if !resources.is_empty() {
                resources.push(WebAccessibleResource::Path("*.js".to_string()));
            }
        }
        Ok(())
    }
}

fn append_path(resources: &mut Vec<WebAccessibleResource>, file: String) {
    if !resources.iter().any(|r| r.as_path() == Some(file.as_str())) {
        resources.push(WebAccessibleResource::Path(file));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{AssetInfo, ChunkInfo, OutputBundle};
    use crate::config::ResolvedConfig;
    use crate::options::WebExtensionOptions;
    use crate::parser::ManifestParser;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn setup(manifest: serde_json::Value, files: &[&str], watch: bool) -> (TempDir, ManifestParser) {
        let temp = TempDir::new().unwrap();
        for file in files {
            let path = temp.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        let mut config = ResolvedConfig::new(temp.path());
        config.watch = watch;
        let options = WebExtensionOptions::new(Manifest::from_value(manifest).unwrap());
        let parser = ManifestParser::new(&options, &config).unwrap();
        (temp, parser)
    }

    #[test]
    fn test_background_scripts_become_page() {
        let (temp, mut parser) = setup(
            json!({
                "manifest_version": 2,
                "background": { "scripts": ["bg1.js", "bg2.js"], "persistent": false }
            }),
            &[],
            false,
        );

        let result = parser.parse_input().unwrap();
        let background = result.manifest.background.as_ref().unwrap();
        assert!(background.scripts.is_none());
        assert_eq!(background.page.as_deref(), Some("background.html"));
        assert_eq!(background.extra["persistent"], false);

        let html_path = temp.path().join("background.html");
        assert_eq!(result.input_scripts.len(), 1);
        assert_eq!(result.input_scripts[0].output_file, "background");
        assert_eq!(result.input_scripts[0].input_file, html_path);

        let source = parser.store().get(&html_path.to_string_lossy()).unwrap();
        assert_eq!(source.matches(r#"<script type="module""#).count(), 2);
        let first = source.find(r#"src="bg1.js""#).unwrap();
        let second = source.find(r#"src="bg2.js""#).unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_html_files_order() {
        let (_temp, parser) = setup(
            json!({
                "manifest_version": 2,
                "background": { "page": "src/bg.html" },
                "browser_action": { "default_popup": "src/popup.html" },
                "options_ui": { "page": "src/options.html" },
                "devtools_page": "src/devtools.html",
                "chrome_url_overrides": { "newtab": "src/newtab.html" },
                "web_accessible_resources": ["src/frame.html", "*.html", "icons/16.png"]
            }),
            &[],
            false,
        );
        assert_eq!(
            parser.html_files(),
            vec![
                "src/bg.html",
                "src/popup.html",
                "src/options.html",
                "src/devtools.html",
                "src/newtab.html",
                "src/frame.html"
            ]
        );
    }

    #[test]
    fn test_input_was_respects_filter_and_wildcards() {
        let (_temp, mut parser) = setup(
            json!({
                "manifest_version": 2,
                "web_accessible_resources": ["src/inject.ts", "src/*.js", "icons/16.png"]
            }),
            &["src/inject.ts", "icons/16.png"],
            false,
        );
        let result = parser.parse_input().unwrap();
        let outputs: Vec<_> = result.input_scripts.iter().map(|s| s.output_file.as_str()).collect();
        assert_eq!(outputs, vec!["src/inject"]);
    }

    #[test]
    fn test_output_flat_allowlist_and_watch_wildcard() {
        let (temp, mut parser) = setup(
            json!({
                "manifest_version": 2,
                "content_scripts": [{
                    "matches": ["<all_urls>"],
                    "js": ["src/content.ts"],
                    "css": ["src/content.css"]
                }]
            }),
            &["src/content.ts", "src/content.css"],
            true,
        );
        parser.parse_input().unwrap();

        let mut bundle = OutputBundle::new();
        bundle.insert_chunk(ChunkInfo {
            file_name: "assets/js/content.111111.js".into(),
            facade_module_id: Some(temp.path().join("src/content.ts").to_string_lossy().into()),
            imports: vec!["assets/js/shared.222222.js".into()],
            ..Default::default()
        });
        bundle.insert_chunk(ChunkInfo {
            file_name: "assets/js/shared.222222.js".into(),
            imported_assets: ["assets/png/logo.333333.png".to_string()].into_iter().collect(),
            ..Default::default()
        });
        bundle.insert_asset(AssetInfo {
            file_name: "assets/css/content.444444.css".into(),
            name: Some("content.css".into()),
            original_file_names: vec!["src/content.css".into()],
            source: b"p{}".to_vec(),
        });

        let result = parser.parse_output(&mut bundle).unwrap();
        let script = &result.manifest.content_scripts.as_ref().unwrap()[0];
        let loader = script.js.as_ref().unwrap()[0].clone();
        assert!(loader.starts_with("assets/js/_cs."));
        assert_eq!(script.css.as_ref().unwrap()[0], "assets/css/content.444444.css");
        assert!(result.emit_files.iter().any(|f| f.file_name == loader));

        let war: Vec<_> = result.manifest.war_paths().collect();
        assert_eq!(
            war,
            vec![
                "assets/js/content.111111.js",
                "assets/js/shared.222222.js",
                "assets/png/logo.333333.png",
                "assets/css/content.444444.css",
                "*.js"
            ]
        );
    }

    #[test]
    fn test_output_was_appends_discovered_files() {
        let (temp, mut parser) = setup(
            json!({
                "manifest_version": 2,
                "web_accessible_resources": ["src/inject.ts", "icons/*.png"]
            }),
            &["src/inject.ts"],
            false,
        );
        parser.parse_input().unwrap();

        let mut bundle = OutputBundle::new();
        bundle.insert_chunk(ChunkInfo {
            file_name: "assets/js/inject.aaaaaa.js".into(),
            facade_module_id: Some(temp.path().join("src/inject.ts").to_string_lossy().into()),
            imported_css: ["assets/css/inject.bbbbbb.css".to_string()].into_iter().collect(),
            code: "console.log(import.meta.CURRENT_CHUNK_CSS_PATHS)".into(),
            ..Default::default()
        });

        let result = parser.parse_output(&mut bundle).unwrap();
        let war: Vec<_> = result.manifest.war_paths().collect();
        assert_eq!(war, vec!["src/inject.ts", "icons/*.png", "assets/css/inject.bbbbbb.css"]);

        // standalone chunk copied to the declared path with the token replaced
        let copied = result.emit_files.iter().find(|f| f.file_name == "src/inject.ts").unwrap();
        assert_eq!(copied.source, r#"console.log(["assets/css/inject.bbbbbb.css"])"#);
    }

    #[test]
    fn test_missing_css_asset_fails() {
        let (_temp, mut parser) = setup(
            json!({
                "manifest_version": 2,
                "content_scripts": [{ "matches": ["<all_urls>"], "css": ["src/theme.css"] }]
            }),
            &["src/theme.css"],
            false,
        );
        parser.parse_input().unwrap();
        let err = parser.parse_output(&mut OutputBundle::new()).unwrap_err();
        assert!(err.to_string().contains("src/theme.css"));
    }
}
