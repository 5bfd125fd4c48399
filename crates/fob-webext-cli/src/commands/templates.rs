//! Embedded project templates for `fob-webext create`.
//!
//! Templates live in layers under `templates/`:
//!
//! ```text
//! base/                   manifest, pages, background and content scripts
//! frameworks/<fw>[-ts]/   popup and options entries for one framework
//! tailwind/               top-level tailwind and postcss configuration
//! ```
//!
//! Layers are copied in that order. A later layer overwrites files of an
//! earlier one, except `package.json`, which is merged with the keys already
//! written taking precedence.

use crate::cli::Framework;
use crate::error::{CliError, Result};
use rust_embed::RustEmbed;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(RustEmbed)]
#[folder = "templates/"]
struct Templates;

const PACKAGE_JSON: &str = "package.json";
const MANIFEST_JSON: &str = "manifest.json";

/// What to render.
#[derive(Debug, Clone)]
pub struct TemplateOptions {
    /// Package name, the basename of the project directory.
    pub name: String,
    pub framework: Framework,
    pub typescript: bool,
    pub tailwind: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayerKind {
    Base,
    Framework,
    Tailwind,
}

struct Layer {
    kind: LayerKind,
    prefix: String,
}

impl TemplateOptions {
    fn layers(&self) -> Vec<Layer> {
        let mut layers = vec![
            Layer {
                kind: LayerKind::Base,
                prefix: "base/".to_string(),
            },
            Layer {
                kind: LayerKind::Framework,
                prefix: format!("frameworks/{}/", self.framework.template_dir(self.typescript)),
            },
        ];
        if self.tailwind {
            layers.push(Layer {
                kind: LayerKind::Tailwind,
                prefix: "tailwind/".to_string(),
            });
        }
        layers
    }

    /// Base and tailwind ship both flavours of a script; keep one.
    fn skips_flavour(&self, file: &str) -> bool {
        if self.typescript {
            file.ends_with(".js")
        } else {
            file.ends_with(".ts")
        }
    }
}

/// Render every layer into `dest`. Returns the written paths relative to it.
pub fn render(dest: &Path, options: &TemplateOptions) -> Result<Vec<PathBuf>> {
    let mut all: Vec<String> = Templates::iter().map(|path| path.into_owned()).collect();
    all.sort();

    let mut written = Vec::new();
    for layer in options.layers() {
        let files: Vec<&str> = all
            .iter()
            .filter_map(|path| path.strip_prefix(&layer.prefix))
            .collect();

        if files.is_empty() && layer.kind == LayerKind::Framework {
            return Err(CliError::InvalidArgument(format!(
                "Template not found: {}",
                options.framework.template_dir(options.typescript)
            )));
        }

        for relative in files {
            if layer.kind != LayerKind::Framework && options.skips_flavour(relative) {
                continue;
            }
            if layer.kind == LayerKind::Tailwind && relative.contains('/') {
                continue;
            }

            let target = dest.join(rename(relative));
            let Some(file) = Templates::get(&format!("{}{relative}", layer.prefix)) else {
                continue;
            };
            let content = transform(&target, &file.data, layer.kind, options)?;

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, content)?;
            tracing::debug!(file = %target.display(), "template file written");

            let relative = target.strip_prefix(dest).unwrap_or(&target).to_path_buf();
            if !written.contains(&relative) {
                written.push(relative);
            }
        }
    }
    Ok(written)
}

/// `_gitignore` -> `.gitignore`. Only the file name is renamed.
fn rename(relative: &str) -> PathBuf {
    let path = Path::new(relative);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match name.strip_prefix('_') {
        Some(rest) => format!(".{rest}"),
        None => name,
    };
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

fn transform(target: &Path, data: &[u8], kind: LayerKind, options: &TemplateOptions) -> Result<Vec<u8>> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if file_name == PACKAGE_JSON {
        let template: Value = serde_json::from_slice(data)?;
        let existing = match fs::read(target) {
            Ok(bytes) => Some(serde_json::from_slice::<Value>(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let merged = merge_package_json(template, existing, &options.name);
        return Ok(serde_json::to_string_pretty(&merged)?.into_bytes());
    }

    if kind == LayerKind::Base {
        if file_name == MANIFEST_JSON {
            let manifest: Value = serde_json::from_slice(data)?;
            let manifest = transform_manifest(manifest, options);
            return Ok(serde_json::to_string_pretty(&manifest)?.into_bytes());
        }
        if file_name.ends_with(".html") {
            let html = String::from_utf8_lossy(data);
            return Ok(transform_html(&html, options).into_bytes());
        }
    }
    Ok(data.to_vec())
}

/// Deep-merge `template` under `existing`, then stamp the project name into
/// `name` and `displayName` when the result has them.
pub fn merge_package_json(template: Value, existing: Option<Value>, project_name: &str) -> Value {
    let mut merged = template;
    if let Some(existing) = existing {
        deep_extend(&mut merged, existing);
    }
    if let Value::Object(map) = &mut merged {
        if is_truthy(map.get("name")) {
            map.insert("name".to_string(), Value::String(project_name.to_string()));
        }
        if is_truthy(map.get("displayName")) {
            map.insert("displayName".to_string(), Value::String(title_case(project_name)));
        }
    }
    merged
}

/// Objects merge recursively; any other value in `source` replaces the target's.
fn deep_extend(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                let nested = value.is_object() && target.get(&key).is_some_and(Value::is_object);
                if !nested {
                    target.insert(key, value);
                } else if let Some(slot) = target.get_mut(&key) {
                    deep_extend(slot, value);
                }
            }
        }
        (target, source) => *target = source,
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(_) => true,
    }
}

/// `my-web-ext` -> `My Web Ext`.
pub fn title_case(text: &str) -> String {
    text.split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Point the page's entry script at the flavour being generated. Only the
/// first `.js` is rewritten, once per step.
pub fn transform_html(html: &str, options: &TemplateOptions) -> String {
    let mut code = html.to_string();
    if options.framework.uses_jsx() {
        code = code.replacen(".js", ".jsx", 1);
    }
    if options.typescript {
        code = code.replacen(".js", ".ts", 1);
    }
    code
}

/// Name the extension after the project and, for TypeScript, point script
/// declarations at `.ts` sources.
pub fn transform_manifest(mut manifest: Value, options: &TemplateOptions) -> Value {
    if let Value::Object(map) = &mut manifest {
        if map.contains_key("name") {
            map.insert("name".to_string(), Value::String(title_case(&options.name)));
        }
        if options.typescript {
            rewrite_scripts(map);
        }
    }
    manifest
}

fn rewrite_scripts(map: &mut Map<String, Value>) {
    for value in map.values_mut() {
        match value {
            Value::String(s) if s.ends_with(".js") && !s.starts_with("http") => {
                s.truncate(s.len() - ".js".len());
                s.push_str(".ts");
            }
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::Object(inner) => rewrite_scripts(inner),
                        Value::String(s) if s.ends_with(".js") && !s.starts_with("http") => {
                            s.truncate(s.len() - ".js".len());
                            s.push_str(".ts");
                        }
                        _ => {}
                    }
                }
            }
            Value::Object(inner) => rewrite_scripts(inner),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(framework: Framework, typescript: bool) -> TemplateOptions {
        TemplateOptions {
            name: "my-ext".to_string(),
            framework,
            typescript,
            tailwind: false,
        }
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("my-ext"), "My Ext");
        assert_eq!(title_case("--web--extension"), "Web Extension");
        assert_eq!(title_case("single"), "Single");
    }

    #[test]
    fn test_rename_leading_underscore() {
        assert_eq!(rename("_gitignore"), PathBuf::from(".gitignore"));
        assert_eq!(rename("src/_env"), PathBuf::from("src/.env"));
        assert_eq!(rename("src/my_file.ts"), PathBuf::from("src/my_file.ts"));
    }

    #[test]
    fn test_merge_existing_keys_win() {
        let template = json!({
            "name": "framework",
            "dependencies": { "react": "^18.3.1" },
            "scripts": { "dev": "other" }
        });
        let existing = json!({
            "name": "web-extension",
            "displayName": "Web Extension",
            "scripts": { "dev": "fob-webext dev" }
        });
        let merged = merge_package_json(template, Some(existing), "my-ext");
        assert_eq!(merged["name"], "my-ext");
        assert_eq!(merged["displayName"], "My Ext");
        assert_eq!(merged["scripts"]["dev"], "fob-webext dev");
        assert_eq!(merged["dependencies"]["react"], "^18.3.1");
    }

    #[test]
    fn test_merge_does_not_add_missing_names() {
        let merged = merge_package_json(json!({ "private": true }), None, "my-ext");
        assert!(merged.get("name").is_none());
        assert!(merged.get("displayName").is_none());
    }

    #[test]
    fn test_transform_html() {
        let html = r#"<script type="module" src="./main.js"></script>"#;
        assert!(transform_html(html, &options(Framework::React, true)).contains("./main.tsx"));
        assert!(transform_html(html, &options(Framework::React, false)).contains("./main.jsx"));
        assert!(transform_html(html, &options(Framework::Vue, true)).contains("./main.ts\""));
        assert_eq!(transform_html(html, &options(Framework::Vanilla, false)), html);
    }

    #[test]
    fn test_transform_manifest() {
        let manifest = json!({
            "name": "Web Extension",
            "background": { "service_worker": "src/background/main.js" },
            "content_scripts": [{ "js": ["src/content/main.js"], "matches": ["*://*/*"] }],
            "action": { "default_popup": "src/popup/index.html" }
        });
        let out = transform_manifest(manifest, &options(Framework::Vanilla, true));
        assert_eq!(out["name"], "My Ext");
        assert_eq!(out["background"]["service_worker"], "src/background/main.ts");
        assert_eq!(out["content_scripts"][0]["js"][0], "src/content/main.ts");
        assert_eq!(out["action"]["default_popup"], "src/popup/index.html");
    }

    #[test]
    fn test_render_react_ts() {
        let temp = tempfile::tempdir().unwrap();
        let written = render(temp.path(), &options(Framework::React, true)).unwrap();

        assert!(written.contains(&PathBuf::from(".gitignore")));
        assert!(temp.path().join("src/popup/main.tsx").is_file());
        assert!(temp.path().join("src/background/main.ts").is_file());
        assert!(!temp.path().join("src/background/main.js").exists());

        let html = fs::read_to_string(temp.path().join("src/popup/index.html")).unwrap();
        assert!(html.contains("./main.tsx"));

        let pkg: Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join("package.json")).unwrap()).unwrap();
        assert_eq!(pkg["name"], "my-ext");
        assert!(pkg["dependencies"]["react"].is_string());
        assert_eq!(pkg["scripts"]["dev"], "fob-webext dev");
    }

    #[test]
    fn test_render_vanilla_js_with_tailwind() {
        let temp = tempfile::tempdir().unwrap();
        let opts = TemplateOptions {
            tailwind: true,
            ..options(Framework::Vanilla, false)
        };
        render(temp.path(), &opts).unwrap();

        assert!(temp.path().join("src/content/main.js").is_file());
        assert!(!temp.path().join("src/content/main.ts").exists());
        assert!(temp.path().join("tailwind.config.js").is_file());
        assert!(!temp.path().join("tailwind.config.ts").exists());

        let manifest: Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join("manifest.json")).unwrap()).unwrap();
        assert_eq!(manifest["content_scripts"][0]["js"][0], "src/content/main.js");

        let pkg: Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join("package.json")).unwrap()).unwrap();
        assert!(pkg["devDependencies"]["tailwindcss"].is_string());
    }

    #[test]
    fn test_every_framework_has_both_flavours() {
        for framework in [
            Framework::Vanilla,
            Framework::React,
            Framework::Preact,
            Framework::Solid,
            Framework::Svelte,
            Framework::Vue,
        ] {
            for typescript in [false, true] {
                let prefix = format!("frameworks/{}/", framework.template_dir(typescript));
                assert!(
                    Templates::iter().any(|path| path.starts_with(&prefix)),
                    "missing template {prefix}"
                );
            }
        }
    }
}
