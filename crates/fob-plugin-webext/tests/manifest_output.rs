//! End-to-end manifest reconciliation against hand-built bundles.

use fob_plugin_webext::{
    AssetInfo, ChunkInfo, Manifest, ManifestParser, OutputBundle, ResolvedConfig, WebExtensionOptions,
    WebextError,
};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn project(files: &[&str]) -> TempDir {
    let temp = TempDir::new().unwrap();
    for file in files {
        let path = temp.path().join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "export {}").unwrap();
    }
    temp
}

fn parser(root: &Path, manifest: Value) -> ManifestParser {
    let options = WebExtensionOptions::new(Manifest::from_value(manifest).unwrap());
    ManifestParser::new(&options, &ResolvedConfig::new(root)).unwrap()
}

fn id(root: &Path, file: &str) -> Option<String> {
    Some(root.join(file).to_string_lossy().into_owned())
}

/// Every relative path the manifest declares.
fn declared_paths(manifest: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    for script in manifest["content_scripts"].as_array().into_iter().flatten() {
        for key in ["js", "css"] {
            for file in script[key].as_array().into_iter().flatten() {
                paths.push(file.as_str().unwrap().to_string());
            }
        }
    }
    for resource in manifest["web_accessible_resources"].as_array().into_iter().flatten() {
        match resource {
            Value::String(path) => paths.push(path.clone()),
            group => {
                for file in group["resources"].as_array().into_iter().flatten() {
                    paths.push(file.as_str().unwrap().to_string());
                }
            }
        }
    }
    if let Some(worker) = manifest["background"]["service_worker"].as_str() {
        paths.push(worker.to_string());
    }
    paths.retain(|p| !p.contains('*') && !p.starts_with("http"));
    paths
}

#[test]
fn content_script_with_stylesheet_import() {
    let root = project(&["src/content/main.ts", "src/content/style.css"]);
    let mut parser = parser(
        root.path(),
        json!({
            "manifest_version": 3,
            "name": "demo",
            "version": "1.0.0",
            "content_scripts": [{ "matches": ["*://*/*"], "js": ["src/content/main.ts"] }]
        }),
    );
    let input = parser.parse_input().unwrap();
    assert_eq!(input.input_scripts.len(), 1);

    let mut bundle = OutputBundle::new();
    bundle.insert_chunk(ChunkInfo {
        file_name: "assets/js/main.4f2a91.js".into(),
        name: "src/content/main".into(),
        facade_module_id: id(root.path(), "src/content/main.ts"),
        is_entry: true,
        imports: vec!["assets/js/shared.77aa01.js".into()],
        imported_css: ["assets/css/style.91be3c.css".to_string()].into_iter().collect(),
        code: "import './shared.77aa01.js';".into(),
        ..Default::default()
    });
    bundle.insert_chunk(ChunkInfo {
        file_name: "assets/js/shared.77aa01.js".into(),
        code: "export const x = 1;".into(),
        ..Default::default()
    });
    bundle.insert_asset(AssetInfo {
        file_name: "assets/css/style.91be3c.css".into(),
        name: Some("style.css".into()),
        original_file_names: vec!["src/content/style.css".into()],
        source: b"p{color:red}".to_vec(),
    });

    let output = parser.parse_output(&mut bundle).unwrap();
    let manifest: Value = serde_json::from_str(&output.manifest_file().unwrap().source).unwrap();

    let loader = manifest["content_scripts"][0]["js"][0].as_str().unwrap();
    assert!(loader.starts_with("assets/js/_cs."), "{loader}");
    assert!(output.emit_files.iter().any(|f| f.file_name == loader));

    let group = &manifest["web_accessible_resources"][0];
    assert_eq!(group["matches"], json!(["*://*/*"]));
    let resources: Vec<&str> = group["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(resources.contains(&"assets/css/style.91be3c.css"));
    assert!(resources.contains(&"assets/js/main.4f2a91.js"));
    assert!(resources.contains(&"assets/js/shared.77aa01.js"));

    // nothing the manifest names is left dangling
    for path in declared_paths(&manifest) {
        let emitted = output.emit_files.iter().any(|f| f.file_name == path);
        assert!(emitted || bundle.contains(&path), "dangling manifest path {path}");
    }
}

#[test]
fn declared_stylesheet_resolves_to_asset() {
    let root = project(&["src/content/main.ts", "src/content/theme.css"]);
    let mut parser = parser(
        root.path(),
        json!({
            "manifest_version": 3,
            "content_scripts": [{
                "matches": ["https://example.com/app/*"],
                "js": ["src/content/main.ts"],
                "css": ["src/content/theme.css"]
            }]
        }),
    );
    parser.parse_input().unwrap();

    let mut bundle = OutputBundle::new();
    bundle.insert_chunk(ChunkInfo {
        file_name: "assets/js/main.000001.js".into(),
        facade_module_id: id(root.path(), "src/content/main.ts"),
        ..Default::default()
    });
    bundle.insert_asset(AssetInfo {
        file_name: "assets/css/theme.000002.css".into(),
        name: Some("theme.css".into()),
        original_file_names: vec!["src/content/theme.css".into()],
        source: Vec::new(),
    });

    let output = parser.parse_output(&mut bundle).unwrap();
    let script = &output.manifest.content_scripts.as_ref().unwrap()[0];
    assert_eq!(script.css.as_ref().unwrap()[0], "assets/css/theme.000002.css");

    let group = output.manifest.war_groups().next().unwrap();
    assert_eq!(group.matches.as_ref().unwrap(), &vec!["https://example.com/*".to_string()]);
    assert!(group.resources.contains(&"assets/css/theme.000002.css".to_string()));
}

#[test]
fn legacy_background_scripts_become_page() {
    let root = project(&["bg1.js", "bg2.js"]);
    let mut parser = parser(
        root.path(),
        json!({
            "manifest_version": 2,
            "background": { "scripts": ["bg1.js", "bg2.js"] }
        }),
    );
    let input = parser.parse_input().unwrap();

    let background = input.manifest.background.as_ref().unwrap();
    assert!(background.scripts.is_none());
    let page = background.page.as_deref().unwrap();

    let entry = input
        .input_scripts
        .iter()
        .find(|script| script.output_file.ends_with(page.trim_end_matches(".html")))
        .unwrap();
    let source = parser.store().get(&entry.input_file.to_string_lossy()).unwrap();
    assert_eq!(source.matches(r#"<script type="module""#).count(), 2);
    let first = source.find("bg1.js").unwrap();
    let second = source.find("bg2.js").unwrap();
    assert!(first < second);
}

#[test]
fn missing_content_script_fails_before_bundling() {
    let root = project(&[]);
    let mut parser = parser(
        root.path(),
        json!({
            "manifest_version": 3,
            "content_scripts": [{ "matches": ["<all_urls>"], "js": ["missing.ts"] }]
        }),
    );
    let err = parser.parse_input().unwrap_err();
    assert!(matches!(err, WebextError::MissingSource { ref file } if file == "missing.ts"));
    assert_eq!(err.to_string(), "Failed to find source file for missing.ts");
}

#[test]
fn cyclic_chunks_terminate() {
    let root = project(&["src/content/a.ts"]);
    let mut parser = parser(
        root.path(),
        json!({
            "manifest_version": 2,
            "content_scripts": [{ "matches": ["<all_urls>"], "js": ["src/content/a.ts"] }]
        }),
    );
    parser.parse_input().unwrap();

    let mut bundle = OutputBundle::new();
    bundle.insert_chunk(ChunkInfo {
        file_name: "assets/js/a.js".into(),
        facade_module_id: id(root.path(), "src/content/a.ts"),
        imports: vec!["assets/js/b.js".into()],
        ..Default::default()
    });
    bundle.insert_chunk(ChunkInfo {
        file_name: "assets/js/b.js".into(),
        imports: vec!["assets/js/a.js".into()],
        dynamic_imports: vec!["assets/js/b.js".into()],
        ..Default::default()
    });

    let output = parser.parse_output(&mut bundle).unwrap();
    let allowlist: Vec<&str> = output.manifest.war_paths().collect();
    assert_eq!(
        allowlist.iter().filter(|p| **p == "assets/js/b.js").count(),
        1,
        "{allowlist:?}"
    );
}

#[test]
fn loader_names_are_stable_across_builds() {
    let root = project(&["src/content/main.ts"]);
    let manifest = json!({
        "manifest_version": 3,
        "content_scripts": [{ "matches": ["*://*/*"], "js": ["src/content/main.ts"] }]
    });

    let run = |code: &str| {
        let mut parser = parser(root.path(), manifest.clone());
        parser.parse_input().unwrap();
        let mut bundle = OutputBundle::new();
        bundle.insert_chunk(ChunkInfo {
            file_name: format!("assets/js/main.{}.js", &code[..6]),
            facade_module_id: id(root.path(), "src/content/main.ts"),
            imports: vec!["assets/js/dep.js".into()],
            code: code.into(),
            ..Default::default()
        });
        let output = parser.parse_output(&mut bundle).unwrap();
        output.manifest.content_scripts.unwrap()[0].js.as_ref().unwrap()[0].clone()
    };

    assert_eq!(run("aaaaaa first"), run("bbbbbb second"));
}
