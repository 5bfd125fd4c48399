//! Full builds through rolldown.

use fob_plugin_webext::{BuildMode, Manifest, ManifestVersion, ResolvedConfig, WebExtension, WebExtensionOptions};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, file: &str, content: &str) {
    let path = root.join(file);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

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
        // V2 lists bare paths, V3 lists groups
        if let Some(file) = resource.as_str() {
            if !file.contains('*') {
                paths.push(file.to_string());
            }
        }
        for file in resource["resources"].as_array().into_iter().flatten() {
            paths.push(file.as_str().unwrap().to_string());
        }
    }
    for key in ["service_worker", "page"] {
        if let Some(file) = manifest["background"][key].as_str() {
            paths.push(file.to_string());
        }
    }
    for action in ["action", "browser_action"] {
        if let Some(popup) = manifest[action]["default_popup"].as_str() {
            paths.push(popup.to_string());
        }
    }
    paths
}

fn read_manifest(out_dir: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(out_dir.join("manifest.json")).unwrap()).unwrap()
}

async fn build(root: &Path, manifest: Value, hashed: bool) -> fob_plugin_webext::BuildReport {
    let options = WebExtensionOptions::new(Manifest::from_value(manifest).unwrap()).with_hashed_file_name(hashed);
    WebExtension::new(options, ResolvedConfig::new(root), BuildMode::Build)
        .unwrap()
        .build()
        .await
        .unwrap()
}

/// Three content scripts whose stylesheets share a basename or a suffix.
fn stylesheet_fixture(root: &Path) -> Value {
    write(root, "src/content/main.ts", "console.log('content');\n");
    write(root, "src/a/style.css", ".alpha { color: red; }\n");
    write(root, "src/b/style.css", ".beta { color: red; }\n");
    write(root, "src/c/mystyle.css", ".gamma { color: red; }\n");

    let script = |css: &str| json!({ "matches": ["*://*/*"], "js": ["src/content/main.ts"], "css": [css] });
    json!({
        "manifest_version": 3,
        "name": "styles",
        "version": "1.0.0",
        "content_scripts": [
            script("src/a/style.css"),
            script("src/b/style.css"),
            script("src/c/mystyle.css")
        ]
    })
}

fn assert_each_script_gets_its_stylesheet(out_dir: &Path) {
    let written = read_manifest(out_dir);
    let css: Vec<String> = written["content_scripts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|script| script["css"][0].as_str().unwrap().to_string())
        .collect();
    assert_eq!(css.len(), 3);

    for (file, class) in css.iter().zip([".alpha", ".beta", ".gamma"]) {
        let content = fs::read_to_string(out_dir.join(file)).unwrap();
        assert!(content.contains(class), "{file} should contain {class}: {content}");
    }
    for path in declared_paths(&written) {
        assert!(out_dir.join(&path).exists(), "dangling manifest path {path}");
    }
}

#[tokio::test]
async fn builds_v3_extension_without_dangling_paths() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(
        root,
        "src/content/main.ts",
        "import './style.css';\nimport { greet } from './greet';\ngreet();\n",
    );
    write(root, "src/content/greet.ts", "export function greet() { console.log('hi'); }\n");
    write(root, "src/content/style.css", "body { outline: 1px solid red; }\n");
    write(root, "src/background.ts", "console.log('worker');\n");
    write(
        root,
        "src/popup/index.html",
        "<html><head><script type=\"module\" src=\"./main.ts\"></script></head><body></body></html>",
    );
    write(root, "src/popup/main.ts", "document.body.textContent = 'popup';\n");
    write(root, "public/icons/16.png", "png");

    let manifest = Manifest::from_value(json!({
        "manifest_version": 3,
        "name": "full",
        "version": "1.0.0",
        "action": { "default_popup": "src/popup/index.html" },
        "background": { "service_worker": "src/background.ts" },
        "content_scripts": [{ "matches": ["*://*/*"], "js": ["src/content/main.ts"] }]
    }))
    .unwrap();
    let extension = WebExtension::new(
        WebExtensionOptions::new(manifest),
        ResolvedConfig::new(root),
        BuildMode::Build,
    )
    .unwrap();

    let report = extension.build().await.unwrap();
    assert_eq!(report.manifest_version, ManifestVersion::V3);
    assert!(report.out_dir.join("icons/16.png").exists());

    let written: Value =
        serde_json::from_str(&fs::read_to_string(report.out_dir.join("manifest.json")).unwrap()).unwrap();
    assert_eq!(written["background"]["service_worker"], "assets/js/_sw.js");
    assert_eq!(written["background"]["type"], "module");

    for path in declared_paths(&written) {
        assert!(report.out_dir.join(&path).exists(), "dangling manifest path {path}");
    }

    let group = &written["web_accessible_resources"][0];
    assert_eq!(group["matches"], json!(["*://*/*"]));
    let resources = group["resources"].as_array().unwrap();
    assert!(
        resources.iter().any(|r| r.as_str().unwrap().ends_with(".css")),
        "{resources:?}"
    );

    let popup = fs::read_to_string(report.out_dir.join("src/popup/index.html")).unwrap();
    assert!(!popup.contains("main.ts"));
    assert!(popup.contains(r#"<script type="module" src="/assets/js/"#));
}

#[tokio::test]
async fn missing_declared_script_fails_before_bundling() {
    let temp = TempDir::new().unwrap();
    let manifest = Manifest::from_value(json!({
        "manifest_version": 3,
        "content_scripts": [{ "matches": ["*://*/*"], "js": ["missing.ts"] }]
    }))
    .unwrap();
    let extension = WebExtension::new(
        WebExtensionOptions::new(manifest),
        ResolvedConfig::new(temp.path()),
        BuildMode::Build,
    )
    .unwrap();

    let err = extension.build().await.unwrap_err();
    assert!(err.to_string().contains("missing.ts"));
    assert!(!temp.path().join(".extension/manifest.json").exists());
}

#[tokio::test]
async fn builds_v2_extension_with_background_page_and_flat_allowlist() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "src/background.ts", "console.log('background');\n");
    write(root, "src/content/main.ts", "import { greet } from './greet';\ngreet();\n");
    write(root, "src/content/greet.ts", "export function greet() { console.log('hi'); }\n");
    write(root, "src/content/style.css", ".content { color: red; }\n");
    write(root, "src/inject.ts", "console.log('injected');\n");

    let report = build(
        root,
        json!({
            "manifest_version": 2,
            "name": "legacy",
            "version": "1.0.0",
            "background": { "scripts": ["src/background.ts"] },
            "content_scripts": [{
                "matches": ["*://*/*"],
                "js": ["src/content/main.ts"],
                "css": ["src/content/style.css"]
            }],
            "web_accessible_resources": ["src/inject.ts", "*.png"]
        }),
        true,
    )
    .await;
    assert_eq!(report.manifest_version, ManifestVersion::V2);

    let written = read_manifest(&report.out_dir);
    assert_eq!(written["background"]["page"], "background.html");
    assert!(written["background"].get("scripts").is_none());

    let page = fs::read_to_string(report.out_dir.join("background.html")).unwrap();
    assert!(!page.contains("background.ts"));
    assert!(page.contains(r#"<script type="module" src="/assets/js/"#));

    let resources: Vec<&str> = written["web_accessible_resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r.as_str().expect("V2 resources are plain paths"))
        .collect();
    // the declared script is replaced in place by its compiled output
    assert!(resources[0].ends_with(".js") && resources[0] != "src/inject.ts", "{resources:?}");
    assert!(resources.contains(&"*.png"));
    let css = written["content_scripts"][0]["css"][0].as_str().unwrap();
    assert!(css.starts_with("assets/css/style."));
    assert!(resources.contains(&css));

    for path in declared_paths(&written) {
        assert!(report.out_dir.join(&path).exists(), "dangling manifest path {path}");
    }
}

#[tokio::test]
async fn stylesheets_with_shared_names_keep_their_own_assets() {
    let temp = TempDir::new().unwrap();
    let manifest = stylesheet_fixture(temp.path());
    let report = build(temp.path(), manifest, true).await;
    assert_each_script_gets_its_stylesheet(&report.out_dir);
}

#[tokio::test]
async fn unhashed_stylesheets_with_shared_names_are_all_written() {
    let temp = TempDir::new().unwrap();
    let manifest = stylesheet_fixture(temp.path());
    let report = build(temp.path(), manifest, false).await;
    assert_each_script_gets_its_stylesheet(&report.out_dir);

    let written = read_manifest(&report.out_dir);
    assert_eq!(written["content_scripts"][0]["css"][0], "assets/css/style.css");
    assert_eq!(written["content_scripts"][1]["css"][0], "assets/css/style-1.css");
    assert_eq!(written["content_scripts"][2]["css"][0], "assets/css/mystyle.css");
}

#[tokio::test]
async fn public_stylesheet_is_copied_and_keeps_its_path() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "src/content/main.ts", "console.log('content');\n");
    write(root, "public/styles/vendor.css", ".vendor { color: red; }\n");

    let report = build(
        root,
        json!({
            "manifest_version": 3,
            "name": "public-css",
            "version": "1.0.0",
            "content_scripts": [{
                "matches": ["*://*/*"],
                "js": ["src/content/main.ts"],
                "css": ["styles/vendor.css"]
            }]
        }),
        true,
    )
    .await;

    let written = read_manifest(&report.out_dir);
    assert_eq!(written["content_scripts"][0]["css"][0], "styles/vendor.css");
    let copied = fs::read_to_string(report.out_dir.join("styles/vendor.css")).unwrap();
    assert!(copied.contains(".vendor"));
}
