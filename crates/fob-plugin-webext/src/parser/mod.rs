//! Manifest parser and build orchestrator.
//!
//! The parser runs in two phases around the bundler:
//!
//! 1. [`ManifestParser::parse_input`] discovers every file the manifest
//!    references and returns them as entry points.
//! 2. [`ManifestParser::parse_output`] takes the finished bundle, resolves each
//!    declared file to its emitted chunk or asset, synthesizes loader shims,
//!    widens the web-accessible allowlist, and emits `manifest.json` last.
//!
//! Dialect differences live behind [`Dialect`], selected once from
//! `manifest_version`.

mod dialect;
mod v2;
mod v3;

pub use dialect::{Dialect, dialect_for};
pub use v2::ManifestV2;
pub use v3::ManifestV3;

use crate::bundle::OutputBundle;
use crate::config::ResolvedConfig;
use crate::error::{Result, WebextError};
use crate::files::{FileResolver, is_external, sanitize};
use crate::loader::{cs_loader, was_loader};
use crate::manifest::{Manifest, ManifestVersion};
use crate::options::{ScriptFilter, WebExtensionOptions};
use crate::store::ModuleStore;
use crate::walker::{ChunkWalker, substitute_css_paths};
use indexmap::IndexSet;
use std::path::PathBuf;
use tracing::debug;

/// File name of the emitted manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

/// An entry point to register with the bundler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputScript {
    /// Logical output name, used as the entry alias.
    pub output_file: String,
    /// Absolute source path or virtual module id.
    pub input_file: PathBuf,
}

impl InputScript {
    pub fn new(output_file: impl Into<String>, input_file: impl Into<PathBuf>) -> Self {
        Self {
            output_file: output_file.into(),
            input_file: input_file.into(),
        }
    }
}

/// A synthesized file to write next to the bundle output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitFile {
    pub file_name: String,
    pub source: String,
}

/// Shared record threaded through the steps of one phase.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub input_scripts: Vec<InputScript>,
    pub emit_files: Vec<EmitFile>,
    pub manifest: Manifest,
}

impl ParseResult {
    fn new(manifest: Manifest) -> Self {
        Self {
            manifest,
            ..Default::default()
        }
    }

    pub fn push_input(&mut self, output_file: impl Into<String>, input_file: impl Into<PathBuf>) {
        self.input_scripts.push(InputScript::new(output_file, input_file));
    }

    pub fn emit(&mut self, file_name: impl Into<String>, source: impl Into<String>) {
        self.emit_files.push(EmitFile {
            file_name: file_name.into(),
            source: source.into(),
        });
    }

    /// The emitted `manifest.json`, if the output phase produced one.
    pub fn manifest_file(&self) -> Option<&EmitFile> {
        self.emit_files.iter().rev().find(|f| f.file_name == MANIFEST_FILE)
    }
}

/// What a declared script resolved to after bundling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedScript {
    /// Replacement path for the manifest; `None` keeps the declared path.
    pub file_name: Option<String>,
    /// Files that must become web accessible for the script to load.
    pub web_accessible_files: IndexSet<String>,
}

/// Read-only state shared by every step.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub resolver: FileResolver,
    pub filter: ScriptFilter,
    pub use_dynamic_url: bool,
    pub watch: bool,
    pub store: ModuleStore,
}

impl ParseContext {
    /// Register `file` as an entry if it exists in the source tree.
    ///
    /// A declaration that is neither a URL nor found in the source or public
    /// tree is an error: it would ship a dangling manifest path.
    pub fn push_required(&self, file: &str, result: &mut ParseResult) -> Result<()> {
        if is_external(file) {
            return Ok(());
        }
        let resolved = self.resolver.resolve(file, true);
        match (resolved.input_file, resolved.public_file) {
            (Some(input), _) => {
                result.push_input(resolved.output_file, input);
                Ok(())
            }
            (None, Some(_)) => Ok(()),
            (None, None) => Err(WebextError::MissingSource {
                file: file.to_string(),
            }),
        }
    }

    /// Register every HTML page.
    pub fn parse_input_html(&self, html_files: &[String], result: &mut ParseResult) -> Result<()> {
        for html in html_files {
            self.push_required(html, result)?;
        }
        Ok(())
    }

    /// Register every content-script JS and CSS file.
    pub fn parse_input_cs(&self, result: &mut ParseResult) -> Result<()> {
        let files: Vec<String> = result
            .manifest
            .content_scripts
            .iter()
            .flatten()
            .flat_map(|script| script.files().cloned())
            .collect();

        for file in &files {
            self.push_required(file, result)?;
        }
        Ok(())
    }

    /// Register a web-accessible resource when it is a compilable script.
    pub fn push_web_accessible(&self, resource: &str, result: &mut ParseResult) {
        if resource.contains('*') {
            return;
        }
        let resolved = self.resolver.resolve(resource, true);
        if let Some(input) = resolved.input_file {
            if self.filter.matches(&input.to_string_lossy()) {
                result.push_input(resolved.output_file, input);
            }
        }
    }

    /// Resolve the emitted stylesheet for a declared CSS file.
    ///
    /// Stylesheets that live only in the public directory are copied verbatim
    /// and keep their declared path.
    pub fn parse_output_css(&self, file: &str, bundle: &OutputBundle) -> Result<String> {
        let resolved = self.resolver.resolve(file, true);
        if resolved.input_file.is_none() && resolved.public_file.is_some() {
            return Ok(sanitize([file]).path);
        }
        bundle
            .find_css_asset(file)
            .map(|asset| asset.file_name.clone())
            .ok_or_else(|| WebextError::MissingCssAsset {
                file: file.to_string(),
            })
    }
}

/// Mutable state of the output phase.
pub struct OutputPass<'a> {
    pub ctx: &'a ParseContext,
    pub walker: &'a mut ChunkWalker,
    pub bundle: &'a mut OutputBundle,
}

impl OutputPass<'_> {
    /// Resolve a content-script JS file to its loader and dependencies.
    ///
    /// Returns `None` when the file is not part of the build (an external URL).
    pub fn parse_output_js(
        &mut self,
        file: &str,
        result: &mut ParseResult,
    ) -> Result<Option<ParsedScript>> {
        if is_external(file) {
            return Ok(None);
        }
        let resolved = self.ctx.resolver.resolve(file, true);
        let Some(input_file) = resolved.input_file else {
            // public files are copied as-is and only need allowlisting
            return Ok(resolved.public_file.map(|_| ParsedScript {
                file_name: None,
                web_accessible_files: IndexSet::from([sanitize([file]).path]),
            }));
        };

        let chunk = self
            .bundle
            .find_script_chunk(&input_file.to_string_lossy())
            .ok_or_else(|| WebextError::MissingChunk {
                file: file.to_string(),
            })?;

        let loader = cs_loader(&sanitize([file]).path, chunk);
        let chunk_file = chunk.file_name.clone();
        let include_self = loader.source.is_some();
        if let Some(source) = loader.source {
            debug!(file, loader = %loader.file_name, "content script loader");
            result.emit(loader.file_name.clone(), source);
        }

        let web_accessible_files = self.collect(&chunk_file, include_self);
        Ok(Some(ParsedScript {
            file_name: Some(loader.file_name),
            web_accessible_files,
        }))
    }

    /// Resolve a web-accessible script; the loader is always emitted.
    pub fn parse_output_wa_script(
        &mut self,
        file: &str,
        result: &mut ParseResult,
    ) -> Result<ParsedScript> {
        let resolved = self.ctx.resolver.resolve(file, true);
        let id = resolved
            .input_file
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.to_string());

        let (chunk_file, standalone) = self
            .bundle
            .find_script_chunk(&id)
            .map(|chunk| (chunk.file_name.clone(), chunk.is_standalone()))
            .ok_or_else(|| WebextError::MissingChunk {
                file: file.to_string(),
            })?;

        // behind a loader the chunk itself must be reachable too
        let web_accessible_files = self.collect(&chunk_file, !standalone);

        let chunk = self
            .bundle
            .find_script_chunk(&chunk_file)
            .ok_or_else(|| WebextError::MissingChunk {
                file: file.to_string(),
            })?;
        let loader = was_loader(&sanitize([file]).path, chunk);
        if let Some(source) = loader.source {
            debug!(file, loader = %loader.file_name, "web accessible loader");
            result.emit(loader.file_name.clone(), source);
        }

        Ok(ParsedScript {
            file_name: Some(loader.file_name),
            web_accessible_files,
        })
    }

    /// Walk `chunk_file` and substitute its CSS-path token.
    fn collect(&mut self, chunk_file: &str, include_self: bool) -> IndexSet<String> {
        let metadata = self.walker.walk(chunk_file, &*self.bundle, include_self);
        if let Some(chunk) = self.bundle.find_script_chunk_mut(chunk_file) {
            if let Some(code) = substitute_css_paths(&chunk.code, &metadata) {
                chunk.code = code;
            }
        }
        metadata.web_accessible_files()
    }

    /// A declared resource that the input phase did not register is left alone.
    pub fn is_compiled(&self, file: &str) -> bool {
        !file.contains('*')
            && self.ctx.filter.matches(file)
            && self.ctx.resolver.resolve(file, true).input_file.is_some()
    }
}

/// Drives both phases for one build.
pub struct ManifestParser {
    manifest: Manifest,
    dialect: Box<dyn Dialect>,
    ctx: ParseContext,
    walker: ChunkWalker,
}

impl std::fmt::Debug for ManifestParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestParser")
            .field("version", &self.dialect.version())
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl ManifestParser {
    /// Build a parser for the configured manifest.
    ///
    /// The manifest is copied; the caller's options are never mutated.
    pub fn new(options: &WebExtensionOptions, config: &ResolvedConfig) -> Result<Self> {
        Self::with_store(options, config, ModuleStore::new())
    }

    /// Like [`new`](Self::new) with a store shared with the plugin hooks.
    pub fn with_store(
        options: &WebExtensionOptions,
        config: &ResolvedConfig,
        store: ModuleStore,
    ) -> Result<Self> {
        let mut manifest = options.manifest()?.clone();
        let dialect = dialect_for(manifest.dialect_version()?);
        manifest.apply_date_version(chrono::Local::now().date_naive());

        let ctx = ParseContext {
            resolver: FileResolver::new(config.root.clone(), config.public_dir.clone()),
            filter: ScriptFilter::new(&options.web_accessible_scripts)?,
            use_dynamic_url: options.use_dynamic_url,
            watch: config.watch,
            store,
        };

        Ok(Self {
            manifest,
            dialect,
            ctx,
            walker: ChunkWalker::new(),
        })
    }

    pub fn version(&self) -> ManifestVersion {
        self.dialect.version()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn context(&self) -> &ParseContext {
        &self.ctx
    }

    pub fn store(&self) -> &ModuleStore {
        &self.ctx.store
    }

    /// HTML pages declared by the current manifest.
    pub fn html_files(&self) -> Vec<String> {
        self.dialect.html_files(&self.manifest)
    }

    /// Discover entry points. Runs before the bundler.
    pub fn parse_input(&mut self) -> Result<ParseResult> {
        let mut result = ParseResult::new(std::mem::take(&mut self.manifest));
        let outcome = self.run_input(&mut result);
        self.manifest = result.manifest.clone();
        outcome?;

        debug!(
            entries = result.input_scripts.len(),
            emitted = result.emit_files.len(),
            "parsed manifest input"
        );
        Ok(result)
    }

    fn run_input(&self, result: &mut ParseResult) -> Result<()> {
        let html_files = self.dialect.html_files(&result.manifest);
        self.ctx.parse_input_html(&html_files, result)?;
        self.ctx.parse_input_cs(result)?;
        self.dialect.parse_input_was(&self.ctx, result);
        self.dialect.parse_input_extra(&self.ctx, result)
    }

    /// Rewrite the manifest against the finished bundle. Runs after the bundler.
    ///
    /// Chunk code in `bundle` is updated in place when it carries the CSS-path
    /// token. The last emitted file is always `manifest.json`.
    pub fn parse_output(&mut self, bundle: &mut OutputBundle) -> Result<ParseResult> {
        let mut result = ParseResult::new(std::mem::take(&mut self.manifest));
        let outcome = self.run_output(bundle, &mut result);
        self.manifest = result.manifest.clone();
        outcome?;

        let manifest_json = result.manifest.to_json_pretty()?;
        result.emit(MANIFEST_FILE, manifest_json);

        debug!(emitted = result.emit_files.len(), "parsed manifest output");
        Ok(result)
    }

    fn run_output(&mut self, bundle: &mut OutputBundle, result: &mut ParseResult) -> Result<()> {
        let mut pass = OutputPass {
            ctx: &self.ctx,
            walker: &mut self.walker,
            bundle,
        };
        self.dialect.parse_output_was(&mut pass, result)?;
        self.dialect.parse_output_cs(&mut pass, result)?;
        self.dialect.parse_output_extra(&mut pass, result)
    }
}
