//! Host adapter: runs rolldown with the extension plugin.
//!
//! The adapter owns the build lifecycle the plugin hooks into:
//!
//! 1. validate options and fill configuration defaults
//! 2. run the manifest input phase and register its entries
//! 3. bundle with [`WebExtPlugin`] attached
//! 4. write the output (production and watch builds only)

use crate::assets::AssetKind;
use crate::config::{ResolvedConfig, append_input_scripts, update_config};
use crate::error::{Result, WebextError};
use crate::manifest::ManifestVersion;
use crate::options::{BuildMode, WebExtensionOptions};
use crate::output::{WrittenFile, empty_dir, write_outputs};
use crate::parser::{InputScript, ManifestParser};
use crate::plugin::{PluginSettings, WebExtPlugin};
use crate::store::ModuleStore;
use indexmap::IndexMap;
use rolldown::{
    BundlerBuilder as RolldownBundlerBuilder, BundlerOptions, BundlerTransformOptions, Either,
    InputItem, OutputFormat, Platform, RawMinifyOptions, SourceMapType,
};
use rolldown_common::Output;
use rolldown_plugin::__inner::SharedPluginable;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Summary of a finished build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub out_dir: PathBuf,
    pub manifest_version: ManifestVersion,
    pub files: Vec<WrittenFile>,
    pub duration: Duration,
}

impl BuildReport {
    pub fn total_size(&self) -> usize {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Everything needed to run rolldown for one build.
pub struct PreparedBuild {
    pub options: BundlerOptions,
    pub plugin: Arc<WebExtPlugin>,
    /// Entry alias to module id, in registration order.
    pub inputs: IndexMap<String, String>,
}

/// A configured browser-extension build.
#[derive(Debug, Clone)]
pub struct WebExtension {
    options: Arc<WebExtensionOptions>,
    config: ResolvedConfig,
    mode: BuildMode,
    dev_origin: Option<String>,
}

impl WebExtension {
    /// Validate `options` and apply extension defaults to `config`.
    pub fn new(options: WebExtensionOptions, mut config: ResolvedConfig, mode: BuildMode) -> Result<Self> {
        options.validate()?;
        update_config(&mut config, &options)?;
        if mode == BuildMode::Watch {
            config.watch = true;
        }
        Ok(Self {
            options: Arc::new(options),
            config,
            mode,
            dev_origin: None,
        })
    }

    /// Resolve binary assets against a running dev server.
    pub fn with_dev_origin(mut self, origin: impl Into<String>) -> Self {
        self.dev_origin = Some(origin.into());
        self
    }

    pub fn options(&self) -> &WebExtensionOptions {
        &self.options
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    /// Run the input phase and assemble bundler options and plugin.
    pub fn prepare(&self) -> Result<PreparedBuild> {
        let store = ModuleStore::new();
        let mut parser = ManifestParser::with_store(&self.options, &self.config, store)?;
        let result = parser.parse_input()?;

        let mut settings = PluginSettings::new(self.config.root.clone(), self.mode)
            .with_minify(self.config.minify() && !self.mode.is_dev())
            .with_hashed_file_names(self.options.use_hashed_file_name);
        if let Some(origin) = &self.dev_origin {
            settings = settings.with_dev_origin(origin.clone());
        }

        let plugin = WebExtPlugin::new(Arc::clone(&self.options), parser, settings);
        plugin.queue_emit(result.emit_files);

        // stylesheets declared directly in the manifest never reach the bundler
        let (stylesheets, scripts): (Vec<InputScript>, Vec<InputScript>) = result
            .input_scripts
            .into_iter()
            .partition(|script| AssetKind::of(&script.input_file.to_string_lossy()) == Some(AssetKind::Style));
        for stylesheet in &stylesheets {
            let source = std::fs::read_to_string(&stylesheet.input_file)
                .map_err(|e| WebextError::io(&stylesheet.input_file, e))?;
            plugin.register_stylesheet(&stylesheet.input_file, &source)?;
        }

        let inputs = append_input_scripts(&scripts, &self.config.input);
        debug!(entries = inputs.len(), stylesheets = stylesheets.len(), "bundler inputs");

        Ok(PreparedBuild {
            options: self.bundler_options(&inputs),
            plugin: Arc::new(plugin),
            inputs,
        })
    }

    /// Rolldown options for the given entry map.
    pub fn bundler_options(&self, inputs: &IndexMap<String, String>) -> BundlerOptions {
        let names = &self.config.file_names;
        let minify = self.config.minify() && !self.mode.is_dev();

        BundlerOptions {
            input: Some(
                inputs
                    .iter()
                    .map(|(name, import)| InputItem {
                        name: Some(name.clone()),
                        import: import.clone(),
                    })
                    .collect(),
            ),
            cwd: Some(self.config.root.clone()),
            format: Some(OutputFormat::Esm),
            platform: Some(Platform::Browser),
            sourcemap: self.config.sourcemap.then_some(SourceMapType::File),
            minify: minify.then(|| RawMinifyOptions::from(true)),
            entry_filenames: names.entry.clone().map(Into::into),
            chunk_filenames: names.chunk.clone().map(Into::into),
            asset_filenames: names.asset.clone().map(Into::into),
            transform: self.config.targets.clone().map(|targets| BundlerTransformOptions {
                target: Some(Either::Right(targets)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Bundle in memory. The returned outputs include every emitted file.
    pub async fn bundle(&self) -> Result<Vec<Output>> {
        let prepared = self.prepare()?;
        let plugins = vec![prepared.plugin as SharedPluginable];

        let mut bundler = RolldownBundlerBuilder::default()
            .with_options(prepared.options)
            .with_plugins(plugins)
            .build()
            .map_err(|e| WebextError::Bundler(format!("{e:?}")))?;

        let output = bundler
            .generate()
            .await
            .map_err(|e| WebextError::Bundler(format!("{e:?}")))?;

        Ok(output.assets)
    }

    /// Bundle and write the extension to the out dir.
    pub async fn build(&self) -> Result<BuildReport> {
        let started = Instant::now();
        let manifest_version = self.options.manifest()?.dialect_version()?;
        let outputs = self.bundle().await?;

        let out_dir = self.config.out_dir();
        if self.config.empty_out_dir() {
            empty_dir(&out_dir)?;
        }
        if let Some(public_dir) = &self.config.public_dir {
            crate::dev::copy_dir(public_dir, &out_dir).await?;
        }
        let files = write_outputs(&outputs, &out_dir)?;

        let report = BuildReport {
            out_dir,
            manifest_version,
            files,
            duration: started.elapsed(),
        };
        info!(
            files = report.files.len(),
            bytes = report.total_size(),
            out_dir = %report.out_dir.display(),
            "extension written"
        );
        Ok(report)
    }
}
