use crate::config::WebextConfig;
use crate::error::{ConfigError, Result};
use figment::{
    Figment,
    providers::{Env, Format as _, Json, Serialized, Toml},
};
use std::path::{Path, PathBuf};

/// Config file names checked in the project root, in order.
pub const CONFIG_FILES: &[&str] = &["webext.config.json", "webext.config.toml"];

const ENV_PREFIX: &str = "FOB_WEBEXT_";

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub manifest: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub sourcemap: Option<bool>,
    pub minify: Option<bool>,
    pub port: Option<u16>,
}

impl WebextConfig {
    /// Load configuration for the project at `root`.
    ///
    /// An explicit `config_path` must exist; otherwise the first of
    /// [`CONFIG_FILES`] found in `root` is used, if any.
    pub fn load(root: &Path, config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(WebextConfig::default()));

        let config_file = match config_path {
            Some(path) => {
                let path = root.join(path);
                if !path.is_file() {
                    return Err(ConfigError::NotFound(path).into());
                }
                Some(path)
            }
            None => CONFIG_FILES
                .iter()
                .map(|name| root.join(name))
                .find(|path| path.is_file()),
        };

        if let Some(path) = &config_file {
            tracing::debug!(config = %path.display(), "loading config file");
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                _ => figment.merge(Json::file(path)),
            };
        }

        figment = figment.merge(
            Env::prefixed(ENV_PREFIX)
                .split("__")
                .map(|key| camel_case_path(key.as_str()).into()),
        );

        if let Some(manifest) = &overrides.manifest {
            figment = figment.merge(Serialized::default("manifest", manifest));
        }
        if let Some(out_dir) = &overrides.out_dir {
            figment = figment.merge(Serialized::default("outDir", out_dir));
        }
        if let Some(sourcemap) = overrides.sourcemap {
            figment = figment.merge(Serialized::default("sourcemap", sourcemap));
        }
        if let Some(minify) = overrides.minify {
            figment = figment.merge(Serialized::default("minify", minify));
        }
        if let Some(port) = overrides.port {
            figment = figment.merge(Serialized::default("server.port", port));
        }

        figment.extract().map_err(|e| {
            let field = if e.path.is_empty() {
                "configuration".to_string()
            } else {
                e.path.join(".")
            };
            ConfigError::InvalidValue {
                field,
                value: e.kind.to_string(),
                hint: "Check webext.config.json syntax and field types".to_string(),
            }
            .into()
        })
    }
}

/// `web_accessible_scripts.include` -> `webAccessibleScripts.include`.
fn camel_case_path(key: &str) -> String {
    key.split('.')
        .map(|segment| {
            let mut out = String::with_capacity(segment.len());
            let mut upper = false;
            for c in segment.chars() {
                if c == '_' {
                    upper = !out.is_empty();
                } else if upper {
                    out.extend(c.to_uppercase());
                    upper = false;
                } else {
                    out.push(c);
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::camel_case_path;

    #[test]
    fn test_camel_case_path() {
        assert_eq!(camel_case_path("out_dir"), "outDir");
        assert_eq!(camel_case_path("server.port"), "server.port");
        assert_eq!(
            camel_case_path("web_accessible_scripts.include"),
            "webAccessibleScripts.include"
        );
        assert_eq!(camel_case_path("minify"), "minify");
    }
}
