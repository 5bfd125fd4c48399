use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frameworks with a project template.
#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Vanilla,
    React,
    Preact,
    Solid,
    Svelte,
    Vue,
}

impl Framework {
    pub fn name(self) -> &'static str {
        match self {
            Framework::Vanilla => "vanilla",
            Framework::React => "react",
            Framework::Preact => "preact",
            Framework::Solid => "solid",
            Framework::Svelte => "svelte",
            Framework::Vue => "vue",
        }
    }

    /// Entry modules are written in JSX.
    pub fn uses_jsx(self) -> bool {
        matches!(self, Framework::React | Framework::Preact | Framework::Solid)
    }

    /// Template directory under `frameworks/`.
    pub fn template_dir(self, typescript: bool) -> String {
        if typescript {
            format!("{}-ts", self.name())
        } else {
            self.name().to_string()
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Package managers `create` can install with.
#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

impl PackageManager {
    pub const ALL: [PackageManager; 4] = [
        PackageManager::Npm,
        PackageManager::Pnpm,
        PackageManager::Yarn,
        PackageManager::Bun,
    ];

    pub fn command(self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Yarn => "yarn",
            PackageManager::Bun => "bun",
        }
    }

    /// The package manager named by an `npm_config_user_agent` value, npm otherwise.
    pub fn from_user_agent(user_agent: Option<&str>) -> Self {
        let Some(agent) = user_agent else {
            return PackageManager::Npm;
        };
        Self::ALL
            .into_iter()
            .find(|pm| agent.starts_with(pm.command()))
            .unwrap_or(PackageManager::Npm)
    }

    /// Detect from the environment of the invoking tool.
    pub fn detect() -> Self {
        Self::from_user_agent(std::env::var("npm_config_user_agent").ok().as_deref())
    }

    pub fn run_cmd(self, script: &str) -> String {
        format!("{} run {}", self.command(), script)
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}
