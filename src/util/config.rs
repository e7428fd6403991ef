//! Configuration file support for Comake.
//!
//! Comake reads two configuration files:
//! - Global: `<user config dir>/comake/config.toml` - User-wide defaults
//! - Project: `.comake/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, and the
//! `COMAKE_TARGET` / `COMAKE_PREFIX` environment variables take precedence
//! over both.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::toolchain::{host_triple, CrossToolchain, ToolchainContext};

/// Environment variable overriding the target triple.
pub const TARGET_ENV: &str = "COMAKE_TARGET";

/// Environment variable overriding the toolchain prefix.
pub const PREFIX_ENV: &str = "COMAKE_PREFIX";

/// Comake configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cross toolchain settings
    pub toolchain: ToolchainSettings,

    /// Build settings
    pub build: BuildConfig,
}

/// Cross toolchain settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSettings {
    /// Host triple (defaults to the machine comake runs on)
    pub host: Option<String>,

    /// Target triple for cross-compilation (e.g., i686-pc-mingw32)
    pub target: Option<String>,

    /// Install prefix of the cross toolchain (contains `bin/`)
    pub prefix: Option<PathBuf>,

    /// Explicit logical name to executable bindings
    pub tools: BTreeMap<String, PathBuf>,
}

/// Build settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Number of parallel jobs
    pub jobs: Option<usize>,

    /// Output directory, relative to the project root
    pub out_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration, falling back to defaults if the file doesn't exist.
    ///
    /// A file that exists but fails to parse is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.toolchain.host.is_some() {
            self.toolchain.host = other.toolchain.host;
        }
        if other.toolchain.target.is_some() {
            self.toolchain.target = other.toolchain.target;
        }
        if other.toolchain.prefix.is_some() {
            self.toolchain.prefix = other.toolchain.prefix;
        }
        self.toolchain.tools.extend(other.toolchain.tools);

        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.out_dir.is_some() {
            self.build.out_dir = other.build.out_dir;
        }
    }

    /// Apply environment overrides read through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(target) = var(TARGET_ENV).filter(|t| !t.is_empty()) {
            self.toolchain.target = Some(target);
        }
        if let Some(prefix) = var(PREFIX_ENV).filter(|p| !p.is_empty()) {
            self.toolchain.prefix = Some(PathBuf::from(prefix));
        }
    }

    /// The host/target pairing described by this configuration.
    pub fn toolchain_context(&self) -> ToolchainContext {
        let host = self.toolchain.host.clone().unwrap_or_else(host_triple);
        ToolchainContext {
            target: self.toolchain.target.clone().unwrap_or_else(|| host.clone()),
            host,
            prefix: self.toolchain.prefix.clone(),
        }
    }

    /// Explicit tool bindings.
    pub fn cross_toolchain(&self) -> CrossToolchain {
        self.toolchain
            .tools
            .iter()
            .fold(CrossToolchain::new(), |tc, (name, path)| {
                tc.with_binding(name.clone(), path.clone())
            })
    }
}

/// Load the global config, then the project config over it, then the
/// process environment over both.
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        config.merge(Config::load_or_default(global_path)?);
    }

    config.merge(Config::load_or_default(project_path)?);
    config.apply_env(|key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config directory.
pub fn global_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "comake").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config file path.
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".comake").join("config.toml")
}
