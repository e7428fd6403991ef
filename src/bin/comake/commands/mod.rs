//! Command implementations

pub mod build;
pub mod check;
pub mod clean;
pub mod order;
pub mod targets;
pub mod toolchain;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::cli::GlobalArgs;
use comake::builder::BuildContext;
use comake::core::buildfile::{Buildfile, BUILDFILE_NAME};
use comake::util::config::{global_config_path, load_config, project_config_path};
use comake::util::diagnostic::{suggestions, Diagnostic};
use comake::util::shell::{ColorChoice, Shell};
use comake::util::Config;

/// No build file in the working directory or any of its ancestors.
#[derive(Debug, Error)]
#[error("could not find `{}` in `{}` or any parent directory", BUILDFILE_NAME, .0.display())]
pub struct BuildfileNotFound(pub PathBuf);

impl BuildfileNotFound {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.to_string()).with_suggestion(suggestions::NO_BUILDFILE)
    }
}

/// A loaded build file with its merged configuration.
pub struct Project {
    pub buildfile: Buildfile,
    pub config: Config,
}

impl Project {
    /// Load `file`, or search upwards from the working directory.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let path = match file {
            Some(path) => path.to_path_buf(),
            None => {
                let cwd = std::env::current_dir().context("failed to get current directory")?;
                Buildfile::find(&cwd).ok_or(BuildfileNotFound(cwd))?
            }
        };

        let buildfile = Buildfile::load(&path)?;
        let config = load_config(
            global_config_path().as_deref(),
            &project_config_path(&buildfile.root),
        )?;

        Ok(Project { buildfile, config })
    }

    pub fn root(&self) -> &Path {
        &self.buildfile.root
    }

    /// Build context from configuration and the file's defaults.
    pub fn build_context(&self) -> BuildContext {
        BuildContext::from_config(self.root(), &self.config)
            .with_defaults(self.buildfile.defaults.clone())
    }
}

/// Human-mode shell for the global flags.
pub fn shell(global: &GlobalArgs) -> Shell {
    shell_with_format(global, false)
}

pub fn shell_with_format(global: &GlobalArgs, json: bool) -> Shell {
    let color = if global.no_color || !std::io::stderr().is_terminal() {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    Shell::from_flags(global.quiet, global.verbose, color, json)
}
