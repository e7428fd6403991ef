//! Target graph evaluation.
//!
//! This module turns a resolved [`TargetGraph`](crate::graph::TargetGraph)
//! into artifacts: it resolves cross tools, renders each target's step,
//! schedules independent subtrees on a worker pool and records one result per
//! target.

pub mod context;
pub mod driver;
pub mod events;
pub mod executor;
pub mod fingerprint;
pub mod record;
pub mod scheduler;
pub mod toolchain;

pub use context::BuildContext;
pub use driver::{DriverPipeline, DriverStages, KernelImage};
pub use events::BuildEvent;
pub use executor::{PreparedStep, ToolExecutor};
pub use record::{Artifact, BuildRecord, BuildState};
pub use scheduler::{Evaluation, EvaluationReport, TargetFailure};
pub use toolchain::{CommandSpec, CrossToolchain, ToolLookup, ToolchainContext};

use thiserror::Error;

use crate::core::options::OptionError;
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error raised while building a single target.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no `{tool}` in the toolchain for {context}")]
    ToolchainNotFound { tool: String, context: String },

    #[error("`{target}` needs `{dependency}`, which has not been built")]
    UnresolvedDependency { target: String, dependency: String },

    #[error("`{target}` failed ({})", exit_description(.status))]
    ToolExecution {
        target: String,
        /// Exact command line that was run.
        command: String,
        /// Exit code, if the process exited normally.
        status: Option<i32>,
        /// Captured stderr followed by stdout.
        diagnostics: String,
    },

    #[error("failed to spawn `{command}` for `{target}`: {source}")]
    Spawn {
        target: String,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{target}` exited successfully but did not produce {}", .path.display())]
    MissingOutput {
        target: String,
        command: String,
        path: std::path::PathBuf,
    },

    #[error("script for `{target}` failed: {message}")]
    Script { target: String, message: String },

    #[error("failed to fingerprint `{target}`: {message}")]
    Fingerprint { target: String, message: String },

    #[error(transparent)]
    InvalidOption(#[from] OptionError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_description(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl BuildError {
    /// Wrap an I/O error with a description of what was being done.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BuildError::Io {
            context: context.into(),
            source,
        }
    }

    /// The command line involved in the failure, if any.
    pub fn command(&self) -> Option<&str> {
        match self {
            BuildError::ToolExecution { command, .. }
            | BuildError::Spawn { command, .. }
            | BuildError::MissingOutput { command, .. } => Some(command),
            _ => None,
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(self.to_string());

        match self {
            BuildError::ToolchainNotFound { tool, .. } => {
                diag = diag
                    .with_suggestion(format!(
                        "Bind it explicitly under [toolchain.tools], e.g. {} = \"/path/to/{}\"",
                        tool, tool
                    ))
                    .with_suggestion(suggestions::TOOL_NOT_FOUND);
            }
            BuildError::ToolExecution {
                command,
                diagnostics,
                ..
            } => {
                diag = diag.with_context(format!("command: {}", command));
                for line in diagnostics.lines().filter(|l| !l.trim().is_empty()) {
                    diag = diag.with_context(line.to_string());
                }
                diag = diag.with_suggestion(suggestions::BUILD_FAILED);
            }
            BuildError::MissingOutput { command, .. } => {
                diag = diag
                    .with_context(format!("command: {}", command))
                    .with_suggestion("Make the command write its output to the path given as {output}");
            }
            BuildError::Spawn { command, .. } => {
                diag = diag
                    .with_context(format!("command: {}", command))
                    .with_suggestion("Check that the toolchain is installed and on PATH");
            }
            _ => {}
        }

        diag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_execution_diagnostic() {
        let err = BuildError::ToolExecution {
            target: "linux.sys".into(),
            command: "gcc -o linux.sys driver.o".into(),
            status: Some(1),
            diagnostics: "undefined reference to `KeBugCheck@4'\n".into(),
        };

        assert_eq!(err.to_string(), "`linux.sys` failed (exit status 1)");
        assert_eq!(err.command(), Some("gcc -o linux.sys driver.o"));

        let output = err.to_diagnostic().format(false);
        assert!(output.contains("command: gcc -o linux.sys driver.o"));
        assert!(output.contains("KeBugCheck@4"));
    }

    #[test]
    fn test_toolchain_not_found_message() {
        let err = BuildError::ToolchainNotFound {
            tool: "rustc".into(),
            context: "x86_64-unknown-linux-gnu -> i686-pc-mingw32".into(),
        };

        assert!(err.to_string().contains("no `rustc`"));
        assert!(err.command().is_none());
    }
}
