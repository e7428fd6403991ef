//! Structural graph errors and diagnostics.

use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error raised while registering targets or resolving the graph.
///
/// All of these are detected before any external tool runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("target `{name}` is already registered")]
    DuplicateTarget { name: String },

    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    GraphCycle { cycle: Vec<String> },

    #[error("{}", unknown_target_message(.name, .referenced_by.as_deref()))]
    UnknownTarget {
        name: String,
        referenced_by: Option<String>,
    },

    #[error("target `{target}` both overrides and appends option `{key}`")]
    ConflictingOption { target: String, key: String },
}

fn unknown_target_message(name: &str, referenced_by: Option<&str>) -> String {
    match referenced_by {
        Some(by) => format!("unknown target `{}` referenced by `{}`", name, by),
        None => format!("unknown target `{}`", name),
    }
}

impl GraphError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            GraphError::DuplicateTarget { name } => Diagnostic::error(self.to_string())
                .with_suggestion(format!("Rename one of the declarations of `{}`", name)),

            GraphError::GraphCycle { cycle } => {
                let mut diag = Diagnostic::error("cycle detected in target graph")
                    .with_context(format!("cycle: {}", cycle.join(" -> ")));

                if let [first, .., last_dep, _] = cycle.as_slice() {
                    diag = diag.with_suggestion(format!(
                        "Remove `{}` from the inputs of `{}`",
                        first, last_dep
                    ));
                } else {
                    diag = diag.with_suggestion(
                        "Break the cycle by removing or restructuring inputs".to_string(),
                    );
                }

                diag
            }

            GraphError::UnknownTarget { .. } => Diagnostic::error(self.to_string())
                .with_suggestion(suggestions::TARGET_NOT_FOUND),

            GraphError::ConflictingOption { target, key } => Diagnostic::error(self.to_string())
                .with_context(format!(
                    "`{}` appears in both `overriders` and `appenders` of `{}`",
                    key, target
                ))
                .with_suggestion("Keep the key in only one of the two maps"),
        }
    }
}
