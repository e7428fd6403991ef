//! Build event types for JSON output.
//!
//! These events are emitted one JSON object per line when building with
//! `--message-format json`.
//!
//! # Event Types
//!
//! - `target-started`: A target's step is about to run
//! - `target-finished`: A target succeeded (freshly run or up to date)
//! - `target-failed`: A target's step failed
//! - `target-skipped`: A target was not scheduled because a dependency failed
//! - `build-finished`: The evaluation completed

use std::path::PathBuf;

use serde::Serialize;

/// A build event emitted during evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason")]
pub enum BuildEvent {
    /// A target's step is about to run.
    #[serde(rename = "target-started")]
    TargetStarted {
        target: String,
        /// Tool kind (`compiler`, `linker`, `script`, `empty`)
        tool: String,
    },

    /// A target succeeded.
    #[serde(rename = "target-finished")]
    TargetFinished {
        target: String,
        /// Paths this target contributes to its dependents
        artifacts: Vec<PathBuf>,
        /// Whether the step was skipped as up to date
        fresh: bool,
    },

    /// A target's step failed.
    #[serde(rename = "target-failed")]
    TargetFailed {
        target: String,
        /// Command line that failed, if a command ran
        #[serde(skip_serializing_if = "Option::is_none")]
        command: Option<String>,
        message: String,
    },

    /// A target was not scheduled because a dependency failed.
    #[serde(rename = "target-skipped")]
    TargetSkipped {
        target: String,
        failed_dependency: String,
    },

    /// Evaluation completed (success or failure).
    #[serde(rename = "build-finished")]
    BuildFinished {
        /// Requested root target
        root: String,
        success: bool,
        /// Total duration in milliseconds
        duration_ms: u64,
        /// Number of steps actually run
        targets_built: u64,
    },
}
