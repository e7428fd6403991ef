//! Comake - a target-graph build orchestrator for cross-compiled suites
//!
//! This crate provides the declaration model (targets, inputs, option layers,
//! tools), the dependency graph and resolver, and the parallel evaluator that
//! drives cross toolchains, including the multi-stage kernel driver link.

pub mod builder;
pub mod core;
pub mod graph;
pub mod util;

/// Test utilities shared by unit tests.
#[cfg(test)]
pub mod test_support;

pub use builder::{BuildContext, BuildError, Evaluation, EvaluationReport};
pub use core::{
    options::{Layer, Options},
    target::{Input, Target, TargetDecl},
    tool::{RunInfo, Script, Tool},
};
pub use graph::{GraphBuilder, GraphError, TargetGraph};
