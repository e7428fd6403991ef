//! Core declaration model for Comake.
//!
//! This module contains the values produced during the configuration-load
//! phase and never mutated afterwards:
//! - Option layers and their composition
//! - Targets and their inputs
//! - The closed set of tools a target can be built with
//! - The `Comake.toml` declaration loader

pub mod buildfile;
pub mod options;
pub mod target;
pub mod tool;

pub use buildfile::Buildfile;
pub use options::{DefType, Layer, Options, Value};
pub use target::{Input, OptionsLayer, Target, TargetDecl};
pub use tool::{RunInfo, Script, Tool, ToolKind};
