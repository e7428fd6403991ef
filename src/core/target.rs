//! Target definitions - what gets built.
//!
//! A Target is a named node of the build graph: an ordered list of inputs,
//! the tool that turns them into an artifact, and an optional options layer.

use std::path::{Path, PathBuf};

use crate::core::options::{Layer, Options};
use crate::core::tool::Tool;

/// One input of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A literal file path.
    Path {
        path: PathBuf,
        /// Resolve from the project root instead of the declaring directory.
        root_relative: bool,
    },
    /// The artifact produced by another target.
    Target(String),
}

impl Input {
    /// A literal path, resolved against the declaring directory.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Input::Path {
            path: path.into(),
            root_relative: false,
        }
    }

    /// A literal path, resolved against the project root.
    pub fn root_path(path: impl Into<PathBuf>) -> Self {
        Input::Path {
            path: path.into(),
            root_relative: true,
        }
    }

    /// A reference to another target's artifact.
    pub fn target(name: impl Into<String>) -> Self {
        Input::Target(name.into())
    }

    /// Referenced target name, if this is a target input.
    pub fn as_target(&self) -> Option<&str> {
        match self {
            Input::Target(name) => Some(name),
            Input::Path { .. } => None,
        }
    }
}

/// How a target's declared layer relates to the project defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionsLayer {
    /// `options`: composed on top of the defaults.
    Inherit(Layer),
    /// `mono_options`: composed on top of nothing.
    Exclusive(Layer),
}

impl OptionsLayer {
    /// The underlying layer.
    pub fn layer(&self) -> &Layer {
        match self {
            OptionsLayer::Inherit(layer) | OptionsLayer::Exclusive(layer) => layer,
        }
    }
}

/// Everything declared for a target apart from its name.
#[derive(Debug, Clone)]
pub struct TargetDecl {
    pub inputs: Vec<Input>,
    pub tool: Tool,
    pub options: Option<OptionsLayer>,
    /// Declaring directory, relative to the project root.
    pub base_dir: PathBuf,
}

impl TargetDecl {
    /// Create a declaration with no inputs.
    pub fn new(tool: Tool) -> Self {
        TargetDecl {
            inputs: Vec::new(),
            tool,
            options: None,
            base_dir: PathBuf::new(),
        }
    }

    /// Add an input.
    pub fn input(mut self, input: Input) -> Self {
        self.inputs.push(input);
        self
    }

    /// Add several inputs.
    pub fn inputs(mut self, inputs: impl IntoIterator<Item = Input>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    /// Attach an inheriting options layer.
    pub fn options(mut self, layer: Layer) -> Self {
        self.options = Some(OptionsLayer::Inherit(layer));
        self
    }

    /// Attach an exclusive options layer.
    pub fn mono_options(mut self, layer: Layer) -> Self {
        self.options = Some(OptionsLayer::Exclusive(layer));
        self
    }

    /// Set the declaring directory.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }
}

/// A registered target.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub decl: TargetDecl,
}

impl Target {
    pub fn new(name: impl Into<String>, decl: TargetDecl) -> Self {
        Target {
            name: name.into(),
            decl,
        }
    }

    pub fn tool(&self) -> &Tool {
        &self.decl.tool
    }

    pub fn inputs(&self) -> &[Input] {
        &self.decl.inputs
    }

    pub fn base_dir(&self) -> &Path {
        &self.decl.base_dir
    }

    /// Names of referenced targets, in declared order (duplicates kept).
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.decl.inputs.iter().filter_map(Input::as_target)
    }

    /// Effective options for this target given the project defaults.
    pub fn effective_options(&self, defaults: &Options) -> Options {
        match &self.decl.options {
            None => defaults.clone(),
            Some(OptionsLayer::Inherit(layer)) => defaults.compose(layer),
            Some(OptionsLayer::Exclusive(layer)) => Options::empty().compose(layer),
        }
    }
}
