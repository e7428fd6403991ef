//! `Comake.toml` parsing.
//!
//! A build file declares option defaults, plain targets and kernel driver
//! images. Drivers expand into their three link stages before the graph is
//! finished, so plain targets may reference stage names like any other
//! target.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::builder::driver::{DriverPipeline, DriverStages, KernelImage};
use crate::core::options::{Layer, Options};
use crate::core::target::{Input, TargetDecl};
use crate::core::tool::{Script, Tool};
use crate::graph::{GraphBuilder, TargetGraph};
use crate::util::fs::{find_upwards, normalize_path, read_to_string};

/// Conventional build file name.
pub const BUILDFILE_NAME: &str = "Comake.toml";

/// Aggregate built when no target is named.
pub const DEFAULT_TARGET: &str = "all";

/// A loaded build file: the finished graph plus the project-wide defaults.
#[derive(Debug)]
pub struct Buildfile {
    /// Path of the file itself
    pub path: PathBuf,
    /// Project root (the directory containing the file)
    pub root: PathBuf,
    /// Base options every target composes onto
    pub defaults: Options,
    pub graph: TargetGraph,
    /// Stage names of every declared driver
    pub drivers: Vec<DriverStages>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBuildfile {
    #[serde(default)]
    defaults: Layer,
    #[serde(default)]
    targets: BTreeMap<String, RawTarget>,
    #[serde(default)]
    drivers: BTreeMap<String, RawDriver>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTarget {
    tool: RawTool,
    #[serde(default)]
    inputs: Vec<RawInput>,
    options: Option<Layer>,
    mono_options: Option<Layer>,
    dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTool {
    Named(String),
    Script { script: String },
}

/// Input forms: a bare string, `{ target = ".." }` or
/// `{ path = "..", root = bool }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawInput {
    Name(String),
    Target {
        target: String,
    },
    Path {
        path: PathBuf,
        #[serde(default)]
        root: bool,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDriver {
    object: RawInput,
    dir: Option<PathBuf>,
    entry: Option<String>,
    image_base: Option<u64>,
    file_alignment: Option<u64>,
    section_alignment: Option<u64>,
    libs: Option<Vec<String>>,
    defines: Option<Vec<String>>,
}

impl Buildfile {
    /// Locate `Comake.toml` in `start` or one of its ancestors.
    pub fn find(start: &Path) -> Option<PathBuf> {
        find_upwards(start, BUILDFILE_NAME)
    }

    /// Load a build file from a path.
    ///
    /// The path is made absolute first: steps run inside the output
    /// directory, so a relative root would misplace every input.
    pub fn load(path: &Path) -> Result<Self> {
        let content = read_to_string(path)?;
        Self::parse(&content, &normalize_path(path))
    }

    /// Parse build file content; `path` locates the project root.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let raw: RawBuildfile = toml::from_str(content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let root = path.parent().unwrap_or(Path::new(".")).to_path_buf();

        if let Some(key) = raw.defaults.conflicting_keys().first() {
            bail!("[defaults] both overrides and appends option `{}`", key);
        }
        let defaults = Options::empty().compose(&raw.defaults);

        // Stage names depend only on the object's file name, so they are known
        // before any input is classified.
        let mut declared: HashSet<String> = raw.targets.keys().cloned().collect();
        for (image, driver) in &raw.drivers {
            let stages = driver_pipeline(image, driver, &HashSet::new()).stages();
            declared.extend(stages.names().iter().map(|s| s.to_string()));
        }

        let mut builder = GraphBuilder::new();
        for (name, target) in &raw.targets {
            let decl = convert_target(name, target, &declared)?;
            builder.register(name.clone(), decl)?;
        }

        let mut drivers = Vec::new();
        for (image, driver) in &raw.drivers {
            let pipeline = driver_pipeline(image, driver, &declared);
            drivers.push(pipeline.register(&mut builder)?);
        }

        let graph = builder.finish()?;
        tracing::debug!(
            "loaded {} ({} targets, {} drivers)",
            path.display(),
            graph.len(),
            drivers.len()
        );

        Ok(Buildfile {
            path: path.to_path_buf(),
            root,
            defaults,
            graph,
            drivers,
        })
    }

    /// Targets built when none is named: `all` if declared, else every sink.
    pub fn default_targets(&self) -> Vec<String> {
        if self.graph.get(DEFAULT_TARGET).is_some() {
            return vec![DEFAULT_TARGET.to_string()];
        }
        self.graph.sinks().into_iter().map(str::to_string).collect()
    }
}

fn resolve_input(raw: &RawInput, declared: &HashSet<String>) -> Input {
    match raw {
        RawInput::Name(name) if declared.contains(name) => Input::target(name),
        RawInput::Name(path) => Input::path(path),
        RawInput::Target { target } => Input::target(target),
        RawInput::Path { path, root: true } => Input::root_path(path),
        RawInput::Path { path, root: false } => Input::path(path),
    }
}

fn convert_target(name: &str, raw: &RawTarget, declared: &HashSet<String>) -> Result<TargetDecl> {
    let tool = match &raw.tool {
        RawTool::Named(tool) => match tool.as_str() {
            "compiler" => Tool::Compiler,
            "linker" => Tool::Linker,
            "empty" => Tool::Empty,
            "script" => bail!(
                "target `{}`: script tools take a command template, e.g. tool = {{ script = \"...\" }}",
                name
            ),
            other => bail!(
                "target `{}`: unknown tool `{}` (expected compiler, linker, empty or {{ script = \"...\" }})",
                name,
                other
            ),
        },
        RawTool::Script { script } => Tool::Script(
            Script::template(script)
                .with_context(|| format!("target `{}`: invalid script template", name))?,
        ),
    };

    let mut decl = TargetDecl::new(tool)
        .inputs(raw.inputs.iter().map(|input| resolve_input(input, declared)));

    if let Some(dir) = &raw.dir {
        decl = decl.base_dir(dir);
    }

    match (&raw.options, &raw.mono_options) {
        (Some(_), Some(_)) => bail!(
            "target `{}` declares both `options` and `mono_options`; pick one",
            name
        ),
        (Some(layer), None) => decl = decl.options(layer.clone()),
        (None, Some(layer)) => decl = decl.mono_options(layer.clone()),
        (None, None) => {}
    }

    Ok(decl)
}

fn driver_pipeline(image: &str, raw: &RawDriver, declared: &HashSet<String>) -> DriverPipeline {
    let defaults = KernelImage::default();
    let kernel = KernelImage {
        entry: raw.entry.clone().unwrap_or(defaults.entry),
        image_base: raw.image_base.unwrap_or(defaults.image_base),
        file_alignment: raw.file_alignment.unwrap_or(defaults.file_alignment),
        section_alignment: raw.section_alignment.unwrap_or(defaults.section_alignment),
        libs: raw.libs.clone().unwrap_or(defaults.libs),
    };

    let mut pipeline =
        DriverPipeline::new(image, resolve_input(&raw.object, declared)).kernel(kernel);
    if let Some(dir) = &raw.dir {
        pipeline = pipeline.base_dir(dir);
    }
    if let Some(defines) = &raw.defines {
        pipeline = pipeline.defines(defines.iter().cloned());
    }
    pipeline
}
