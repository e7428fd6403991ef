//! Cross toolchain resolution.
//!
//! Maps logical tool names (`gcc`, `dlltool`, `windres`, ...) to the concrete
//! executables of the configured host/target pairing.
//!
//! Resolution order:
//! 1. Explicit binding from configuration (`[toolchain.tools]`)
//! 2. `<prefix>/bin/<target>-<name>` when cross-compiling with an install prefix
//! 3. `<target>-<name>` when cross-compiling without a prefix
//! 4. The bare name for native builds
//!
//! Resolution never probes the filesystem; `comake toolchain` reports which
//! resolved executables are actually present.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::builder::BuildError;

pub mod gcc;

/// Logical tool names resolvable without an explicit binding.
pub const KNOWN_TOOLS: &[&str] = &[
    "gcc", "g++", "cpp", "as", "ld", "ar", "ranlib", "nm", "strip", "objcopy", "objdump",
    "dlltool", "dllwrap", "windres",
];

/// A command to execute: program and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// The program to run (e.g., "i686-pc-mingw32-gcc")
    pub program: PathBuf,
    /// Command arguments
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Create a new command spec.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }
}

/// Triple of the machine running comake.
pub fn host_triple() -> String {
    let arch = std::env::consts::ARCH;
    let os = std::env::consts::OS;

    match os {
        "linux" => format!("{}-unknown-linux-gnu", arch),
        "macos" => format!("{}-apple-darwin", arch),
        "windows" => format!("{}-pc-windows-gnu", arch),
        _ => format!("{}-unknown-{}", arch, os),
    }
}

/// The host/target pairing tools are resolved for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainContext {
    pub host: String,
    pub target: String,
    /// Cross toolchain install prefix (the directory containing `bin/`).
    pub prefix: Option<PathBuf>,
}

impl ToolchainContext {
    /// Build for the machine we run on.
    pub fn native() -> Self {
        let host = host_triple();
        ToolchainContext {
            target: host.clone(),
            host,
            prefix: None,
        }
    }

    /// Build for `target` from the current host.
    pub fn cross(target: impl Into<String>, prefix: Option<PathBuf>) -> Self {
        ToolchainContext {
            host: host_triple(),
            target: target.into(),
            prefix,
        }
    }

    pub fn is_cross(&self) -> bool {
        self.host != self.target
    }
}

impl fmt::Display for ToolchainContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_cross() {
            write!(f, "{} -> {}", self.host, self.target)
        } else {
            write!(f, "{} (native)", self.host)
        }
    }
}

/// Explicit logical-name bindings plus the naming convention of GNU cross
/// toolchains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossToolchain {
    bindings: BTreeMap<String, PathBuf>,
}

impl CrossToolchain {
    pub fn new() -> Self {
        CrossToolchain::default()
    }

    /// Bind a logical name to a concrete executable.
    pub fn with_binding(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.bindings.insert(name.into(), path.into());
        self
    }

    /// Explicit bindings.
    pub fn bindings(&self) -> &BTreeMap<String, PathBuf> {
        &self.bindings
    }

    /// Resolve a logical tool name.
    pub fn lookup(&self, name: &str, ctx: &ToolchainContext) -> Result<PathBuf, BuildError> {
        if let Some(path) = self.bindings.get(name) {
            return Ok(path.clone());
        }

        if !KNOWN_TOOLS.contains(&name) {
            return Err(BuildError::ToolchainNotFound {
                tool: name.to_string(),
                context: ctx.to_string(),
            });
        }

        if !ctx.is_cross() {
            return Ok(PathBuf::from(name));
        }

        let prefixed = format!("{}-{}", ctx.target, name);
        Ok(match &ctx.prefix {
            Some(prefix) => prefix.join("bin").join(prefixed),
            None => PathBuf::from(prefixed),
        })
    }

    /// Every resolvable logical name: known tools plus explicit bindings.
    pub fn resolve_all(&self, ctx: &ToolchainContext) -> Vec<(String, PathBuf)> {
        let mut names: Vec<&str> = KNOWN_TOOLS.to_vec();
        names.extend(
            self.bindings
                .keys()
                .map(String::as_str)
                .filter(|n| !KNOWN_TOOLS.contains(n)),
        );

        names
            .into_iter()
            .filter_map(|name| Some((name.to_string(), self.lookup(name, ctx).ok()?)))
            .collect()
    }

    /// Bind this toolchain to a context, producing the capability scripts see.
    pub fn bind<'a>(&'a self, ctx: &'a ToolchainContext) -> ToolLookup<'a> {
        ToolLookup {
            toolchain: self,
            context: ctx,
        }
    }
}

/// Toolchain lookup capability handed to scripts and the executor.
#[derive(Debug, Clone, Copy)]
pub struct ToolLookup<'a> {
    toolchain: &'a CrossToolchain,
    context: &'a ToolchainContext,
}

impl<'a> ToolLookup<'a> {
    /// Resolve a logical tool name.
    pub fn tool(&self, name: &str) -> Result<PathBuf, BuildError> {
        self.toolchain.lookup(name, self.context)
    }

    pub fn context(&self) -> &'a ToolchainContext {
        self.context
    }
}

/// Find the executable a resolved tool path refers to, if present.
pub fn locate(tool: &Path) -> Option<PathBuf> {
    if tool.components().count() > 1 {
        return tool.is_file().then(|| tool.to_path_buf());
    }
    crate::util::process::find_executable(&tool.to_string_lossy())
}
