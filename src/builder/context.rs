//! Build context - toolchain, directories and defaults for one evaluation.

use std::path::{Path, PathBuf};

use crate::builder::toolchain::{CrossToolchain, ToolLookup, ToolchainContext};
use crate::core::options::Options;
use crate::util::config::Config;

/// Default output directory, relative to the project root.
pub const DEFAULT_OUT_DIR: &str = "build";

/// File holding persisted target fingerprints, inside the output directory.
pub const FINGERPRINT_FILE: &str = ".comake-fingerprints.json";

/// Everything the executor needs besides the graph itself.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Project root
    pub root: PathBuf,

    /// Output directory; artifacts land at `<out_dir>/<target name>`
    pub out_dir: PathBuf,

    /// Explicit tool bindings
    pub toolchain: CrossToolchain,

    /// Host/target pairing
    pub toolchain_context: ToolchainContext,

    /// Project-wide base options
    pub defaults: Options,

    /// Worker count (0 = one per CPU)
    pub jobs: usize,

    /// Ignore fingerprints and run every step
    pub force: bool,
}

impl BuildContext {
    /// Native build rooted at `root`, writing to `<root>/build`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        BuildContext {
            out_dir: root.join(DEFAULT_OUT_DIR),
            root,
            toolchain: CrossToolchain::new(),
            toolchain_context: ToolchainContext::native(),
            defaults: Options::empty(),
            jobs: 0,
            force: false,
        }
    }

    /// Build context from loaded configuration.
    pub fn from_config(root: impl Into<PathBuf>, config: &Config) -> Self {
        let ctx = BuildContext::new(root)
            .with_toolchain(config.cross_toolchain(), config.toolchain_context())
            .with_jobs(config.build.jobs.unwrap_or(0));

        match &config.build.out_dir {
            Some(out_dir) => {
                let out_dir = ctx.root.join(out_dir);
                ctx.with_out_dir(out_dir)
            }
            None => ctx,
        }
    }

    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }

    pub fn with_toolchain(mut self, toolchain: CrossToolchain, context: ToolchainContext) -> Self {
        self.toolchain = toolchain;
        self.toolchain_context = context;
        self
    }

    pub fn with_defaults(mut self, defaults: Options) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Where a target's artifact is written.
    pub fn artifact_path(&self, target: &str) -> PathBuf {
        self.out_dir.join(target)
    }

    /// Absolute declaring directory of a target.
    pub fn target_dir(&self, base_dir: &Path) -> PathBuf {
        self.root.join(base_dir)
    }

    /// Resolve a literal input path.
    pub fn resolve_input(&self, base_dir: &Path, path: &Path, root_relative: bool) -> PathBuf {
        if root_relative {
            self.root.join(path)
        } else {
            self.target_dir(base_dir).join(path)
        }
    }

    /// Toolchain lookup capability for this context.
    pub fn lookup(&self) -> ToolLookup<'_> {
        self.toolchain.bind(&self.toolchain_context)
    }

    pub fn fingerprint_path(&self) -> PathBuf {
        self.out_dir.join(FINGERPRINT_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::config::{BuildConfig, ToolchainSettings};

    #[test]
    fn test_input_resolution() {
        let ctx = BuildContext::new("/src/colinux");

        assert_eq!(
            ctx.resolve_input(Path::new("src/daemon"), Path::new("main.c"), false),
            PathBuf::from("/src/colinux/src/daemon/main.c")
        );
        assert_eq!(
            ctx.resolve_input(Path::new("src/daemon"), Path::new("VERSION"), true),
            PathBuf::from("/src/colinux/VERSION")
        );
        assert_eq!(ctx.artifact_path("linux.sys"), PathBuf::from("/src/colinux/build/linux.sys"));
    }

    #[test]
    fn test_from_config() {
        let config = Config {
            toolchain: ToolchainSettings {
                target: Some("i686-pc-mingw32".into()),
                ..Default::default()
            },
            build: BuildConfig {
                jobs: Some(3),
                out_dir: Some("out".into()),
            },
        };

        let ctx = BuildContext::from_config("/p", &config);
        assert_eq!(ctx.jobs, 3);
        assert_eq!(ctx.out_dir, PathBuf::from("/p/out"));
        assert!(ctx.toolchain_context.is_cross());
        assert_eq!(ctx.fingerprint_path(), PathBuf::from("/p/out/.comake-fingerprints.json"));
    }
}
