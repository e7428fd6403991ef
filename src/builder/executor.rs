//! Tool dispatch for a single target.
//!
//! [`ToolExecutor::prepare`] renders a target's step from its resolved inputs
//! and effective options; [`ToolExecutor::run`] executes it. Keeping the two
//! apart lets the scheduler fingerprint the exact command before deciding
//! whether to run it.

use std::path::{Path, PathBuf};

use crate::builder::context::BuildContext;
use crate::builder::record::Artifact;
use crate::builder::toolchain::{gcc, CommandSpec};
use crate::builder::BuildError;
use crate::core::options::Options;
use crate::core::target::Target;
use crate::core::tool::{RunInfo, Tool};
use crate::util::process::{captured_output, ProcessBuilder};

/// A rendered build step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedStep {
    /// A compiler or linker invocation.
    Process { spec: CommandSpec, output: PathBuf },
    /// A script command line, run through the shell.
    Shell { command: String, output: PathBuf },
    /// Nothing to run; the artifact is the inputs themselves.
    Aggregate(Vec<PathBuf>),
}

impl PreparedStep {
    /// Command line as it will be run, if any.
    pub fn command_line(&self) -> Option<String> {
        match self {
            PreparedStep::Process { spec, .. } => {
                Some(ProcessBuilder::from_spec(spec).display_command())
            }
            PreparedStep::Shell { command, .. } => Some(command.clone()),
            PreparedStep::Aggregate(_) => None,
        }
    }

    /// File the step writes, if any.
    pub fn output(&self) -> Option<&Path> {
        match self {
            PreparedStep::Process { output, .. } | PreparedStep::Shell { output, .. } => {
                Some(output)
            }
            PreparedStep::Aggregate(_) => None,
        }
    }
}

/// Runs one target's step for a build context.
#[derive(Debug, Clone, Copy)]
pub struct ToolExecutor<'a> {
    ctx: &'a BuildContext,
}

impl<'a> ToolExecutor<'a> {
    pub fn new(ctx: &'a BuildContext) -> Self {
        ToolExecutor { ctx }
    }

    /// Render the step for `target` given its flattened actual inputs.
    pub fn prepare(
        &self,
        target: &Target,
        inputs: &[PathBuf],
        options: &Options,
    ) -> Result<PreparedStep, BuildError> {
        let output = self.ctx.artifact_path(&target.name);
        let tools = self.ctx.lookup();

        match target.tool() {
            Tool::Compiler => {
                let driver = tools.tool(options.driver())?;
                let spec = gcc::compile_command(&driver, inputs, &output, options)?;
                Ok(PreparedStep::Process { spec, output })
            }
            Tool::Linker => {
                let ld = tools.tool("ld")?;
                let spec = gcc::relocatable_link_command(&ld, inputs, &output, options)?;
                Ok(PreparedStep::Process { spec, output })
            }
            Tool::Script(script) => {
                let dir = self.ctx.target_dir(target.base_dir());
                let run = RunInfo {
                    target: &target.name,
                    inputs,
                    output: &output,
                    options,
                    root: &self.ctx.root,
                    dir: &dir,
                };
                let command = script.command(&tools, &run)?;
                Ok(PreparedStep::Shell { command, output })
            }
            Tool::Empty => Ok(PreparedStep::Aggregate(inputs.to_vec())),
        }
    }

    /// Execute a prepared step in the output directory.
    pub fn run(&self, target: &str, step: PreparedStep) -> Result<Artifact, BuildError> {
        let (process, output) = match step {
            PreparedStep::Aggregate(paths) => return Ok(Artifact::Aggregate(paths)),
            PreparedStep::Process { spec, output } => (ProcessBuilder::from_spec(&spec), output),
            PreparedStep::Shell { command, output } => (ProcessBuilder::shell(command), output),
        };
        let command = process.display_command();

        let out_dir = output.parent().unwrap_or(&self.ctx.out_dir);
        std::fs::create_dir_all(out_dir)
            .map_err(|e| BuildError::io(format!("failed to create {}", out_dir.display()), e))?;

        tracing::debug!("running `{}`", command);
        let result = process
            .cwd(&self.ctx.out_dir)
            .output()
            .map_err(|source| BuildError::Spawn {
                target: target.to_string(),
                command: command.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(BuildError::ToolExecution {
                target: target.to_string(),
                command,
                status: result.status.code(),
                diagnostics: captured_output(&result),
            });
        }

        if !output.exists() {
            return Err(BuildError::MissingOutput {
                target: target.to_string(),
                command,
                path: output,
            });
        }

        Ok(Artifact::File(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::options::{keys, DefType, Layer};
    use crate::core::target::TargetDecl;
    use crate::core::tool::Script;
    use crate::test_support::test_context;
    use tempfile::TempDir;

    fn target(name: &str, tool: Tool) -> Target {
        Target::new(name, TargetDecl::new(tool))
    }

    #[test]
    fn test_prepare_compiler_uses_driver_option() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path());
        let executor = ToolExecutor::new(&ctx);
        let options = Options::empty().compose(
            &Layer::new()
                .override_with(keys::DRIVER, "g++")
                .override_with(keys::DEF_TYPE, DefType::Object),
        );

        let step = executor
            .prepare(&target("main.o", Tool::Compiler), &[PathBuf::from("main.cpp")], &options)
            .unwrap();

        let PreparedStep::Process { spec, output } = step else {
            panic!("expected a process step");
        };
        assert_eq!(spec.program, PathBuf::from("g++"));
        assert_eq!(spec.args[0], "-c");
        assert_eq!(output, ctx.out_dir.join("main.o"));
    }

    #[test]
    fn test_prepare_linker() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path());
        let step = ToolExecutor::new(&ctx)
            .prepare(
                &target("driver.o", Tool::Linker),
                &[PathBuf::from("a.o"), PathBuf::from("b.o")],
                &Options::empty(),
            )
            .unwrap();

        let command = step.command_line().unwrap();
        assert!(command.starts_with("ld -r -o "));
        assert!(command.ends_with("driver.o a.o b.o"));
    }

    #[test]
    fn test_prepare_empty_aggregates_inputs() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path());
        let inputs = vec![PathBuf::from("a.exe"), PathBuf::from("b.exe")];

        let step = ToolExecutor::new(&ctx)
            .prepare(&target("all", Tool::Empty), &inputs, &Options::empty())
            .unwrap();

        assert_eq!(step, PreparedStep::Aggregate(inputs.clone()));
        assert!(step.command_line().is_none());
        assert_eq!(
            ToolExecutor::new(&ctx).run("all", step).unwrap(),
            Artifact::Aggregate(inputs)
        );
    }

    #[test]
    fn test_prepare_unknown_driver() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path());
        let options = Options::empty().compose(&Layer::new().override_with(keys::DRIVER, "tcc"));

        let err = ToolExecutor::new(&ctx)
            .prepare(&target("x", Tool::Compiler), &[], &options)
            .unwrap_err();
        assert!(matches!(err, BuildError::ToolchainNotFound { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn test_run_script() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path());
        let executor = ToolExecutor::new(&ctx);
        let script = Script::template("printf hello > {output}").unwrap();

        let step = executor
            .prepare(&target("greeting.txt", Tool::Script(script)), &[], &Options::empty())
            .unwrap();
        let artifact = executor.run("greeting.txt", step).unwrap();

        let path = ctx.out_dir.join("greeting.txt");
        assert_eq!(artifact, Artifact::File(path.clone()));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello");
    }

    #[test]
    #[cfg(unix)]
    fn test_run_failure_captures_command_and_output() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path());
        let executor = ToolExecutor::new(&ctx);
        let step = PreparedStep::Shell {
            command: "echo 'undefined reference' >&2; exit 2".to_string(),
            output: ctx.out_dir.join("bad"),
        };

        match executor.run("bad", step).unwrap_err() {
            BuildError::ToolExecution {
                command,
                status,
                diagnostics,
                ..
            } => {
                assert_eq!(command, "echo 'undefined reference' >&2; exit 2");
                assert_eq!(status, Some(2));
                assert!(diagnostics.contains("undefined reference"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_run_requires_output() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path());
        let step = PreparedStep::Shell {
            command: "true".to_string(),
            output: ctx.out_dir.join("nothing"),
        };

        let err = ToolExecutor::new(&ctx).run("nothing", step).unwrap_err();
        assert!(matches!(err, BuildError::MissingOutput { .. }));
        assert_eq!(err.command(), Some("true"));
    }
}
