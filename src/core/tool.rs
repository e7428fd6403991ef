//! The closed set of tools a target can be built with.
//!
//! Compiler and Linker steps are rendered from effective options by the
//! executor. A Script carries a pure command builder that receives the
//! toolchain lookup capability and the target's run info and returns one
//! shell command line.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::builder::toolchain::ToolLookup;
use crate::builder::BuildError;
use crate::core::options::Options;
use crate::util::process::shell_quote;

/// A build step kind.
#[derive(Debug, Clone)]
pub enum Tool {
    /// Compile-and-link with the cross compiler driver.
    Compiler,
    /// Relocatable link of several objects into one.
    Linker,
    /// A command built from the run info.
    Script(Script),
    /// Pure aggregation; produces no file.
    Empty,
}

/// Tag of a [`Tool`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Compiler,
    Linker,
    Script,
    Empty,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Compiler => "compiler",
            ToolKind::Linker => "linker",
            ToolKind::Script => "script",
            ToolKind::Empty => "empty",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Tool {
    pub fn kind(&self) -> ToolKind {
        match self {
            Tool::Compiler => ToolKind::Compiler,
            Tool::Linker => ToolKind::Linker,
            Tool::Script(_) => ToolKind::Script,
            Tool::Empty => ToolKind::Empty,
        }
    }
}

/// Everything a script sees about the target being built.
#[derive(Debug, Clone, Copy)]
pub struct RunInfo<'a> {
    /// Target name.
    pub target: &'a str,
    /// Flattened actual inputs, in declared order.
    pub inputs: &'a [PathBuf],
    /// Where the artifact must be written.
    pub output: &'a Path,
    /// Effective options of the target.
    pub options: &'a Options,
    /// Project root.
    pub root: &'a Path,
    /// Declaring directory, absolute.
    pub dir: &'a Path,
}

impl<'a> RunInfo<'a> {
    /// The `n`th actual input.
    pub fn input(&self, n: usize) -> Result<&'a Path, BuildError> {
        self.inputs
            .get(n)
            .map(PathBuf::as_path)
            .ok_or_else(|| BuildError::Script {
                target: self.target.to_string(),
                message: format!(
                    "input {} requested but the target has {} input(s)",
                    n,
                    self.inputs.len()
                ),
            })
    }
}

type CommandBuilder =
    dyn Fn(&ToolLookup<'_>, &RunInfo<'_>) -> Result<String, BuildError> + Send + Sync;

/// A command builder: `(toolchain lookup, run info) -> command line`.
#[derive(Clone)]
pub struct Script {
    name: String,
    build: Arc<CommandBuilder>,
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script").field("name", &self.name).finish()
    }
}

impl Script {
    /// Wrap a command builder function.
    pub fn new<F>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn(&ToolLookup<'_>, &RunInfo<'_>) -> Result<String, BuildError> + Send + Sync + 'static,
    {
        Script {
            name: name.into(),
            build: Arc::new(build),
        }
    }

    /// Build a script from a command template.
    ///
    /// Placeholders: `{tool:NAME}`, `{input:N}`, `{inputs}`, `{output}`,
    /// `{dir}`, `{root}`. Literal braces are written `{{` and `}}`.
    pub fn template(source: &str) -> Result<Self, TemplateError> {
        let segments = parse_template(source)?;
        Ok(Script::new(source, move |tools, run| {
            render_template(&segments, tools, run)
        }))
    }

    /// Human readable identification (the template source for templates).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the command line.
    pub fn command(&self, tools: &ToolLookup<'_>, run: &RunInfo<'_>) -> Result<String, BuildError> {
        (self.build)(tools, run)
    }
}

/// Error in a script template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed `{{` at byte {0}")]
    Unclosed(usize),

    #[error("unmatched `}}` at byte {0}")]
    UnmatchedClose(usize),

    #[error("unknown placeholder `{{{0}}}`")]
    UnknownPlaceholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Tool(String),
    Input(usize),
    Inputs,
    Output,
    Dir,
    Root,
}

fn parse_template(source: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if chars.peek().map(|&(_, n)| n) == Some('{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek().map(|&(_, n)| n) == Some('}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut placeholder = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    placeholder.push(c);
                }
                if !closed {
                    return Err(TemplateError::Unclosed(pos));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(parse_placeholder(&placeholder)?);
            }
            '}' => return Err(TemplateError::UnmatchedClose(pos)),
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn parse_placeholder(placeholder: &str) -> Result<Segment, TemplateError> {
    let unknown = || TemplateError::UnknownPlaceholder(placeholder.to_string());

    match placeholder {
        "inputs" => Ok(Segment::Inputs),
        "output" => Ok(Segment::Output),
        "dir" => Ok(Segment::Dir),
        "root" => Ok(Segment::Root),
        _ => match placeholder.split_once(':') {
            Some(("tool", name)) if !name.is_empty() => Ok(Segment::Tool(name.to_string())),
            Some(("input", n)) => n.parse().map(Segment::Input).map_err(|_| unknown()),
            _ => Err(unknown()),
        },
    }
}

fn render_template(
    segments: &[Segment],
    tools: &ToolLookup<'_>,
    run: &RunInfo<'_>,
) -> Result<String, BuildError> {
    let mut out = String::new();

    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Tool(name) => out.push_str(&shell_quote(&tools.tool(name)?)),
            Segment::Input(n) => out.push_str(&shell_quote(run.input(*n)?)),
            Segment::Inputs => {
                let quoted: Vec<String> = run.inputs.iter().map(|p| shell_quote(p)).collect();
                out.push_str(&quoted.join(" "));
            }
            Segment::Output => out.push_str(&shell_quote(run.output)),
            Segment::Dir => out.push_str(&shell_quote(run.dir)),
            Segment::Root => out.push_str(&shell_quote(run.root)),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::toolchain::{CrossToolchain, ToolchainContext};

    fn render(template: &str, inputs: &[PathBuf], tools: &CrossToolchain) -> Result<String, BuildError> {
        let ctx = ToolchainContext::cross("i686-pc-mingw32", None);
        let options = Options::empty();
        let run = RunInfo {
            target: "t",
            inputs,
            output: Path::new("/out/t"),
            options: &options,
            root: Path::new("/src"),
            dir: Path::new("/src/daemon"),
        };
        Script::template(template)
            .unwrap()
            .command(&tools.bind(&ctx), &run)
    }

    #[test]
    fn test_template_placeholders() {
        let inputs = vec![PathBuf::from("/out/a.o"), PathBuf::from("/out/b.o")];
        let cmd = render(
            "{tool:windres} -i {dir}/res.rc -o {output} && cat {inputs} {input:1}",
            &inputs,
            &CrossToolchain::new(),
        )
        .unwrap();

        assert_eq!(
            cmd,
            "i686-pc-mingw32-windres -i /src/daemon/res.rc -o /out/t && cat /out/a.o /out/b.o /out/b.o"
        );
    }

    #[test]
    fn test_template_escapes_and_quoting() {
        let inputs = vec![PathBuf::from("/out/with space.o")];
        let cmd = render("awk '{{print}}' {input:0}", &inputs, &CrossToolchain::new()).unwrap();

        assert_eq!(cmd, "awk '{print}' '/out/with space.o'");
    }

    #[test]
    fn test_template_errors() {
        assert_eq!(
            Script::template("cc {bogus}").unwrap_err(),
            TemplateError::UnknownPlaceholder("bogus".to_string())
        );
        assert_eq!(Script::template("cc {output").unwrap_err(), TemplateError::Unclosed(3));
        assert_eq!(Script::template("cc }").unwrap_err(), TemplateError::UnmatchedClose(3));
        assert!(Script::template("{input:x}").is_err());
        assert!(Script::template("{tool:}").is_err());
    }

    #[test]
    fn test_template_missing_input() {
        let err = render("cat {input:2}", &[], &CrossToolchain::new()).unwrap_err();
        assert!(matches!(err, BuildError::Script { .. }));
    }

    #[test]
    fn test_template_unknown_tool() {
        let err = render("{tool:rustc} x", &[], &CrossToolchain::new()).unwrap_err();
        assert!(matches!(err, BuildError::ToolchainNotFound { .. }));
    }

    #[test]
    fn test_closure_script() {
        let script = Script::new("hello", |_, run| Ok(format!("echo {} > out", run.target)));
        let tools = CrossToolchain::new();
        let ctx = ToolchainContext::native();
        let options = Options::empty();
        let run = RunInfo {
            target: "greeting",
            inputs: &[],
            output: Path::new("out"),
            options: &options,
            root: Path::new("."),
            dir: Path::new("."),
        };

        assert_eq!(script.command(&tools.bind(&ctx), &run).unwrap(), "echo greeting > out");
        assert_eq!(format!("{:?}", script), "Script { name: \"hello\" }");
    }
}
