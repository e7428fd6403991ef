//! Kernel driver link pipeline.
//!
//! The kernel does not ship an import library for its exports, so a driver
//! image is linked in three ordinary Script targets:
//!
//! 1. a trial link that records every relocation into a base file and throws
//!    the linked binary away,
//! 2. `dlltool` turning the base file into an export descriptor bound to the
//!    image name,
//! 3. the final native-subsystem link against that descriptor.
//!
//! The stages are scheduled and fingerprinted like any other target, so a
//! stage only re-runs when the file it consumes changed.

use std::path::{Path, PathBuf};

use crate::builder::BuildError;
use crate::core::options::{keys, Layer};
use crate::core::target::{Input, TargetDecl};
use crate::core::tool::{RunInfo, Script, Tool};
use crate::graph::{GraphBuilder, GraphError};
use crate::util::process::shell_quote;

/// Defines every kernel-mode translation unit is built with.
pub const KERNEL_DEFINES: &[&str] = &["__KERNEL__", "CO_KERNEL", "CO_HOST_KERNEL"];

/// PE image parameters of a kernel driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelImage {
    /// Entry symbol (stdcall-decorated)
    pub entry: String,
    pub image_base: u64,
    pub file_alignment: u64,
    pub section_alignment: u64,
    /// Kernel import libraries, without the `-l` prefix
    pub libs: Vec<String>,
}

impl Default for KernelImage {
    fn default() -> Self {
        KernelImage {
            entry: "_DriverEntry@8".to_string(),
            image_base: 0x10000,
            file_alignment: 0x1000,
            section_alignment: 0x1000,
            libs: vec!["ntoskrnl".into(), "hal".into(), "gcc".into()],
        }
    }
}

impl KernelImage {
    /// Subsystem, layout and entry flags.
    pub fn image_flags(&self) -> Vec<String> {
        vec![
            "-Wl,--subsystem,native".to_string(),
            format!("-Wl,--image-base,{:#x}", self.image_base),
            format!("-Wl,--file-alignment,{:#x}", self.file_alignment),
            format!("-Wl,--section-alignment,{:#x}", self.section_alignment),
            self.entry_flag(),
        ]
    }

    /// `-Wl,--entry,<entry>`.
    pub fn entry_flag(&self) -> String {
        format!("-Wl,--entry,{}", self.entry)
    }

    /// Flags that keep the user-mode runtime out of the image.
    pub fn freestanding_flags(&self) -> Vec<String> {
        vec!["-mdll".into(), "-nostartfiles".into(), "-nostdlib".into()]
    }

    /// Every link flag of a driver image.
    pub fn link_flags(&self) -> Vec<String> {
        let mut flags = self.image_flags();
        flags.extend(self.freestanding_flags());
        flags
    }

    /// `-l` flags for the kernel import libraries.
    pub fn lib_flags(&self) -> Vec<String> {
        self.libs.iter().map(|lib| format!("-l{}", lib)).collect()
    }
}

/// Names of the three registered stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverStages {
    /// Trial link producing the relocation base file
    pub base_file: String,
    /// Export descriptor synthesized by dlltool
    pub exports: String,
    /// Final driver image
    pub image: String,
}

impl DriverStages {
    pub fn names(&self) -> [&str; 3] {
        [&self.base_file, &self.exports, &self.image]
    }
}

/// Declaration of one kernel driver image.
#[derive(Debug, Clone)]
pub struct DriverPipeline {
    image: String,
    object: Input,
    base_dir: PathBuf,
    kernel: KernelImage,
    defines: Vec<String>,
}

impl DriverPipeline {
    /// A driver image linked from `object` with the default kernel settings.
    pub fn new(image: impl Into<String>, object: Input) -> Self {
        DriverPipeline {
            image: image.into(),
            object,
            base_dir: PathBuf::new(),
            kernel: KernelImage::default(),
            defines: KERNEL_DEFINES.iter().map(|d| d.to_string()).collect(),
        }
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn kernel(mut self, kernel: KernelImage) -> Self {
        self.kernel = kernel;
        self
    }

    /// Replace the defines appended by the final link stage.
    pub fn defines(mut self, defines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.defines = defines.into_iter().map(Into::into).collect();
        self
    }

    /// Stage names, derived from the driver object's name.
    pub fn stages(&self) -> DriverStages {
        let source = match &self.object {
            Input::Target(name) => Path::new(name),
            Input::Path { path, .. } => path.as_path(),
        };
        let stem = source
            .file_stem()
            .or_else(|| Path::new(&self.image).file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.image.clone());

        DriverStages {
            base_file: format!("{}.base.tmp", stem),
            exports: format!("{}.base.exp", stem),
            image: self.image.clone(),
        }
    }

    /// Register the three stages.
    pub fn register(&self, graph: &mut GraphBuilder) -> Result<DriverStages, GraphError> {
        let stages = self.stages();

        graph.register(
            stages.base_file.clone(),
            TargetDecl::new(Tool::Script(self.trial_link_script()))
                .input(self.object.clone())
                .base_dir(&self.base_dir),
        )?;

        graph.register(
            stages.exports.clone(),
            TargetDecl::new(Tool::Script(self.export_script()))
                .input(Input::target(&stages.base_file))
                .base_dir(&self.base_dir),
        )?;

        let layer = Layer::new()
            .override_with(keys::STRIP, true)
            .append(keys::DEFINES, self.defines.iter().cloned());
        graph.register(
            stages.image.clone(),
            TargetDecl::new(Tool::Script(self.final_link_script()))
                .input(Input::target(&stages.exports))
                .input(self.object.clone())
                .options(layer)
                .base_dir(&self.base_dir),
        )?;

        tracing::debug!(
            "registered driver pipeline {} -> {} -> {}",
            stages.base_file,
            stages.exports,
            stages.image
        );
        Ok(stages)
    }

    fn trial_link_script(&self) -> Script {
        let kernel = self.kernel.clone();
        Script::new("driver trial link", move |tools, run| {
            let gcc = tools.tool("gcc")?;
            let junk = junk_path(run.output);
            let mut words = vec![
                shell_quote(&gcc),
                shell_quote(format!("-Wl,--base-file,{}", run.output.display())),
                shell_quote(kernel.entry_flag()),
                "-nostartfiles".to_string(),
                "-nostdlib".to_string(),
                "-o".to_string(),
                shell_quote(&junk),
            ];
            words.extend(objects(run, 0)?);
            words.extend(kernel.lib_flags());
            Ok(format!("{} ; rm -f {}", words.join(" "), shell_quote(&junk)))
        })
    }

    fn export_script(&self) -> Script {
        let image = self.image.clone();
        Script::new("driver export synthesis", move |tools, run| {
            let dlltool = tools.tool("dlltool")?;
            Ok(format!(
                "{} --dllname {} --base-file {} --output-exp {}",
                shell_quote(&dlltool),
                shell_quote(&image),
                shell_quote(run.input(0)?),
                shell_quote(run.output)
            ))
        })
    }

    fn final_link_script(&self) -> Script {
        let kernel = self.kernel.clone();
        Script::new("driver final link", move |tools, run| {
            let gcc = tools.tool("gcc")?;
            let exports = run.input(0)?;

            let mut words = vec![shell_quote(&gcc)];
            words.extend(kernel.image_flags().into_iter().map(shell_quote));
            words.push(shell_quote(format!("-Wl,{}", exports.display())));
            words.extend(kernel.freestanding_flags());
            if run.options.strip()? {
                words.push("-s".to_string());
            }
            for (name, value) in run.options.defines() {
                words.push(shell_quote(match value {
                    Some(v) => format!("-D{}={}", name, v),
                    None => format!("-D{}", name),
                }));
            }
            words.push("-o".to_string());
            words.push(shell_quote(run.output));
            words.extend(objects(run, 1)?);
            words.extend(kernel.lib_flags());
            Ok(words.join(" "))
        })
    }
}

/// Where the trial link writes the binary it throws away.
fn junk_path(base_file: &Path) -> PathBuf {
    let mut junk = base_file.as_os_str().to_owned();
    junk.push(".junk");
    PathBuf::from(junk)
}

/// Quoted driver objects: every input from `skip` on.
fn objects(run: &RunInfo<'_>, skip: usize) -> Result<Vec<String>, BuildError> {
    let objects = run.inputs.get(skip..).unwrap_or_default();
    if objects.is_empty() {
        return Err(BuildError::Script {
            target: run.target.to_string(),
            message: "driver object is missing".to_string(),
        });
    }
    Ok(objects.iter().map(shell_quote).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::toolchain::{CrossToolchain, ToolchainContext};
    use crate::core::options::Options;

    fn command(graph: &crate::graph::TargetGraph, name: &str, inputs: &[PathBuf], defaults: &Options) -> String {
        let target = graph.get(name).unwrap();
        let Tool::Script(script) = target.tool() else {
            panic!("{} is not a script", name);
        };
        let tools = CrossToolchain::new();
        let ctx = ToolchainContext::cross("i686-pc-mingw32", Some(PathBuf::from("/opt/mingw")));
        let options = target.effective_options(defaults);
        let output = PathBuf::from("/out").join(name);
        let run = RunInfo {
            target: name,
            inputs,
            output: &output,
            options: &options,
            root: Path::new("/src"),
            dir: Path::new("/src/driver"),
        };
        script.command(&tools.bind(&ctx), &run).unwrap()
    }

    fn pipeline_graph() -> (crate::graph::TargetGraph, DriverStages) {
        let mut builder = GraphBuilder::new();
        builder
            .register("driver.o", TargetDecl::new(Tool::Linker).base_dir("src/driver"))
            .unwrap();
        let stages = DriverPipeline::new("linux.sys", Input::target("driver.o"))
            .base_dir("src/driver")
            .register(&mut builder)
            .unwrap();
        (builder.finish().unwrap(), stages)
    }

    #[test]
    fn test_stage_names_follow_object() {
        let (graph, stages) = pipeline_graph();

        assert_eq!(stages.names(), ["driver.base.tmp", "driver.base.exp", "linux.sys"]);
        assert_eq!(
            graph.resolve("linux.sys").unwrap(),
            vec!["driver.o", "driver.base.tmp", "driver.base.exp", "linux.sys"]
        );
    }

    #[test]
    fn test_trial_link_command() {
        let (graph, _) = pipeline_graph();
        let cmd = command(&graph, "driver.base.tmp", &[PathBuf::from("/out/driver.o")], &Options::empty());

        assert_eq!(
            cmd,
            "/opt/mingw/bin/i686-pc-mingw32-gcc -Wl,--base-file,/out/driver.base.tmp \
             -Wl,--entry,_DriverEntry@8 -nostartfiles -nostdlib -o /out/driver.base.tmp.junk \
             /out/driver.o -lntoskrnl -lhal -lgcc ; rm -f /out/driver.base.tmp.junk"
        );
    }

    #[test]
    fn test_export_command() {
        let (graph, _) = pipeline_graph();
        let cmd = command(
            &graph,
            "driver.base.exp",
            &[PathBuf::from("/out/driver.base.tmp")],
            &Options::empty(),
        );

        assert_eq!(
            cmd,
            "/opt/mingw/bin/i686-pc-mingw32-dlltool --dllname linux.sys \
             --base-file /out/driver.base.tmp --output-exp /out/driver.base.exp"
        );
    }

    #[test]
    fn test_final_link_command() {
        let (graph, _) = pipeline_graph();
        let defaults = Options::empty().compose(&Layer::new().append(keys::DEFINES, ["COLINUX"]));
        let cmd = command(
            &graph,
            "linux.sys",
            &[PathBuf::from("/out/driver.base.exp"), PathBuf::from("/out/driver.o")],
            &defaults,
        );

        assert_eq!(
            cmd,
            "/opt/mingw/bin/i686-pc-mingw32-gcc -Wl,--subsystem,native -Wl,--image-base,0x10000 \
             -Wl,--file-alignment,0x1000 -Wl,--section-alignment,0x1000 -Wl,--entry,_DriverEntry@8 \
             -Wl,/out/driver.base.exp -mdll -nostartfiles -nostdlib -s -DCOLINUX -D__KERNEL__ \
             -DCO_KERNEL -DCO_HOST_KERNEL -o /out/linux.sys /out/driver.o -lntoskrnl -lhal -lgcc"
        );
    }

    #[test]
    fn test_duplicate_image_name_fails() {
        let mut builder = GraphBuilder::new();
        builder.register("linux.sys", TargetDecl::new(Tool::Empty)).unwrap();

        let err = DriverPipeline::new("linux.sys", Input::path("driver.o"))
            .register(&mut builder)
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateTarget { name: "linux.sys".into() });
    }

    #[test]
    fn test_custom_kernel_image() {
        let kernel = KernelImage {
            image_base: 0x20000,
            libs: vec!["ntoskrnl".into()],
            ..KernelImage::default()
        };

        assert!(kernel.link_flags().contains(&"-Wl,--image-base,0x20000".to_string()));
        assert_eq!(kernel.lib_flags(), vec!["-lntoskrnl"]);
    }
}
