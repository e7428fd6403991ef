//! GNU compiler driver and linker command lines.

use std::path::{Path, PathBuf};

use crate::builder::driver::KernelImage;
use crate::core::options::{DefType, OptionError, Options};

use super::CommandSpec;

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// Command line for a Compiler step.
///
/// `<driver> [-c] [flags] [-D defines] <inputs> -o <output> [linker flags]
/// [-l libs] [-s]`. Driver images additionally get the kernel image flags and
/// kernel import libraries.
pub fn compile_command(
    driver: &Path,
    inputs: &[PathBuf],
    output: &Path,
    options: &Options,
) -> Result<CommandSpec, OptionError> {
    let def_type = options.def_type()?;
    let strip = options.strip()?;

    let mut cmd = CommandSpec::new(driver);

    if def_type == DefType::Object {
        cmd = cmd.arg("-c");
    }

    // Custom flags
    cmd = cmd.args(options.flags().iter().cloned());

    // Defines
    for (name, value) in options.defines() {
        match value {
            Some(v) => cmd = cmd.arg(format!("-D{}={}", name, v)),
            None => cmd = cmd.arg(format!("-D{}", name)),
        }
    }

    // Input and output
    cmd = cmd.args(inputs.iter().map(|p| path_arg(p)));
    cmd = cmd.arg("-o");
    cmd = cmd.arg(path_arg(output));

    let kernel = (def_type == DefType::Driver).then(KernelImage::default);
    if let Some(kernel) = &kernel {
        cmd = cmd.args(kernel.link_flags());
    }

    cmd = cmd.args(options.linker_flags().iter().cloned());

    // Libraries
    for lib in options.libs() {
        cmd = cmd.arg(format!("-l{}", lib));
    }
    if let Some(kernel) = &kernel {
        cmd = cmd.args(kernel.lib_flags());
    }

    if strip {
        cmd = cmd.arg("-s");
    }

    Ok(cmd)
}

/// Command line for a Linker step: a relocatable link of every input into one
/// object.
pub fn relocatable_link_command(
    ld: &Path,
    inputs: &[PathBuf],
    output: &Path,
    options: &Options,
) -> Result<CommandSpec, OptionError> {
    let mut cmd = CommandSpec::new(ld).arg("-r");

    cmd = cmd.args(options.linker_flags().iter().cloned());
    cmd = cmd.arg("-o");
    cmd = cmd.arg(path_arg(output));
    cmd = cmd.args(inputs.iter().map(|p| path_arg(p)));

    if options.strip()? {
        cmd = cmd.arg("--strip-debug");
    }

    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::options::{keys, Layer};

    fn options(layer: Layer) -> Options {
        Options::empty().compose(&layer)
    }

    #[test]
    fn test_object_compile() {
        let opts = options(
            Layer::new()
                .override_with(keys::DEF_TYPE, DefType::Object)
                .append(keys::FLAGS, ["-O2", "-mno-cygwin"])
                .append(keys::DEFINES, ["COLINUX", "VERSION=2"]),
        );

        let cmd = compile_command(
            Path::new("i686-pc-mingw32-gcc"),
            &[PathBuf::from("src/main.c")],
            Path::new("out/main.o"),
            &opts,
        )
        .unwrap();

        assert_eq!(cmd.program, PathBuf::from("i686-pc-mingw32-gcc"));
        assert_eq!(
            cmd.args,
            vec!["-c", "-O2", "-mno-cygwin", "-DCOLINUX", "-DVERSION=2", "src/main.c", "-o", "out/main.o"]
        );
    }

    #[test]
    fn test_executable_link_with_libs_and_strip() {
        let opts = options(
            Layer::new()
                .override_with(keys::STRIP, true)
                .append(keys::LINKER_FLAGS, ["-mwindows"])
                .append(keys::LIBS, ["user32", "gdi32"]),
        );

        let cmd = compile_command(
            Path::new("gcc"),
            &[PathBuf::from("a.o"), PathBuf::from("b.o")],
            Path::new("app.exe"),
            &opts,
        )
        .unwrap();

        assert_eq!(
            cmd.args,
            vec!["a.o", "b.o", "-o", "app.exe", "-mwindows", "-luser32", "-lgdi32", "-s"]
        );
    }

    #[test]
    fn test_driver_compile_adds_kernel_flags() {
        let opts = options(Layer::new().override_with(keys::DEF_TYPE, DefType::Driver));

        let cmd = compile_command(
            Path::new("gcc"),
            &[PathBuf::from("driver.o")],
            Path::new("linux.sys"),
            &opts,
        )
        .unwrap();

        assert!(cmd.args.contains(&"-Wl,--subsystem,native".to_string()));
        assert!(cmd.args.contains(&"-mdll".to_string()));
        assert_eq!(cmd.args.last().map(String::as_str), Some("-lgcc"));
    }

    #[test]
    fn test_invalid_def_type() {
        let opts = options(Layer::new().override_with(keys::DEF_TYPE, "dll"));
        assert!(compile_command(Path::new("gcc"), &[], Path::new("x"), &opts).is_err());
    }

    #[test]
    fn test_relocatable_link() {
        let opts = options(Layer::new().override_with(keys::STRIP, true));

        let cmd = relocatable_link_command(
            Path::new("ld"),
            &[PathBuf::from("a.o"), PathBuf::from("b.o")],
            Path::new("driver.o"),
            &opts,
        )
        .unwrap();

        assert_eq!(cmd.args, vec!["-r", "-o", "driver.o", "a.o", "b.o", "--strip-debug"]);
    }
}
