//! Test utilities for comake unit tests.
//!
//! Real compilers are not assumed to be installed. Tests that run tool
//! targets bind logical names to [`fake_tool`] scripts, which log their
//! argument lists and write the concatenated contents of their existing-file
//! arguments to every output they are given.

use std::path::{Path, PathBuf};

use crate::builder::context::BuildContext;
#[cfg(unix)]
use crate::builder::toolchain::CrossToolchain;

/// Native build context rooted at `root`, writing to `<root>/build`.
pub fn test_context(root: &Path) -> BuildContext {
    BuildContext::new(root).with_jobs(2)
}

/// Write a `Comake.toml` into `dir` and return its path.
pub fn write_buildfile(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("Comake.toml");
    std::fs::write(&path, content).expect("failed to write Comake.toml");
    path
}

/// Install an executable stand-in for a GNU tool at `<dir>/bin/<name>`.
///
/// Outputs are the arguments following `-o` and `--output-exp`, and the path
/// in `-Wl,--base-file,<path>`. The argument after `--dllname` is ignored.
/// Every invocation appends its arguments to `<dir>/<name>.log`.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let bin = dir.join("bin");
    std::fs::create_dir_all(&bin).expect("failed to create fake tool dir");
    let log = dir.join(format!("{}.log", name));
    let script = format!(
        r#"#!/bin/sh
echo "$*" >> '{log}'
outs=""
content=""
next=""
for arg in "$@"; do
  case "$next" in
    out) outs="$outs $arg"; next=""; continue ;;
    skip) next=""; continue ;;
  esac
  case "$arg" in
    -o|--output-exp) next=out ;;
    --dllname) next=skip ;;
    -Wl,--base-file,*) outs="$outs ${{arg#-Wl,--base-file,}}" ;;
    *) if [ -f "$arg" ]; then content="$content$(cat "$arg")"; fi ;;
  esac
done
for out in $outs; do
  printf '%s' "$content" > "$out"
done
"#,
        log = log.display()
    );

    let path = bin.join(name);
    std::fs::write(&path, script).expect("failed to write fake tool");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("failed to mark fake tool executable");
    path
}

/// Toolchain binding `gcc`, `ld` and `dlltool` to fake tools under `dir`.
#[cfg(unix)]
pub fn fake_toolchain(dir: &Path) -> CrossToolchain {
    ["gcc", "ld", "dlltool"]
        .into_iter()
        .fold(CrossToolchain::new(), |tc, name| {
            tc.with_binding(name, fake_tool(dir, name))
        })
}

/// Argument lists a fake tool was invoked with, oldest first.
pub fn invocations(dir: &Path, name: &str) -> Vec<String> {
    std::fs::read_to_string(dir.join(format!("{}.log", name)))
        .map(|log| log.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
