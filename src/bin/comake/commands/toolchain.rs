//! `comake toolchain` command

use anyhow::Result;

use crate::cli::{GlobalArgs, ToolchainArgs};
use crate::commands::Project;
use comake::builder::toolchain::{locate, ToolchainContext};

pub fn execute(args: ToolchainArgs, global: &GlobalArgs) -> Result<()> {
    let project = Project::load(global.file.as_deref())?;
    let config = &project.config;

    let context = match args.target {
        Some(target) => ToolchainContext::cross(target, config.toolchain.prefix.clone()),
        None => config.toolchain_context(),
    };
    let toolchain = config.cross_toolchain();

    println!("Toolchain: {}", context);
    if let Some(prefix) = &context.prefix {
        println!("Prefix:    {}", prefix.display());
    }
    println!();

    let resolved = toolchain.resolve_all(&context);
    let width = resolved.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, path) in resolved {
        let origin = if toolchain.bindings().contains_key(&name) {
            " (configured)"
        } else {
            ""
        };
        let status = match locate(&path) {
            Some(_) => "found",
            None => "missing",
        };
        println!(
            "  {:<width$}  {}{}  [{}]",
            name,
            path.display(),
            origin,
            status,
            width = width
        );
    }

    Ok(())
}
