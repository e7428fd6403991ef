//! `comake targets` command

use anyhow::Result;

use crate::cli::GlobalArgs;
use crate::commands::Project;

pub fn execute(global: &GlobalArgs) -> Result<()> {
    let project = Project::load(global.file.as_deref())?;
    let graph = &project.buildfile.graph;

    let width = graph.names().map(str::len).max().unwrap_or(0);
    for target in graph.targets() {
        let deps = graph.dependencies(&target.name)?;
        if deps.is_empty() {
            println!("{:<width$}  {}", target.name, target.tool().kind(), width = width);
        } else {
            println!(
                "{:<width$}  {:<8}  <- {}",
                target.name,
                target.tool().kind().as_str(),
                deps.join(", "),
                width = width
            );
        }
    }

    Ok(())
}
