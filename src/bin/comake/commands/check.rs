//! `comake check` command

use anyhow::Result;

use crate::cli::GlobalArgs;
use crate::commands::{shell, Project};
use comake::util::shell::Status;

pub fn execute(global: &GlobalArgs) -> Result<()> {
    let shell = shell(global);
    // Unknown references are rejected while loading.
    let project = Project::load(global.file.as_deref())?;
    let graph = &project.buildfile.graph;

    graph.validate()?;

    shell.status(
        Status::Finished,
        format!(
            "{}: {} target(s), {} driver(s), no cycles",
            project.buildfile.path.display(),
            graph.len(),
            project.buildfile.drivers.len()
        ),
    );
    Ok(())
}
