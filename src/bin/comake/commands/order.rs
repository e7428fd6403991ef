//! `comake order` command

use anyhow::Result;

use crate::cli::{GlobalArgs, OrderArgs};
use crate::commands::Project;

pub fn execute(args: OrderArgs, global: &GlobalArgs) -> Result<()> {
    let project = Project::load(global.file.as_deref())?;

    for name in project.buildfile.graph.resolve(&args.target)? {
        println!("{}", name);
    }

    Ok(())
}
