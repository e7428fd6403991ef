//! `comake clean` command

use anyhow::Result;

use crate::cli::GlobalArgs;
use crate::commands::{shell, Project};
use comake::util::fs::remove_dir_all_if_exists;
use comake::util::shell::Status;

pub fn execute(global: &GlobalArgs) -> Result<()> {
    let shell = shell(global);
    let project = Project::load(global.file.as_deref())?;
    let out_dir = project.build_context().out_dir;

    if remove_dir_all_if_exists(&out_dir)? {
        shell.status(Status::Removed, out_dir.display());
    } else {
        shell.note(format!("{} does not exist", out_dir.display()));
    }

    Ok(())
}
