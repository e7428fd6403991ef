//! `comake build` command

use std::collections::{BTreeSet, HashSet};
use std::time::Instant;

use anyhow::{bail, Result};

use crate::cli::{BuildArgs, GlobalArgs, MessageFormat};
use crate::commands::{shell_with_format, Project};
use comake::builder::{BuildEvent, Evaluation, TargetFailure};
use comake::core::tool::Tool;
use comake::graph::TargetGraph;
use comake::util::diagnostic::emit;
use comake::util::shell::{format_duration, Progress, Shell, Status};

pub fn execute(args: BuildArgs, global: &GlobalArgs) -> Result<()> {
    let shell = shell_with_format(global, args.message_format == MessageFormat::Json);
    let project = Project::load(global.file.as_deref())?;
    let graph = &project.buildfile.graph;

    let mut ctx = project.build_context().with_force(args.force);
    if let Some(jobs) = args.jobs {
        ctx = ctx.with_jobs(jobs);
    }

    let roots = match args.target {
        Some(target) => vec![target],
        None => project.buildfile.default_targets(),
    };
    if roots.is_empty() {
        shell.warn("no targets declared; nothing to build");
        return Ok(());
    }

    // Resolve every root up front so structural errors abort before any tool runs.
    let mut total = BTreeSet::new();
    for root in &roots {
        total.extend(graph.resolve(root)?);
    }

    let start = Instant::now();
    let progress = shell.progress(total.len() as u64, "Building");
    let evaluation = Evaluation::new(graph, &ctx)?
        .with_observer(|event| on_event(&shell, &progress, graph, event));

    let mut failures: Vec<TargetFailure> = Vec::new();
    let mut seen = HashSet::new();
    for root in &roots {
        let report = evaluation.evaluate(root)?;
        for failure in report.failures {
            if seen.insert(failure.target.clone()) {
                failures.push(failure);
            }
        }
    }
    progress.finish();

    if !failures.is_empty() {
        if !shell.is_json() {
            for failure in &failures {
                emit(&failure.error.to_diagnostic(), shell.use_color());
            }
        }
        bail!(
            "could not build {}: {} target(s) failed",
            roots.join(", "),
            failures.len()
        );
    }

    shell.status(
        Status::Finished,
        format!("{} in {}", roots.join(", "), format_duration(start.elapsed())),
    );
    Ok(())
}

fn on_event(shell: &Shell, progress: &Progress, graph: &TargetGraph, event: &BuildEvent) {
    if shell.is_json() {
        shell.json_event(event);
        return;
    }

    progress.suspend(|| match event {
        BuildEvent::TargetStarted { target, .. } if shell.is_verbose() => {
            shell.status(Status::Running, target);
        }
        BuildEvent::TargetFinished { target, fresh, .. } => {
            progress.inc(1);
            let aggregate = matches!(graph.get(target).map(|t| t.tool()), Some(Tool::Empty));
            if *fresh {
                if shell.is_verbose() {
                    shell.status(Status::Fresh, target);
                }
            } else if !aggregate {
                shell.status(Status::Building, target);
            }
        }
        BuildEvent::TargetFailed { target, .. } => {
            progress.inc(1);
            shell.status(Status::Failed, target);
        }
        BuildEvent::TargetSkipped {
            target,
            failed_dependency,
        } => {
            progress.inc(1);
            shell.status(
                Status::Skipped,
                format!("{} (dependency `{}` failed)", target, failed_dependency),
            );
        }
        _ => {}
    });
}
