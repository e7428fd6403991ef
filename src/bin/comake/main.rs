//! Comake CLI - target-graph build orchestrator

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use comake::builder::BuildError;
use comake::graph::GraphError;
use comake::util::diagnostic::{emit, Diagnostic};

fn main() {
    let cli = Cli::parse();

    let filter = if cli.global.verbose {
        EnvFilter::new("comake=debug")
    } else if cli.global.quiet {
        EnvFilter::new("comake=error")
    } else {
        EnvFilter::new("comake=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let color = !cli.global.no_color && std::io::stderr().is_terminal();
    if let Err(e) = run(cli) {
        emit(&diagnostic_for(&e), color);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let global = cli.global;
    match cli.command {
        Commands::Build(args) => commands::build::execute(args, &global),
        Commands::Order(args) => commands::order::execute(args, &global),
        Commands::Targets => commands::targets::execute(&global),
        Commands::Check => commands::check::execute(&global),
        Commands::Toolchain(args) => commands::toolchain::execute(args, &global),
        Commands::Clean => commands::clean::execute(&global),
    }
}

/// Render an error, using the structured diagnostic when one is available.
fn diagnostic_for(err: &anyhow::Error) -> Diagnostic {
    if let Some(e) = err.downcast_ref::<GraphError>() {
        return e.to_diagnostic();
    }
    if let Some(e) = err.downcast_ref::<BuildError>() {
        return e.to_diagnostic();
    }
    if let Some(e) = err.downcast_ref::<commands::BuildfileNotFound>() {
        return e.to_diagnostic();
    }
    Diagnostic::error(format!("{:#}", err))
}
