//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Comake - a target-graph build orchestrator for cross-compiled suites
#[derive(Parser)]
#[command(name = "comake")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags accepted by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output (every command line)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Build file to use instead of searching for Comake.toml
    #[arg(short, long, global = true, value_name = "FILE")]
    pub file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a target and everything it depends on
    Build(BuildArgs),

    /// Print the resolved build order of a target
    Order(OrderArgs),

    /// List declared targets
    Targets,

    /// Validate the whole target graph
    Check,

    /// Show how logical tool names resolve
    Toolchain(ToolchainArgs),

    /// Remove the output directory
    Clean,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Target to build (defaults to `all`, or every top-level target)
    pub target: Option<String>,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Rebuild every target, ignoring fingerprints
    #[arg(long)]
    pub force: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    Human,
    Json,
}

#[derive(Args)]
pub struct OrderArgs {
    /// Target to resolve
    pub target: String,
}

#[derive(Args)]
pub struct ToolchainArgs {
    /// Resolve for this target triple instead of the configured one
    #[arg(long, value_name = "TRIPLE")]
    pub target: Option<String>,
}
