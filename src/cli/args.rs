//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// ZenDeploy - Ordered deployment pipelines with an audit trail.
#[derive(Debug, Parser)]
#[command(name = "zendeploy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to settings file (overrides ~/.zendeploy and .zendeploy/config.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to project root (overrides current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Directory for session audit logs
    #[arg(long, global = true, env = "ZENDEPLOY_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the pipeline defined by the given step files
    Run(RunArgs),

    /// Show the steps and merged environment without running anything
    Review(ReviewArgs),

    /// Check step files for missing required fields
    Validate(ValidateArgs),

    /// Show version information
    About,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the `run` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RunArgs {
    /// Step definition files, in pipeline order
    #[arg(required = true, value_name = "STEP_FILE")]
    pub files: Vec<PathBuf>,

    /// Print the plain transcript instead of styled output
    #[arg(long, conflicts_with = "quiet")]
    pub raw: bool,

    /// Only print failures and the final summary
    #[arg(short, long)]
    pub quiet: bool,

    /// Also write the plain transcript to this file
    #[arg(long, value_name = "FILE")]
    pub transcript: Option<PathBuf>,

    /// Per-step time limit in seconds
    #[arg(long, value_name = "SECS")]
    pub step_timeout: Option<u64>,

    /// Whole-pipeline time limit in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Arguments for the `review` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ReviewArgs {
    /// Step definition files, in pipeline order
    #[arg(required = true, value_name = "STEP_FILE")]
    pub files: Vec<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ValidateArgs {
    /// Step definition files, in pipeline order
    #[arg(required = true, value_name = "STEP_FILE")]
    pub files: Vec<PathBuf>,
}

/// Arguments for the `completions` command.
#[derive(Debug, Clone, clap::Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
