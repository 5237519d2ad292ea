//! Command-line interface for ZenDeploy.
//!
//! - [`args`] - Argument definitions using clap derive macros
//! - [`commands`] - Command implementations

pub mod args;
pub mod commands;

pub use args::{Cli, Commands, CompletionsArgs, ReviewArgs, RunArgs, ValidateArgs};
pub use commands::{Command, CommandDispatcher, CommandResult};
