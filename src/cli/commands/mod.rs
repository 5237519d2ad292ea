//! CLI command implementations.
//!
//! Each command implements the [`Command`] trait, which provides a uniform
//! interface for executing commands and reporting results.
//!
//! Commands are dispatched via [`CommandDispatcher`], which loads settings
//! once and routes each subcommand (`zendeploy run`, `zendeploy review`)
//! to its implementation.

pub mod about;
pub mod completions;
pub mod dispatcher;
pub mod display;
pub mod review;
pub mod run;
pub mod validate;

pub use dispatcher::{Command, CommandDispatcher, CommandResult, EXIT_CONFIG_ERROR, EXIT_FAILURE};
