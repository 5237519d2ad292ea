//! Command dispatching.
//!
//! This module provides the core command infrastructure:
//! - [`Command`] trait for implementing commands
//! - [`CommandResult`] for uniform result reporting
//! - [`CommandDispatcher`] for routing CLI subcommands

use std::path::{Path, PathBuf};

use crate::cli::args::{Cli, Commands};
use crate::config::{load_settings, Settings};
use crate::error::Result;
use crate::ui::UserInterface;

/// Exit code for a failed pipeline or invalid steps.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for unreadable or malformed configuration.
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Trait for command implementations.
///
/// Each CLI subcommand implements this trait to provide its execution logic.
pub trait Command {
    /// Execute the command.
    ///
    /// # Arguments
    ///
    /// * `ui` - User interface for displaying output
    ///
    /// # Returns
    ///
    /// A [`CommandResult`] indicating success/failure and exit code.
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult>;
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult {
    /// Whether the command succeeded.
    pub success: bool,

    /// Exit code to use (0 for success, non-zero for failure).
    pub exit_code: i32,
}

impl CommandResult {
    /// Create a successful result.
    pub fn success() -> Self {
        Self {
            success: true,
            exit_code: 0,
        }
    }

    /// Create a failure result.
    pub fn failure(exit_code: i32) -> Self {
        Self {
            success: false,
            exit_code,
        }
    }
}

/// Dispatches CLI commands to their implementations.
pub struct CommandDispatcher {
    project_root: PathBuf,
    config_path: Option<PathBuf>,
    log_dir: Option<PathBuf>,
}

impl CommandDispatcher {
    /// Create a new dispatcher for the given project root.
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            project_root,
            config_path: None,
            log_dir: None,
        }
    }

    /// Use a single settings file instead of the discovered layers.
    pub fn with_config(mut self, config_path: Option<PathBuf>) -> Self {
        self.config_path = config_path;
        self
    }

    /// Override the audit log directory.
    pub fn with_log_dir(mut self, log_dir: Option<PathBuf>) -> Self {
        self.log_dir = log_dir;
        self
    }

    /// Get the project root path.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Load settings and apply global overrides.
    ///
    /// A relative log directory is resolved against the project root.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = load_settings(&self.project_root, self.config_path.as_deref())?;
        if let Some(log_dir) = &self.log_dir {
            settings.log_dir = log_dir.clone();
        }
        if settings.log_dir.is_relative() {
            settings.log_dir = self.project_root.join(&settings.log_dir);
        }
        Ok(settings)
    }

    /// Dispatch and execute a command.
    ///
    /// Routes the CLI subcommand to the appropriate command implementation
    /// and executes it.
    pub fn dispatch(&self, cli: &Cli, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        match &cli.command {
            Commands::Run(args) => {
                let settings = match self.settings() {
                    Ok(settings) => settings,
                    Err(e) if e.is_config_error() => {
                        ui.error(&e.to_string());
                        return Ok(CommandResult::failure(EXIT_CONFIG_ERROR));
                    }
                    Err(e) => return Err(e),
                };
                let cmd = super::run::RunCommand::new(&self.project_root, settings, args.clone());
                cmd.execute(ui)
            }
            Commands::Review(args) => {
                let cmd = super::review::ReviewCommand::new(args.clone());
                cmd.execute(ui)
            }
            Commands::Validate(args) => {
                let cmd = super::validate::ValidateCommand::new(args.clone());
                cmd.execute(ui)
            }
            Commands::About => {
                let cmd = super::about::AboutCommand::new(crate::version::BuildVersion);
                cmd.execute(ui)
            }
            Commands::Completions(args) => {
                let cmd = super::completions::CompletionsCommand::new(args.clone());
                cmd.execute(ui)
            }
        }
    }
}
