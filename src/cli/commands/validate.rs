//! Validate command implementation.
//!
//! The `zendeploy validate` command checks step files for missing required
//! fields without running anything.

use crate::cli::args::ValidateArgs;
use crate::error::Result;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult, EXIT_FAILURE};
use super::display::{config_failure, load_steps, show_validation_issues};

/// The validate command implementation.
pub struct ValidateCommand {
    args: ValidateArgs,
}

impl ValidateCommand {
    /// Create a new validate command.
    pub fn new(args: ValidateArgs) -> Self {
        Self { args }
    }
}

impl Command for ValidateCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let store = match load_steps(&self.args.files, None) {
            Ok(store) => store,
            Err(e) => return config_failure(ui, e),
        };

        if store.validate() {
            ui.success(&format!("All {} steps are valid", store.len()));
            return Ok(CommandResult::success());
        }

        let issues = store.validation_errors();
        show_validation_issues(ui, &issues);
        ui.message(&format!("{} of {} steps invalid", issues.len(), store.len()));
        Ok(CommandResult::failure(EXIT_FAILURE))
    }
}
