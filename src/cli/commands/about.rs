//! About command implementation.

use crate::error::Result;
use crate::ui::UserInterface;
use crate::version::VersionProvider;

use super::dispatcher::{Command, CommandResult};

/// The about command implementation.
pub struct AboutCommand<P: VersionProvider> {
    provider: P,
}

impl<P: VersionProvider> AboutCommand<P> {
    /// Create a new about command.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The line shown to the user.
    pub fn version_line(&self) -> String {
        let info = self.provider.version_info();
        format!("{} ZenDeploy v{}", info.label, info.version)
    }
}

impl<P: VersionProvider> Command for AboutCommand<P> {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let info = self.provider.version_info();
        ui.message(&self.version_line());
        if !info.is_valid {
            ui.warning(&format!("Unrecognised version string: {}", info.version));
        }
        Ok(CommandResult::success())
    }
}
