//! Review command implementation.
//!
//! The `zendeploy review` command shows what a run would do without
//! fetching or executing anything.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cli::args::ReviewArgs;
use crate::error::Result;
use crate::steps::{Step, StepStore};
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};
use super::display::{config_failure, issue_line, load_steps};

/// The review command implementation.
pub struct ReviewCommand {
    args: ReviewArgs,
}

#[derive(Serialize)]
struct ReviewOutput<'a> {
    valid: bool,
    steps: &'a [Step],
    merged_env: BTreeMap<String, String>,
    issues: Vec<String>,
}

impl ReviewCommand {
    /// Create a new review command.
    pub fn new(args: ReviewArgs) -> Self {
        Self { args }
    }

    fn show_json(&self, store: &StepStore, ui: &mut dyn UserInterface) -> Result<()> {
        let output = ReviewOutput {
            valid: store.validate(),
            steps: store.steps(),
            merged_env: store.merged_env(),
            issues: store.validation_errors().iter().map(issue_line).collect(),
        };
        let json = serde_json::to_string_pretty(&output).map_err(anyhow::Error::from)?;
        ui.message(&json);
        Ok(())
    }

    fn show_text(&self, store: &StepStore, ui: &mut dyn UserInterface) {
        ui.show_header("Pipeline review");

        for step in store.steps() {
            ui.message(&format!("Step {}: {}", step.number(), step.name));
            ui.message(&format!("  File:        {}", step.source_path.display()));
            ui.message(&format!("  AWS profile: {}", step.aws_profile));
            ui.message(&format!("  Repository:  {}", step.repo_ref));
            if !step.ssh_key_path.is_empty() {
                ui.message(&format!("  SSH key:     {}", step.ssh_key_path));
            }
            ui.message(&format!("  Script:      {}", step.script_path));
            for (key, value) in &step.env_vars {
                ui.message(&format!("  {}={}", key, value));
            }
            ui.message("");
        }

        let merged = store.merged_env();
        if !merged.is_empty() {
            ui.message("Merged environment:");
            for (key, value) in &merged {
                ui.message(&format!("  {}={}", key, value));
            }
        }

        let issues = store.validation_errors();
        if issues.is_empty() {
            ui.success(&format!("{} steps ready to run", store.len()));
        } else {
            for issue in &issues {
                ui.warning(&issue_line(issue));
            }
        }
    }
}

impl Command for ReviewCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let store = match load_steps(&self.args.files, None) {
            Ok(store) => store,
            Err(e) => return config_failure(ui, e),
        };

        if self.args.json {
            self.show_json(&store, ui)?;
        } else {
            self.show_text(&store, ui);
        }
        Ok(CommandResult::success())
    }
}
