//! Shared helpers for loading and displaying steps.
//!
//! Used by `run`, `review`, and `validate`.

use std::path::PathBuf;

use crate::audit::AuditLog;
use crate::error::{Result, ZenDeployError};
use crate::runner::{StepReport, StepStatus};
use crate::steps::{StepStore, ValidationIssue};
use crate::ui::UserInterface;

use super::dispatcher::{CommandResult, EXIT_CONFIG_ERROR};

/// Load step files into a store, in the order given.
///
/// Each added file is recorded as `included_file` when an audit log is given.
pub fn load_steps(files: &[PathBuf], audit: Option<&AuditLog>) -> Result<StepStore> {
    let mut store = StepStore::new();
    for file in files {
        let step = store.add(file)?;
        tracing::debug!("Loaded step {} from {}", step.name, file.display());
        if let Some(audit) = audit {
            audit.log_action("included_file", &file.display().to_string());
        }
    }
    Ok(store)
}

/// Report a configuration error and turn it into exit code 2.
///
/// Other errors are passed through.
pub fn config_failure(ui: &mut dyn UserInterface, err: ZenDeployError) -> Result<CommandResult> {
    if err.is_config_error() {
        ui.error(&err.to_string());
        Ok(CommandResult::failure(EXIT_CONFIG_ERROR))
    } else {
        Err(err)
    }
}

/// One line describing a validation issue.
pub fn issue_line(issue: &ValidationIssue) -> String {
    format!(
        "Step {} ({}): missing {}",
        issue.order + 1,
        issue.name,
        issue.missing.join(", ")
    )
}

/// Print every validation issue as an error.
pub fn show_validation_issues(ui: &mut dyn UserInterface, issues: &[ValidationIssue]) {
    for issue in issues {
        ui.error(&issue_line(issue));
    }
}

/// Print a step's final status, styled by severity.
pub fn show_step_report(ui: &mut dyn UserInterface, report: &StepReport) {
    let line = format!("  {}", report.summary_line());
    match report.status {
        StepStatus::Failed => ui.warning(&line),
        _ => ui.message(&line),
    }
}
