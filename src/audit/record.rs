//! Audit record rendering.

use chrono::{DateTime, Local};

const SEPARATOR_WIDTH: usize = 50;

/// What an audit record describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    /// Something the runner did.
    Action { action: String, details: String },
    /// Output captured from a step.
    Output {
        step: String,
        command: String,
        output: String,
    },
}

/// One entry of the session log.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    /// When the record was created.
    pub timestamp: DateTime<Local>,
    /// Who ran the session.
    pub actor: String,
    /// Record payload.
    pub kind: RecordKind,
}

impl AuditRecord {
    /// Create an action record stamped now.
    pub fn action(actor: &str, action: &str, details: &str) -> Self {
        Self {
            timestamp: Local::now(),
            actor: actor.to_string(),
            kind: RecordKind::Action {
                action: action.to_string(),
                details: details.to_string(),
            },
        }
    }

    /// Create an output record stamped now.
    pub fn output(actor: &str, step: &str, command: &str, output: &str) -> Self {
        Self {
            timestamp: Local::now(),
            actor: actor.to_string(),
            kind: RecordKind::Output {
                step: step.to_string(),
                command: command.to_string(),
                output: output.to_string(),
            },
        }
    }

    /// Render the complete text block written to the log.
    pub fn render(&self) -> String {
        let ts = iso8601(&self.timestamp);
        match &self.kind {
            RecordKind::Action { action, details } => {
                let mut line = format!("[ACTION] {} | {} | {}", ts, self.actor, action);
                if !details.is_empty() {
                    line.push_str(" | ");
                    line.push_str(details);
                }
                line.push('\n');
                line
            }
            RecordKind::Output {
                step,
                command,
                output,
            } => format!(
                "\n[STEP] Step: {}\nTimestamp: {}\nCommand: {}\nOutput:\n{}\n{}\n",
                step,
                ts,
                command,
                output,
                "-".repeat(SEPARATOR_WIDTH)
            ),
        }
    }
}

/// Session start banner.
pub fn start_banner(at: &DateTime<Local>, actor: &str) -> String {
    format!(
        "=== ZenDeploy Session Started: {} ===\nUser: {}\n{}\n\n",
        iso8601(at),
        actor,
        "=".repeat(SEPARATOR_WIDTH)
    )
}

/// Session end banner, optionally naming the error that ended it.
pub fn end_banner(at: &DateTime<Local>, error: Option<&str>) -> String {
    let mut banner = format!("\n=== ZenDeploy Session Ended: {} ===\n", iso8601(at));
    if let Some(error) = error {
        banner.push_str(&format!("Session ended with error: {}\n", error));
    }
    banner.push_str(&"=".repeat(SEPARATOR_WIDTH));
    banner.push('\n');
    banner
}

/// Local ISO-8601 timestamp with microseconds.
pub fn iso8601(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}
