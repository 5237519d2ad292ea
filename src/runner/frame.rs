//! Output frames produced while a pipeline runs.

use std::sync::LazyLock;

use serde::Serialize;

use crate::ui::theme::ZenTheme;

static THEME: LazyLock<ZenTheme> = LazyLock::new(ZenTheme::forced);

const SEPARATOR_WIDTH: usize = 40;

/// What a frame reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// Start of a step.
    StepHeader,
    /// Work in progress.
    Info,
    /// A command the runner is about to perform.
    Command,
    /// Something finished successfully.
    Success,
    /// Something failed.
    Failure,
    /// A line of script output.
    Output,
    /// End-of-step rule.
    Separator,
    /// Final pipeline status.
    Summary,
}

/// One unit of pipeline output: a styled line and its plain transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    /// Frame category.
    pub kind: FrameKind,
    /// ANSI-styled text for terminals.
    pub formatted: String,
    /// Plain text for transcripts.
    pub raw: String,
}

impl Frame {
    /// Build a frame from its parts.
    pub fn new(kind: FrameKind, formatted: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            kind,
            formatted: formatted.into(),
            raw: raw.into(),
        }
    }

    /// `Step N: name` header.
    pub fn step_header(number: usize, name: &str) -> Self {
        Self::new(
            FrameKind::StepHeader,
            THEME.format_step(number, name),
            format!("=== Step {}: {} ===", number, name),
        )
    }

    /// Work-in-progress message; the raw side is the same text.
    pub fn info(msg: &str) -> Self {
        Self::new(FrameKind::Info, THEME.format_info(msg), msg)
    }

    /// Announce a shell-like command, e.g. `export KEY=VALUE`.
    pub fn command(description: &str, command: &str) -> Self {
        Self::new(
            FrameKind::Command,
            THEME.format_info(description),
            format!("$ {}", command),
        )
    }

    /// Success message.
    pub fn success(msg: &str) -> Self {
        Self::new(FrameKind::Success, THEME.format_success(msg), msg)
    }

    /// Failure message; the raw side is prefixed with `ERROR:`.
    pub fn failure(msg: &str) -> Self {
        Self::new(
            FrameKind::Failure,
            THEME.format_error(msg),
            format!("ERROR: {}", msg),
        )
    }

    /// One line of script output, relayed unchanged.
    pub fn output(line: &str) -> Self {
        Self::new(FrameKind::Output, line, line)
    }

    /// `Step N completed successfully`.
    pub fn step_completed(number: usize) -> Self {
        Self::new(
            FrameKind::Success,
            THEME.format_success(&format!("Step {} completed successfully", number)),
            format!("=== Step {} Completed Successfully ===", number),
        )
    }

    /// `Step N failed`.
    pub fn step_failed(number: usize) -> Self {
        Self::new(
            FrameKind::Failure,
            THEME.format_error(&format!("Step {} failed", number)),
            format!("=== Step {} Failed ===", number),
        )
    }

    /// Horizontal rule closing a step.
    pub fn separator() -> Self {
        let rule = "-".repeat(SEPARATOR_WIDTH);
        Self::new(FrameKind::Separator, rule.clone(), rule)
    }

    /// Final status line.
    pub fn summary(msg: &str, success: bool) -> Self {
        let formatted = if success {
            THEME.format_success(msg)
        } else {
            THEME.format_error(msg)
        };
        Self::new(FrameKind::Summary, formatted, msg)
    }

    /// Whether this frame closes a step, successfully or not.
    pub fn ends_step(&self) -> bool {
        if !matches!(self.kind, FrameKind::Success | FrameKind::Failure) {
            return false;
        }
        let Some(rest) = self.raw.strip_prefix("=== Step ") else {
            return false;
        };
        let tail = rest.trim_start_matches(|c: char| c.is_ascii_digit());
        tail.len() < rest.len()
            && matches!(tail, " Completed Successfully ===" | " Failed ===")
    }

    /// Whether this frame reports a failure.
    pub fn is_failure(&self) -> bool {
        self.kind == FrameKind::Failure
            || (self.kind == FrameKind::Summary && self.formatted.contains('✗'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(frame: &Frame) -> String {
        console::strip_ansi_codes(&frame.formatted).to_string()
    }

    #[test]
    fn step_header_frame() {
        let frame = Frame::step_header(1, "Build");
        assert_eq!(frame.kind, FrameKind::StepHeader);
        assert_eq!(plain(&frame), "Step 1: Build");
        assert_eq!(frame.raw, "=== Step 1: Build ===");
    }

    #[test]
    fn command_frame_raw_has_prompt() {
        let frame = Frame::command("Setting REGION=eu-west-1", "export REGION=eu-west-1");
        assert_eq!(frame.raw, "$ export REGION=eu-west-1");
        assert_eq!(plain(&frame), "Setting REGION=eu-west-1");
    }

    #[test]
    fn failure_frame_raw_has_error_prefix() {
        let frame = Frame::failure("Failed to clone repository");
        assert_eq!(frame.raw, "ERROR: Failed to clone repository");
        assert_eq!(plain(&frame), "✗ Failed to clone repository");
        assert!(frame.is_failure());
    }

    #[test]
    fn output_frame_is_unstyled() {
        let frame = Frame::output("hello world");
        assert_eq!(frame.formatted, "hello world");
        assert_eq!(frame.raw, "hello world");
    }

    #[test]
    fn completion_frames() {
        assert_eq!(
            Frame::step_completed(2).raw,
            "=== Step 2 Completed Successfully ==="
        );
        assert_eq!(Frame::step_failed(3).raw, "=== Step 3 Failed ===");
        assert_eq!(Frame::separator().raw, "-".repeat(40));
    }

    #[test]
    fn only_completion_frames_end_a_step() {
        assert!(Frame::step_completed(1).ends_step());
        assert!(Frame::step_failed(12).ends_step());
        assert!(!Frame::step_header(1, "Failed").ends_step());
        assert!(!Frame::success("Repository cloned successfully").ends_step());
        assert!(!Frame::output("=== Step 1 Failed ===").ends_step());
        assert!(!Frame::failure("=== Step 1 Failed ===").ends_step());
    }

    #[test]
    fn summary_failure_detection() {
        assert!(Frame::summary("ZenDeploy completed with errors", false).is_failure());
        assert!(!Frame::summary("ZenDeploy completed successfully", true).is_failure());
    }
}
