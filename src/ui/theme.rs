//! Visual theme and styling.

use console::Style;

/// ZenDeploy's visual theme.
#[derive(Debug, Clone)]
pub struct ZenTheme {
    /// Style for success messages (green).
    pub success: Style,
    /// Style for warning messages (orange).
    pub warning: Style,
    /// Style for error messages (red bold).
    pub error: Style,
    /// Style for in-progress messages (yellow).
    pub info: Style,
    /// Style for step headers (blue bold).
    pub header: Style,
}

impl Default for ZenTheme {
    fn default() -> Self {
        Self::new()
    }
}

impl ZenTheme {
    /// Create the default theme; styling follows terminal detection.
    pub fn new() -> Self {
        Self {
            success: Style::new().green(),
            warning: Style::new().color256(208),
            error: Style::new().red().bold(),
            info: Style::new().yellow(),
            header: Style::new().blue().bold(),
        }
    }

    /// The default theme with styling applied even when stdout is not a TTY.
    ///
    /// Used for the formatted half of frames, whose consumer decides whether
    /// to show it.
    pub fn forced() -> Self {
        let theme = Self::new();
        Self {
            success: theme.success.force_styling(true),
            warning: theme.warning.force_styling(true),
            error: theme.error.force_styling(true),
            info: theme.info.force_styling(true),
            header: theme.header.force_styling(true),
        }
    }

    /// Create a theme without colors (for non-TTY or --no-color).
    pub fn plain() -> Self {
        Self {
            success: Style::new(),
            warning: Style::new(),
            error: Style::new(),
            info: Style::new(),
            header: Style::new(),
        }
    }

    /// Format a success message (icon + text in green).
    pub fn format_success(&self, msg: &str) -> String {
        format!("{}", self.success.apply_to(format!("✓ {}", msg)))
    }

    /// Format a warning message (icon + text in orange).
    pub fn format_warning(&self, msg: &str) -> String {
        format!("{}", self.warning.apply_to(format!("⚠ {}", msg)))
    }

    /// Format an error message (icon + text in red bold).
    pub fn format_error(&self, msg: &str) -> String {
        format!("{}", self.error.apply_to(format!("✗ {}", msg)))
    }

    /// Format an in-progress message.
    pub fn format_info(&self, msg: &str) -> String {
        format!("{}", self.info.apply_to(msg))
    }

    /// Format a step header.
    pub fn format_step(&self, number: usize, name: &str) -> String {
        format!("{}", self.header.apply_to(format!("Step {}: {}", number, name)))
    }
}

/// Check if colors should be enabled.
pub fn should_use_colors() -> bool {
    // Check NO_COLOR env var (https://no-color.org/)
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    console::Term::stdout().is_term()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_formats_success() {
        let msg = ZenTheme::plain().format_success("Repository cloned successfully");
        assert_eq!(msg, "✓ Repository cloned successfully");
    }

    #[test]
    fn theme_formats_error() {
        let msg = ZenTheme::plain().format_error("Failed");
        assert_eq!(msg, "✗ Failed");
    }

    #[test]
    fn theme_formats_step() {
        let msg = ZenTheme::plain().format_step(2, "Deploy API");
        assert_eq!(msg, "Step 2: Deploy API");
    }

    #[test]
    fn forced_theme_emits_ansi() {
        let msg = ZenTheme::forced().format_error("Failed");
        assert!(msg.contains("\u{1b}["));
        assert_eq!(console::strip_ansi_codes(&msg), "✗ Failed");
    }
}
