//! Terminal output.
//!
//! This module provides:
//! - [`UserInterface`] trait for UI abstraction
//! - [`TerminalUI`] for stdout
//! - [`MockUI`] for tests
//! - [`Transcript`] for saving the raw side of a run
//!
//! # Example
//!
//! ```
//! use zendeploy::ui::{MockUI, UserInterface};
//!
//! let mut ui = MockUI::new();
//! ui.show_header("ZenDeploy");
//! ui.success("Deployment complete");
//! assert!(ui.has_success("complete"));
//! ```

pub mod mock;
pub mod output;
pub mod terminal;
pub mod theme;
pub mod transcript;

pub use mock::MockUI;
pub use output::OutputMode;
pub use terminal::TerminalUI;
pub use theme::{should_use_colors, ZenTheme};
pub use transcript::Transcript;

use crate::runner::Frame;

/// Trait for user interface interactions.
///
/// This trait allows mocking the UI in tests.
pub trait UserInterface {
    /// Get the current output mode.
    fn output_mode(&self) -> OutputMode;

    /// Display a message to the user.
    fn message(&mut self, msg: &str);

    /// Display a success message.
    fn success(&mut self, msg: &str);

    /// Display a warning message.
    fn warning(&mut self, msg: &str);

    /// Display an error message.
    fn error(&mut self, msg: &str);

    /// Show a header/banner.
    fn show_header(&mut self, title: &str);

    /// Show one pipeline frame.
    fn frame(&mut self, frame: &Frame);
}
