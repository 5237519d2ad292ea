//! Terminal UI.

use console::Term;
use std::io::Write;

use crate::runner::Frame;

use super::{should_use_colors, OutputMode, UserInterface, ZenTheme};

/// Terminal UI writing to stdout.
pub struct TerminalUI {
    term: Term,
    theme: ZenTheme,
    mode: OutputMode,
    colors: bool,
}

impl TerminalUI {
    /// Create a new terminal UI.
    pub fn new(mode: OutputMode) -> Self {
        let colors = should_use_colors();
        let theme = if colors {
            ZenTheme::new()
        } else {
            ZenTheme::plain()
        };

        Self {
            term: Term::stdout(),
            theme,
            mode,
            colors,
        }
    }

    /// Text written for `frame` in the current mode.
    fn render(&self, frame: &Frame) -> String {
        match self.mode {
            OutputMode::Raw => frame.raw.clone(),
            _ if self.colors => frame.formatted.clone(),
            _ => console::strip_ansi_codes(&frame.formatted).into_owned(),
        }
    }
}

impl UserInterface for TerminalUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn message(&mut self, msg: &str) {
        if self.mode.shows_status() {
            writeln!(self.term, "{}", msg).ok();
        }
    }

    fn success(&mut self, msg: &str) {
        if self.mode.shows_status() {
            writeln!(self.term, "{}", self.theme.format_success(msg)).ok();
        }
    }

    fn warning(&mut self, msg: &str) {
        if self.mode.shows_status() {
            writeln!(self.term, "{}", self.theme.format_warning(msg)).ok();
        }
    }

    fn error(&mut self, msg: &str) {
        writeln!(self.term, "{}", self.theme.format_error(msg)).ok();
    }

    fn show_header(&mut self, title: &str) {
        if self.mode.shows_status() {
            writeln!(self.term, "\n{}\n", self.theme.header.apply_to(title)).ok();
        }
    }

    fn frame(&mut self, frame: &Frame) {
        if self.mode.shows_frame(frame) {
            writeln!(self.term, "{}", self.render(frame)).ok();
        }
    }
}
