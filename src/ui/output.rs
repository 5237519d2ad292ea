//! Output mode.

use std::str::FromStr;

use crate::runner::{Frame, FrameKind};

/// How pipeline frames are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Styled frames.
    #[default]
    Normal,
    /// Plain transcript lines.
    Raw,
    /// Failures and the final summary only.
    Quiet,
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "raw" => Ok(Self::Raw),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("unknown output mode: {}", s)),
        }
    }
}

impl OutputMode {
    /// Whether this mode shows status messages.
    pub fn shows_status(&self) -> bool {
        !matches!(self, Self::Quiet)
    }

    /// Whether a frame is shown in this mode.
    pub fn shows_frame(&self, frame: &Frame) -> bool {
        match self {
            Self::Normal | Self::Raw => true,
            Self::Quiet => frame.kind == FrameKind::Summary || frame.is_failure(),
        }
    }
}
