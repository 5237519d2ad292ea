//! Plain-text transcript of a pipeline run.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::runner::Frame;

/// Writes the raw side of every frame to a file.
#[derive(Debug)]
pub struct Transcript {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Transcript {
    /// Create (or truncate) the transcript file.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Append one frame.
    pub fn write(&mut self, frame: &Frame) -> Result<()> {
        writeln!(self.writer, "{}", frame.raw)?;
        Ok(())
    }

    /// Flush buffered lines to disk.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        Ok(self.path)
    }

    /// Transcript location.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
