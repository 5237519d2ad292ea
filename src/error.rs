//! Error types for ZenDeploy operations.
//!
//! This module defines [`ZenDeployError`], the primary error type used
//! throughout the crate, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Step-local failures (`Fetch`, `ScriptNotFound`, `ScriptExecution`) are
//!   reported as frames and never stop the pipeline
//! - `Unexpected` is fatal for the running pipeline
//! - Use `anyhow::Error` (via `ZenDeployError::Other`) for plumbing errors

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for ZenDeploy operations.
#[derive(Debug, Error)]
pub enum ZenDeployError {
    /// Settings or step file not found at expected location.
    #[error("Configuration not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Malformed step definition or settings file.
    #[error("Invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// The step file is already part of the pipeline.
    #[error("File {path} is already in ZenDeploy steps")]
    DuplicateStep { path: PathBuf },

    /// Repository fetch failed.
    #[error("Repository fetch failed for {reference}: {message}")]
    Fetch { reference: String, message: String },

    /// Script missing from the fetched repository.
    #[error("Script not found at {path}")]
    ScriptNotFound { path: PathBuf },

    /// Script could not be spawned or exited non-zero.
    #[error("Script execution failed for {script}: {message}")]
    ScriptExecution { script: String, message: String },

    /// Fault outside the step-local failure kinds; aborts the pipeline.
    #[error("Error in step {step}: {message}")]
    Unexpected { step: String, message: String },

    /// Executor operation called in the wrong lifecycle state.
    #[error("Executor is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: String,
    },

    /// Another pipeline already holds the execution slot.
    #[error("Another pipeline is already running in this process")]
    ExecutorBusy,

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ZenDeployError {
    /// Whether this error only fails the current step.
    pub fn is_step_local(&self) -> bool {
        matches!(
            self,
            ZenDeployError::Fetch { .. }
                | ZenDeployError::ScriptNotFound { .. }
                | ZenDeployError::ScriptExecution { .. }
        )
    }

    /// Whether this error comes from a step file or settings file.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ZenDeployError::Config { .. }
                | ZenDeployError::ConfigNotFound { .. }
                | ZenDeployError::DuplicateStep { .. }
        )
    }
}

/// Result type alias for ZenDeploy operations.
pub type Result<T> = std::result::Result<T, ZenDeployError>;
