//! Child process execution for deployment scripts.

pub mod script;

pub use script::{ScriptOptions, ScriptOutcome, ScriptOutput, ScriptRunner};
