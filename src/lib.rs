//! ZenDeploy - Ordered deployment pipelines with an audit trail.
//!
//! A pipeline is a list of step files. Each step names a repository, a
//! script inside it, an AWS profile, and extra environment. Running the
//! pipeline fetches every repository into a throwaway workspace, runs the
//! scripts in order, and streams what happens as display frames while an
//! append-only session log records who did what.
//!
//! # Modules
//!
//! - [`audit`] - Session audit log
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Settings and step definition loading
//! - [`error`] - Error types and result aliases
//! - [`fetch`] - Repository references and fetching
//! - [`runner`] - Pipeline executor and display frames
//! - [`shell`] - Script execution with streamed output
//! - [`steps`] - Step model and ordered step store
//! - [`ui`] - Terminal output, themes, and transcripts
//! - [`version`] - Version reporting
//!
//! # Example
//!
//! ```
//! use zendeploy::fetch::RepoRef;
//!
//! let reference = RepoRef::parse("file://repos/api").unwrap();
//! assert!(reference.is_local());
//! ```
//!
//! For running whole pipelines, see the integration tests.

pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod runner;
pub mod shell;
pub mod steps;
pub mod ui;
pub mod version;

pub use error::{Result, ZenDeployError};
