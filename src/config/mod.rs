//! Settings and step definition loading.
//!
//! - Schema definitions in [`schema`]
//! - File discovery and loading in [`loader`]
//! - Settings layering in [`merger`]
//!
//! # Example
//!
//! ```
//! use zendeploy::config::load_settings;
//! use tempfile::TempDir;
//! use std::fs;
//!
//! let temp = TempDir::new().unwrap();
//! fs::create_dir_all(temp.path().join(".zendeploy")).unwrap();
//! fs::write(temp.path().join(".zendeploy/config.yml"), "log_dir: audit").unwrap();
//!
//! let settings = load_settings(temp.path(), None).unwrap();
//! assert_eq!(settings.log_dir, std::path::PathBuf::from("audit"));
//! ```

pub mod loader;
pub mod merger;
pub mod schema;

pub use loader::{load_settings, load_step_definition, ConfigPaths, CONFIG_DIR, CONFIG_FILE};
pub use merger::{deep_merge, merge_layers};
pub use schema::{Settings, StepDefinition};
