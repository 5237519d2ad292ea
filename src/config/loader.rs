//! Settings discovery and step file loading.
//!
//! Settings are looked up in two places and merged, later overriding
//! earlier:
//! 1. User global settings (`~/.zendeploy/config.yml`)
//! 2. Project settings (`.zendeploy/config.yml`)

use crate::config::merger::merge_layers;
use crate::config::schema::{Settings, StepDefinition};
use crate::error::{Result, ZenDeployError};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory name holding ZenDeploy settings.
pub const CONFIG_DIR: &str = ".zendeploy";

/// Settings file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.yml";

/// Paths to settings files in merge order.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// User's global settings: ~/.zendeploy/config.yml
    pub user_global: Option<PathBuf>,

    /// Project settings: .zendeploy/config.yml
    pub project: Option<PathBuf>,
}

impl ConfigPaths {
    /// Discover settings files for the given project root.
    pub fn discover(project_root: &Path) -> Self {
        Self {
            user_global: Self::find_user_global(),
            project: existing(project_root.join(CONFIG_DIR).join(CONFIG_FILE)),
        }
    }

    fn find_user_global() -> Option<PathBuf> {
        existing(dirs::home_dir()?.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Returns all existing settings paths in merge order.
    pub fn all_existing(&self) -> Vec<&PathBuf> {
        self.user_global.iter().chain(self.project.iter()).collect()
    }
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    if path.exists() {
        Some(path)
    } else {
        None
    }
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ZenDeployError::ConfigNotFound {
                path: path.to_path_buf(),
            }
        } else {
            ZenDeployError::Io(e)
        }
    })
}

fn parse_value(content: &str, path: &Path) -> Result<serde_yaml::Value> {
    serde_yaml::from_str(content).map_err(|e| ZenDeployError::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load settings for a project.
///
/// With `config_override`, only that file is read (it must exist).
/// Otherwise the discovered files are merged; having none is fine and
/// yields the defaults.
pub fn load_settings(project_root: &Path, config_override: Option<&Path>) -> Result<Settings> {
    let (layers, report_path) = match config_override {
        Some(path) => (
            vec![parse_value(&read_file(path)?, path)?],
            path.to_path_buf(),
        ),
        None => {
            let paths = ConfigPaths::discover(project_root);
            let mut layers = Vec::new();
            for path in paths.all_existing() {
                layers.push(parse_value(&read_file(path)?, path)?);
            }
            (layers, project_root.join(CONFIG_DIR).join(CONFIG_FILE))
        }
    };

    let merged = merge_layers(&layers);
    let mut settings: Settings =
        serde_yaml::from_value(merged).map_err(|e| ZenDeployError::Config {
            path: report_path,
            message: e.to_string(),
        })?;

    if settings.repo_base_dir.is_none() {
        settings.repo_base_dir = Some(project_root.to_path_buf());
    }

    tracing::debug!("Loaded settings: {:?}", settings);
    Ok(settings)
}

/// Load and parse one step definition file.
///
/// # Errors
///
/// Returns `ConfigNotFound` if the file doesn't exist and `Config` if the
/// YAML is invalid or a required field is missing.
pub fn load_step_definition(path: &Path) -> Result<StepDefinition> {
    let content = read_file(path)?;
    serde_yaml::from_str(&content).map_err(|e| ZenDeployError::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
