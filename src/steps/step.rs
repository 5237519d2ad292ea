//! A deployment step loaded from its definition file.

use crate::config::{load_step_definition, StepDefinition};
use crate::error::{Result, ZenDeployError};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

static ENV_KEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// One unit of the deployment pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    /// Definition file this step was loaded from (unique within a store).
    pub source_path: PathBuf,

    /// Position in the pipeline, 0-based.
    pub order: usize,

    /// Display name.
    pub name: String,

    /// AWS profile exported as `AWS_PROFILE`.
    pub aws_profile: String,

    /// Repository reference (`file://...` or SSH remote).
    pub repo_ref: String,

    /// SSH key for remote fetches.
    pub ssh_key_path: String,

    /// Script path relative to the repository root.
    pub script_path: String,

    /// Step environment.
    pub env_vars: BTreeMap<String, String>,
}

impl Step {
    /// Load a step from a definition file.
    pub fn from_file(path: &Path, order: usize) -> Result<Self> {
        let definition = load_step_definition(path)?;
        Self::from_definition(path, order, definition)
    }

    /// Build a step from an already parsed definition.
    pub fn from_definition(path: &Path, order: usize, definition: StepDefinition) -> Result<Self> {
        let config_error = |message: String| ZenDeployError::Config {
            path: path.to_path_buf(),
            message,
        };

        check_script_path(&definition.script_path).map_err(config_error)?;
        let env_vars = convert_env(&definition.env_vars).map_err(config_error)?;

        Ok(Self {
            source_path: path.to_path_buf(),
            order,
            name: definition
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("Step {}", order)),
            aws_profile: definition.aws_profile,
            repo_ref: definition.repo_url,
            ssh_key_path: definition.ssh_key,
            script_path: definition.script_path,
            env_vars,
        })
    }

    /// 1-based position used in frames and summaries.
    pub fn number(&self) -> usize {
        self.order + 1
    }

    /// Required fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.aws_profile.trim().is_empty() {
            missing.push("aws_profile");
        }
        if self.repo_ref.trim().is_empty() {
            missing.push("repo_url");
        }
        if self.script_path.trim().is_empty() {
            missing.push("script_path");
        }
        missing
    }

    /// Whether all required fields are set.
    pub fn is_valid(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

fn check_script_path(script_path: &str) -> std::result::Result<(), String> {
    let path = Path::new(script_path);
    if path.is_absolute() {
        return Err(format!(
            "script_path must be relative to the repository root: {}",
            script_path
        ));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(format!(
            "script_path must stay inside the repository: {}",
            script_path
        ));
    }
    Ok(())
}

fn convert_env(
    mapping: &serde_yaml::Mapping,
) -> std::result::Result<BTreeMap<String, String>, String> {
    let mut env = BTreeMap::new();

    for (key, value) in mapping {
        let key = key
            .as_str()
            .ok_or_else(|| format!("env_vars key must be a string: {:?}", key))?;
        if !ENV_KEY_REGEX.is_match(key) {
            return Err(format!("invalid environment variable name: {}", key));
        }

        let value = match value {
            serde_yaml::Value::String(s) => s.clone(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Null => String::new(),
            _ => return Err(format!("env_vars.{} must be a scalar value", key)),
        };

        env.insert(key.to_string(), value);
    }

    Ok(env)
}
