//! Configuration schema definitions for ZenDeploy.
//!
//! Two YAML documents are modelled here: the per-step definition file and
//! the optional settings file that tunes the runner.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One step definition file, as written by the user.
///
/// ```yaml
/// name: Deploy API
/// aws_profile: staging
/// repo_url: file://repos/api
/// ssh_key: ~/.ssh/deploy
/// script_path: scripts/deploy.sh
/// env_vars:
///   REGION: eu-west-1
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Display name (defaults to `Step {order}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// AWS profile exported to the script as `AWS_PROFILE`
    pub aws_profile: String,

    /// Repository reference: `file://<path>` or an SSH remote
    pub repo_url: String,

    /// SSH private key used for remote fetches
    pub ssh_key: String,

    /// Script to run, relative to the repository root
    pub script_path: String,

    /// Extra environment for the script. Scalars are stringified.
    #[serde(default, skip_serializing_if = "serde_yaml::Mapping::is_empty")]
    pub env_vars: serde_yaml::Mapping,
}

/// Runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory for session audit logs
    pub log_dir: PathBuf,

    /// Base directory for `file://` repository references (defaults to the project root)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_base_dir: Option<PathBuf>,

    /// Parent directory for ephemeral workspaces (defaults to the system temp dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<PathBuf>,

    /// Actor recorded in the audit log (defaults to `$USER`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    /// Per-step time limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_timeout_secs: Option<u64>,

    /// Whole-pipeline time limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_timeout_secs: Option<u64>,

    /// Mark a step failed when its script exits non-zero
    #[serde(default = "default_fail_on_script_error")]
    pub fail_on_script_error: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            repo_base_dir: None,
            workspace_dir: None,
            actor: None,
            step_timeout_secs: None,
            pipeline_timeout_secs: None,
            fail_on_script_error: default_fail_on_script_error(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_fail_on_script_error() -> bool {
    true
}

impl Settings {
    /// Per-step timeout as a duration.
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }

    /// Pipeline timeout as a duration.
    pub fn pipeline_timeout(&self) -> Option<Duration> {
        self.pipeline_timeout_secs.map(Duration::from_secs)
    }

    /// The actor name for audit records.
    pub fn resolve_actor(&self) -> String {
        self.actor
            .clone()
            .filter(|a| !a.trim().is_empty())
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
