//! Version reporting.

use serde::Serialize;

/// Current version of zendeploy.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LABEL: &str = "Powered by";

/// Version details shown by `zendeploy about`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    /// Caption shown before the version.
    pub label: String,
    /// Version string.
    pub version: String,
    /// Whether the version string is well formed.
    pub is_valid: bool,
}

/// Source of version details.
pub trait VersionProvider {
    /// Current version details.
    fn version_info(&self) -> VersionInfo;
}

/// Reports the version this binary was built with.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildVersion;

impl VersionProvider for BuildVersion {
    fn version_info(&self) -> VersionInfo {
        VersionInfo {
            label: LABEL.to_string(),
            version: VERSION.to_string(),
            is_valid: is_valid_version(VERSION),
        }
    }
}

/// Check for `major.minor.patch` with an optional `-prerelease` suffix.
fn is_valid_version(version: &str) -> bool {
    let core = version.split_once('-').map_or(version, |(core, _)| core);
    let parts: Vec<&str> = core.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}
