//! Repository references.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, ZenDeployError};

const LOCAL_PREFIX: &str = "file://";

/// Where a step's repository comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoRef {
    /// `file://<path>`, resolved against the repository base directory.
    Local(PathBuf),
    /// Anything else, handed to `git clone` as-is.
    Remote(String),
}

impl RepoRef {
    /// Parse a reference string.
    ///
    /// ```
    /// use zendeploy::fetch::RepoRef;
    /// use std::path::PathBuf;
    ///
    /// assert_eq!(
    ///     RepoRef::parse("file://repos/api").unwrap(),
    ///     RepoRef::Local(PathBuf::from("repos/api"))
    /// );
    /// assert!(matches!(
    ///     RepoRef::parse("git@github.com:org/api.git").unwrap(),
    ///     RepoRef::Remote(_)
    /// ));
    /// ```
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ZenDeployError::Fetch {
                reference: String::new(),
                message: "Repository reference is empty".to_string(),
            });
        }

        match reference.strip_prefix(LOCAL_PREFIX) {
            Some("") => Err(ZenDeployError::Fetch {
                reference: reference.to_string(),
                message: "Local repository path is empty".to_string(),
            }),
            Some(path) => Ok(RepoRef::Local(PathBuf::from(path))),
            None => Ok(RepoRef::Remote(reference.to_string())),
        }
    }

    /// Resolve a local reference against `base_dir`.
    ///
    /// Absolute paths are kept; relative ones are joined to `base_dir`.
    /// Remote references return `None`.
    pub fn local_path(&self, base_dir: &Path) -> Option<PathBuf> {
        match self {
            RepoRef::Local(path) if path.is_absolute() => Some(path.clone()),
            RepoRef::Local(path) => Some(base_dir.join(path)),
            RepoRef::Remote(_) => None,
        }
    }

    /// Whether this is a `file://` reference.
    pub fn is_local(&self) -> bool {
        matches!(self, RepoRef::Local(_))
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoRef::Local(path) => write!(f, "{}{}", LOCAL_PREFIX, path.display()),
            RepoRef::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
