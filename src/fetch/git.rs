//! Repository fetching into isolated step directories.
//!
//! Local git work trees are cloned with `--no-hardlinks`, plain local
//! directories are copied, and remote references are cloned over SSH with
//! the step's key. Every branch writes what it does to the audit log.

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};

use crate::audit::AuditLog;
use crate::error::{Result, ZenDeployError};
use crate::runner::CancellationToken;

use super::reference::{expand_home, RepoRef};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a repository was materialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMethod {
    /// `git clone --no-hardlinks` of a local work tree.
    LocalClone,
    /// Recursive copy of a local directory without `.git`.
    LocalCopy,
    /// `git clone` of a remote over SSH.
    RemoteClone,
}

impl fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchMethod::LocalClone => write!(f, "local clone"),
            FetchMethod::LocalCopy => write!(f, "local copy"),
            FetchMethod::RemoteClone => write!(f, "remote clone"),
        }
    }
}

/// A repository checked out into a step directory.
#[derive(Debug, Clone)]
pub struct FetchedRepository {
    /// Root of the checkout.
    pub root: PathBuf,
    /// How it was fetched.
    pub method: FetchMethod,
    /// HEAD commit, when the checkout is a git repository.
    pub commit: Option<String>,
}

/// Fetches step repositories.
#[derive(Debug, Clone)]
pub struct RepositoryFetcher {
    base_dir: PathBuf,
    audit: Arc<AuditLog>,
    cancel: CancellationToken,
}

impl RepositoryFetcher {
    /// Create a fetcher resolving `file://` references against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, audit: Arc<AuditLog>) -> Self {
        Self {
            base_dir: base_dir.into(),
            audit,
            cancel: CancellationToken::new(),
        }
    }

    /// Kill any running git process once `cancel` is set.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Base directory for local references.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Fetch `reference` into `destination`.
    ///
    /// `destination` must be absent or an empty directory. A git clone still
    /// running at `deadline`, or when the cancellation token is set, is
    /// killed. Failures are audit-logged as `repo_clone_error` and returned
    /// as [`ZenDeployError::Fetch`].
    pub fn fetch(
        &self,
        reference: &str,
        ssh_key: &str,
        destination: &Path,
        deadline: Option<Instant>,
    ) -> Result<FetchedRepository> {
        let repo_ref = RepoRef::parse(reference).inspect_err(|e| {
            self.audit
                .log_action("repo_clone_error", &format!("Repository clone failed: {}", e));
        })?;

        let result = match &repo_ref {
            RepoRef::Local(_) => self.fetch_local(&repo_ref, destination, deadline),
            RepoRef::Remote(url) => self.fetch_remote(url, ssh_key, destination, deadline),
        };

        result.map_err(|e| {
            let message = format!("{:#}", e);
            self.audit.log_action(
                "repo_clone_error",
                &format!("Repository clone failed: {}", message),
            );
            ZenDeployError::Fetch {
                reference: reference.to_string(),
                message,
            }
        })
    }

    fn fetch_local(
        &self,
        repo_ref: &RepoRef,
        destination: &Path,
        deadline: Option<Instant>,
    ) -> anyhow::Result<FetchedRepository> {
        let original = repo_ref
            .local_path(&self.base_dir)
            .context("not a local reference")?;

        self.debug(&format!("Base directory: {}", self.base_dir.display()));
        self.debug(&format!("Original path: {}", repo_ref));

        if !original.exists() {
            let message = format!("Repository path not found: {}", original.display());
            self.audit.log_action("error", &message);
            bail!(message);
        }
        let source = original.canonicalize()?;

        self.debug(&format!("Resolved path: {}", source.display()));
        self.debug(&format!("Target directory: {}", destination.display()));

        let git_dir = source.join(".git");
        if git_dir.exists() {
            self.debug(&format!("Found .git directory at {}", git_dir.display()));

            self.audit.log_action(
                "command",
                &format!(
                    "$ git clone --no-hardlinks {} {}",
                    source.display(),
                    destination.display()
                ),
            );
            let mut cmd = Command::new("git");
            cmd.arg("clone")
                .arg("--no-hardlinks")
                .arg(&source)
                .arg(destination);
            run_git(cmd, deadline, &self.cancel).inspect_err(|e| {
                self.audit.log_action("error", &format!("Git clone failed: {}", e));
            })?;

            self.audit.log_action(
                "success",
                &format!(
                    "Successfully cloned {} to {}",
                    source.display(),
                    destination.display()
                ),
            );
            Ok(FetchedRepository {
                root: destination.to_path_buf(),
                method: FetchMethod::LocalClone,
                commit: head_sha(destination),
            })
        } else {
            self.debug("No .git directory found");

            self.audit.log_action(
                "command",
                &format!("$ cp -r {} {}", source.display(), destination.display()),
            );
            copy_dir(&source, destination)
                .with_context(|| format!("Failed to copy {}", source.display()))?;

            self.audit.log_action(
                "success",
                &format!(
                    "Successfully copied {} to {}",
                    source.display(),
                    destination.display()
                ),
            );
            Ok(FetchedRepository {
                root: destination.to_path_buf(),
                method: FetchMethod::LocalCopy,
                commit: None,
            })
        }
    }

    fn fetch_remote(
        &self,
        url: &str,
        ssh_key: &str,
        destination: &Path,
        deadline: Option<Instant>,
    ) -> anyhow::Result<FetchedRepository> {
        self.audit.log_action(
            "clone_attempt",
            &format!("$ git clone {} {}", url, destination.display()),
        );

        let mut cmd = Command::new("git");
        cmd.arg("clone").arg(url).arg(destination);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        if !ssh_key.trim().is_empty() {
            let key = expand_home(ssh_key.trim());
            cmd.env(
                "GIT_SSH_COMMAND",
                format!("ssh -i {} -o IdentitiesOnly=yes", shell_quote(&key)),
            );
        }
        run_git(cmd, deadline, &self.cancel)?;

        self.audit.log_action(
            "success",
            &format!("Successfully cloned {} to {}", url, destination.display()),
        );
        Ok(FetchedRepository {
            root: destination.to_path_buf(),
            method: FetchMethod::RemoteClone,
            commit: head_sha(destination),
        })
    }

    fn debug(&self, details: &str) {
        tracing::debug!("{}", details);
        self.audit.log_action("debug", details);
    }
}

/// Run a git command, killing it on cancellation or at `deadline`.
fn run_git(
    mut cmd: Command,
    deadline: Option<Instant>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    if cancel.is_cancelled() {
        bail!("Git clone cancelled");
    }

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to run git")?;
    let stderr = child.stderr.take().map(|mut stream| {
        thread::spawn(move || {
            let mut text = String::new();
            let _ = stream.read_to_string(&mut text);
            text
        })
    });

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        let stop = if cancel.is_cancelled() {
            Some("cancelled")
        } else if deadline.is_some_and(|d| Instant::now() >= d) {
            Some("timed out")
        } else {
            None
        };
        if let Some(stop) = stop {
            if let Err(e) = child.kill() {
                tracing::warn!("Failed to kill git: {}", e);
            }
            let _ = child.wait();
            bail!("Git clone {}", stop);
        }
        thread::sleep(POLL_INTERVAL);
    };

    if !status.success() {
        let stderr = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        bail!("Git clone failed: {}", stderr.trim());
    }
    Ok(())
}

/// Single-quote a path for `sh`.
fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

fn head_sha(path: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn copy_dir(source: &Path, destination: &Path) -> std::io::Result<()> {
    fs::create_dir_all(destination)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = destination.join(entry.file_name());

        if file_type.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            copy_symlink(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(source)?, target)
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    fs::copy(source, target).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Serialize git-process tests to avoid flaky failures under parallel execution
    static GIT_LOCK: Mutex<()> = Mutex::new(());

    struct Fixture {
        temp: TempDir,
        audit: Arc<AuditLog>,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let audit = Arc::new(AuditLog::create(&temp.path().join("logs"), "tester").unwrap());
            Self { temp, audit }
        }

        fn fetcher(&self) -> RepositoryFetcher {
            RepositoryFetcher::new(self.temp.path(), Arc::clone(&self.audit))
        }

        fn log(&self) -> String {
            fs::read_to_string(self.audit.path()).unwrap()
        }
    }

    fn git(dir: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args([
                "-c",
                "user.name=Test",
                "-c",
                "user.email=test@test.com",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    /// Create a git work tree with one committed script.
    fn create_work_tree(dir: &Path) {
        fs::create_dir_all(dir.join("scripts")).unwrap();
        fs::write(dir.join("scripts/deploy.sh"), "#!/bin/sh\necho deployed\n").unwrap();
        git(dir, &["init", "-q"]);
        git(dir, &["add", "."]);
        git(dir, &["commit", "-q", "-m", "Initial commit"]);
    }

    #[test]
    fn copies_plain_directory() {
        let fx = Fixture::new();
        let source = fx.temp.path().join("repos/api");
        fs::create_dir_all(source.join("scripts")).unwrap();
        fs::write(source.join("scripts/run.sh"), "echo hi").unwrap();
        let dest = fx.temp.path().join("ws/step_0");

        let fetched = fx.fetcher().fetch("file://repos/api", "", &dest, None).unwrap();

        assert_eq!(fetched.method, FetchMethod::LocalCopy);
        assert_eq!(fetched.root, dest);
        assert!(fetched.commit.is_none());
        assert_eq!(
            fs::read_to_string(dest.join("scripts/run.sh")).unwrap(),
            "echo hi"
        );

        let log = fx.log();
        assert!(log.contains("| debug | No .git directory found"));
        assert!(log.contains("| command | $ cp -r "));
        assert!(log.contains("| success | Successfully copied "));
    }

    #[test]
    fn copy_is_independent_of_source() {
        let fx = Fixture::new();
        let source = fx.temp.path().join("repo");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("file.txt"), "original").unwrap();
        let dest = fx.temp.path().join("copy");

        fx.fetcher().fetch("file://repo", "", &dest, None).unwrap();
        fs::write(dest.join("file.txt"), "changed").unwrap();

        assert_eq!(
            fs::read_to_string(source.join("file.txt")).unwrap(),
            "original"
        );
    }

    #[test]
    fn clones_local_work_tree() {
        let _lock = GIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let fx = Fixture::new();
        let source = fx.temp.path().join("repos/web");
        create_work_tree(&source);
        let dest = fx.temp.path().join("ws/step_1");
        fs::create_dir_all(&dest).unwrap();

        let fetched = fx.fetcher().fetch("file://repos/web", "", &dest, None).unwrap();

        assert_eq!(fetched.method, FetchMethod::LocalClone);
        let sha = fetched.commit.unwrap();
        assert_eq!(sha.len(), 40);
        assert!(dest.join("scripts/deploy.sh").exists());

        let log = fx.log();
        assert!(log.contains("| debug | Found .git directory at "));
        assert!(log.contains("| command | $ git clone --no-hardlinks "));
        assert!(log.contains("| success | Successfully cloned "));
    }

    #[test]
    fn missing_local_path_is_fetch_error() {
        let fx = Fixture::new();
        let dest = fx.temp.path().join("ws/step_0");

        let err = fx
            .fetcher()
            .fetch("file://repos/missing", "", &dest, None)
            .unwrap_err();

        assert!(matches!(err, ZenDeployError::Fetch { .. }));
        assert!(err.to_string().contains("Repository path not found"));
        let log = fx.log();
        assert!(log.contains("| error | Repository path not found: "));
        assert!(log.contains("| repo_clone_error | Repository clone failed: "));
    }

    #[test]
    fn failed_remote_clone_is_fetch_error() {
        let _lock = GIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let fx = Fixture::new();
        let bogus = fx.temp.path().join("no-such-remote.git");
        let dest = fx.temp.path().join("ws/step_0");

        let err = fx
            .fetcher()
            .fetch(&bogus.to_string_lossy(), "~/.ssh/deploy_key", &dest, None)
            .unwrap_err();

        assert!(matches!(err, ZenDeployError::Fetch { .. }));
        let log = fx.log();
        assert!(log.contains("| clone_attempt | $ git clone "));
        assert!(log.contains("| repo_clone_error | "));
    }

    #[test]
    fn empty_reference_is_fetch_error() {
        let fx = Fixture::new();
        let err = fx
            .fetcher()
            .fetch("", "", &fx.temp.path().join("x"), None)
            .unwrap_err();
        assert!(matches!(err, ZenDeployError::Fetch { .. }));
    }

    /// A clone over SSH whose transport never answers.
    fn stalled_clone(dest: &Path) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("clone")
            .arg("ssh://git@example.invalid/org/app.git")
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_SSH_COMMAND", "sleep 30 #");
        cmd
    }

    #[test]
    fn stalled_clone_is_killed_at_deadline() {
        let _lock = GIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let temp = TempDir::new().unwrap();
        let started = Instant::now();

        let err = run_git(
            stalled_clone(&temp.path().join("dest")),
            Some(started + Duration::from_secs(1)),
            &CancellationToken::new(),
        )
        .unwrap_err();

        assert_eq!(err.to_string(), "Git clone timed out");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn stalled_clone_is_killed_on_cancel() {
        let _lock = GIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let temp = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            trigger.cancel();
        });
        let started = Instant::now();

        let err = run_git(stalled_clone(&temp.path().join("dest")), None, &cancel).unwrap_err();
        canceller.join().unwrap();

        assert_eq!(err.to_string(), "Git clone cancelled");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn cancelled_fetcher_does_not_clone() {
        let fx = Fixture::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let dest = fx.temp.path().join("ws/step_0");

        let err = fx
            .fetcher()
            .with_cancel(cancel)
            .fetch("git@example.invalid:org/app.git", "", &dest, None)
            .unwrap_err();

        assert!(matches!(err, ZenDeployError::Fetch { .. }));
        assert!(err.to_string().contains("Git clone cancelled"));
        assert!(fx
            .log()
            .contains("| repo_clone_error | Repository clone failed: Git clone cancelled"));
    }

    #[test]
    fn shell_quote_keeps_key_path_whole() {
        assert_eq!(
            shell_quote(Path::new("/home/me/.ssh/deploy key")),
            "'/home/me/.ssh/deploy key'"
        );
        assert_eq!(
            shell_quote(Path::new("/keys/o'neil")),
            r"'/keys/o'\''neil'"
        );
    }

    #[test]
    fn fetch_method_display() {
        assert_eq!(FetchMethod::LocalClone.to_string(), "local clone");
        assert_eq!(FetchMethod::RemoteClone.to_string(), "remote clone");
    }
}
