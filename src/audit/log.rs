//! Session audit log.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;

use crate::error::Result;

use super::record::{end_banner, start_banner, AuditRecord};

const MAX_SESSION_FILE_ATTEMPTS: usize = 1000;

struct SessionFile {
    file: File,
    closed: bool,
}

/// Append-only audit trail for one session.
///
/// Every record is rendered up front and written with a single `write_all`
/// while holding the session lock, so concurrent callers never interleave
/// partial records. Share it across threads with `Arc`.
///
/// # Example
///
/// ```
/// use zendeploy::audit::AuditLog;
/// use tempfile::TempDir;
///
/// let temp = TempDir::new().unwrap();
/// let log = AuditLog::create(temp.path(), "alice").unwrap();
/// log.log_action("included_file", "steps/api.yml");
/// log.close(None).unwrap();
///
/// let text = std::fs::read_to_string(log.path()).unwrap();
/// assert!(text.contains("| alice | included_file | steps/api.yml"));
/// ```
pub struct AuditLog {
    path: PathBuf,
    actor: String,
    session_id: i64,
    inner: Mutex<SessionFile>,
}

impl AuditLog {
    /// Create the session log under `log_dir` and write the start banner.
    ///
    /// The file is named `<actor>_<unix seconds>_session.log`. A session
    /// starting in the same second as an existing log for the same actor
    /// gets a numeric suffix (`<actor>_<unix seconds>_1_session.log`), so
    /// every session owns exactly one file.
    pub fn create(log_dir: &Path, actor: &str) -> Result<Self> {
        fs::create_dir_all(log_dir)?;

        let started = Local::now();
        let session_id = started.timestamp();
        let (path, mut file) = open_session_file(log_dir, actor, session_id)?;

        file.write_all(start_banner(&started, actor).as_bytes())?;
        file.flush()?;

        tracing::debug!("Audit log started at {}", path.display());

        Ok(Self {
            path,
            actor: actor.to_string(),
            session_id,
            inner: Mutex::new(SessionFile {
                file,
                closed: false,
            }),
        })
    }

    /// Record an action.
    pub fn log_action(&self, action: &str, details: &str) {
        let record = AuditRecord::action(&self.actor, action, details);
        self.append(&record.render());
    }

    /// Record output produced by a step.
    pub fn log_output(&self, step: &str, command: &str, output: &str) {
        let record = AuditRecord::output(&self.actor, step, command, output);
        self.append(&record.render());
    }

    /// Write the end banner.
    ///
    /// Only the first call writes; later calls (and the implicit close on
    /// drop) do nothing.
    pub fn close(&self, error: Option<&str>) -> io::Result<()> {
        let mut session = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if session.closed {
            return Ok(());
        }
        session.closed = true;

        let banner = end_banner(&Local::now(), error);
        session.file.write_all(banner.as_bytes())?;
        session.file.flush()
    }

    /// Whether the end banner has been written.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).closed
    }

    /// Path of the session log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Actor recorded on every entry.
    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Unix timestamp identifying the session.
    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    fn append(&self, text: &str) {
        let mut session = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if session.closed {
            tracing::warn!("Dropping audit record written after session end");
            return;
        }

        if let Err(e) = session
            .file
            .write_all(text.as_bytes())
            .and_then(|_| session.file.flush())
        {
            tracing::error!("Failed to write audit log {}: {}", self.path.display(), e);
        }
    }
}

fn open_session_file(
    log_dir: &Path,
    actor: &str,
    session_id: i64,
) -> io::Result<(PathBuf, File)> {
    for attempt in 0..MAX_SESSION_FILE_ATTEMPTS {
        let name = match attempt {
            0 => format!("{}_{}_session.log", actor, session_id),
            n => format!("{}_{}_{}_session.log", actor, session_id, n),
        };
        let path = log_dir.join(name);
        match OpenOptions::new().create_new(true).append(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!(
            "too many audit sessions for {} at {} in {}",
            actor,
            session_id,
            log_dir.display()
        ),
    ))
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        if let Err(e) = self.close(None) {
            tracing::error!("Failed to close audit log {}: {}", self.path.display(), e);
        }
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("path", &self.path)
            .field("actor", &self.actor)
            .field("session_id", &self.session_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn read(log: &AuditLog) -> String {
        fs::read_to_string(log.path()).unwrap()
    }

    #[test]
    fn create_writes_start_banner_and_names_file() {
        let temp = TempDir::new().unwrap();
        let log = AuditLog::create(&temp.path().join("logs"), "alice").unwrap();

        let name = log.path().file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(name, format!("alice_{}_session.log", log.session_id()));

        let text = read(&log);
        assert!(text.starts_with("=== ZenDeploy Session Started: "));
        assert!(text.contains("User: alice"));
    }

    #[test]
    fn sessions_in_same_second_get_separate_files() {
        let temp = TempDir::new().unwrap();
        let first = AuditLog::create(temp.path(), "alice").unwrap();
        let second = AuditLog::create(temp.path(), "alice").unwrap();
        first.log_action("included_file", "a.yml");
        second.log_action("included_file", "b.yml");
        first.close(None).unwrap();
        second.close(None).unwrap();

        assert_ne!(first.path(), second.path());
        for log in [&first, &second] {
            let text = read(log);
            assert_eq!(text.matches("Session Started").count(), 1);
            assert_eq!(text.matches("Session Ended").count(), 1);
            assert_eq!(text.matches("| included_file |").count(), 1);
        }
    }

    #[test]
    fn existing_session_file_is_never_reused() {
        let temp = TempDir::new().unwrap();
        let log = AuditLog::create(temp.path(), "alice").unwrap();
        let taken = log.path().to_path_buf();
        log.close(None).unwrap();
        let before = fs::read_to_string(&taken).unwrap();

        let (path, _file) = open_session_file(temp.path(), "alice", log.session_id()).unwrap();

        assert_ne!(path, taken);
        assert!(path.to_string_lossy().ends_with("_1_session.log"));
        assert_eq!(fs::read_to_string(&taken).unwrap(), before);
    }

    #[test]
    fn close_writes_end_banner_once() {
        let temp = TempDir::new().unwrap();
        let log = AuditLog::create(temp.path(), "alice").unwrap();

        log.close(Some("pipeline aborted")).unwrap();
        log.close(None).unwrap();
        drop(log);

        let path = fs::read_dir(temp.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text.matches("Session Ended").count(), 1);
        assert!(text.contains("Session ended with error: pipeline aborted"));
    }

    #[test]
    fn drop_closes_unclosed_log() {
        let temp = TempDir::new().unwrap();
        let path = {
            let log = AuditLog::create(temp.path(), "alice").unwrap();
            log.log_action("prepare", "");
            log.path().to_path_buf()
        };

        let text = fs::read_to_string(path).unwrap();
        assert!(text.trim_end().ends_with(&"=".repeat(50)));
        assert_eq!(text.matches("Session Ended").count(), 1);
    }

    #[test]
    fn records_after_close_are_dropped() {
        let temp = TempDir::new().unwrap();
        let log = AuditLog::create(temp.path(), "alice").unwrap();
        log.close(None).unwrap();

        log.log_action("late", "ignored");

        assert!(!read(&log).contains("late"));
        assert!(log.is_closed());
    }

    #[test]
    fn concurrent_writers_never_interleave() {
        let temp = TempDir::new().unwrap();
        let log = Arc::new(AuditLog::create(temp.path(), "alice").unwrap());

        let handles: Vec<_> = (0..1000)
            .map(|i| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    if i % 2 == 0 {
                        log.log_action("worker_action", &format!("payload-{}", i));
                    } else {
                        log.log_output(&format!("step-{}", i), "execute", &format!("line-{}", i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        log.close(None).unwrap();

        let text = read(&log);
        assert_eq!(text.matches("Session Started").count(), 1);
        assert_eq!(text.matches("Session Ended").count(), 1);
        assert_eq!(text.matches("[ACTION]").count(), 500);
        assert_eq!(text.matches("[STEP] Step: ").count(), 500);

        let separator = "-".repeat(50);
        let banner_rule = "=".repeat(50);
        for line in text.lines() {
            let known = line.is_empty()
                || line.starts_with("=== ZenDeploy Session")
                || line.starts_with("User: ")
                || line == banner_rule
                || line == separator
                || line.starts_with("Timestamp: ")
                || line == "Command: execute"
                || line == "Output:"
                || (line.starts_with("line-") && line[5..].parse::<u32>().is_ok())
                || (line.starts_with("[STEP] Step: step-") && line.matches("[STEP]").count() == 1)
                || (line.starts_with("[ACTION] ")
                    && line.matches("[ACTION]").count() == 1
                    && line.contains(" | alice | worker_action | payload-"));
            assert!(known, "mixed or unexpected line: {:?}", line);
        }
    }
}
