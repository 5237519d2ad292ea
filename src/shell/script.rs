//! Deployment script execution with streamed output.

use std::collections::{BTreeMap, VecDeque};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audit::AuditLog;
use crate::runner::{CancellationToken, Frame};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const SPAWN_RETRIES: usize = 5;

/// How a script run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// Exited with status 0.
    Succeeded,
    /// Exited non-zero (`None` if killed by a signal).
    Failed { code: Option<i32> },
    /// The process could not be started.
    SpawnFailed,
    /// Killed after the step deadline passed.
    TimedOut,
    /// Killed after cancellation was requested.
    Cancelled,
}

impl ScriptOutcome {
    /// Whether the script exited cleanly.
    pub fn is_success(&self) -> bool {
        matches!(self, ScriptOutcome::Succeeded)
    }

    /// Exit code, when the script exited on its own.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ScriptOutcome::Succeeded => Some(0),
            ScriptOutcome::Failed { code } => *code,
            _ => None,
        }
    }
}

/// Options for one script run.
#[derive(Debug, Clone, Default)]
pub struct ScriptOptions {
    /// Working directory (the fetched repository root).
    pub cwd: Option<PathBuf>,

    /// Environment added on top of the inherited one.
    pub env: BTreeMap<String, String>,

    /// Kill the script if it is still running at this instant.
    pub deadline: Option<Instant>,
}

/// Spawns scripts and relays their output as frames.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    audit: Arc<AuditLog>,
    cancel: CancellationToken,
}

impl ScriptRunner {
    /// Create a runner writing to `audit` and watching `cancel`.
    pub fn new(audit: Arc<AuditLog>, cancel: CancellationToken) -> Self {
        Self { audit, cancel }
    }

    /// Start `script` and return the stream of its output frames.
    ///
    /// Spawn failures do not surface as errors: the stream yields a single
    /// failure frame and reports [`ScriptOutcome::SpawnFailed`].
    pub fn run(&self, script: &Path, step_name: &str, options: ScriptOptions) -> ScriptOutput {
        let mut output = ScriptOutput {
            audit: Arc::clone(&self.audit),
            cancel: self.cancel.clone(),
            step_name: step_name.to_string(),
            deadline: options.deadline,
            child: None,
            lines: None,
            stderr: None,
            pending: VecDeque::new(),
            outcome: None,
        };

        match spawn(script, &options) {
            Ok(mut child) => {
                tracing::debug!("Started {} (pid {})", script.display(), child.id());
                output.lines = child.stdout.take().map(read_lines);
                output.stderr = child.stderr.take().map(drain);
                output.child = Some(child);
            }
            Err(e) => {
                tracing::debug!("Failed to start {}: {}", script.display(), e);
                output.fail(ScriptOutcome::SpawnFailed, format!("Script execution error: {}", e));
            }
        }

        output
    }
}

/// Lazy stream of frames from a running script.
///
/// Each stdout line is trimmed, written to the audit log, and yielded as an
/// output frame. Stderr is held back and reported in one failure frame if
/// the script exits non-zero. Dropping the stream kills the script.
pub struct ScriptOutput {
    audit: Arc<AuditLog>,
    cancel: CancellationToken,
    step_name: String,
    deadline: Option<Instant>,
    child: Option<Child>,
    lines: Option<Receiver<String>>,
    stderr: Option<JoinHandle<String>>,
    pending: VecDeque<Frame>,
    outcome: Option<ScriptOutcome>,
}

impl ScriptOutput {
    /// Final outcome, available once the stream is exhausted.
    pub fn outcome(&self) -> Option<ScriptOutcome> {
        self.outcome
    }

    fn interrupted(&self) -> Option<(ScriptOutcome, &'static str)> {
        if self.cancel.is_cancelled() {
            return Some((ScriptOutcome::Cancelled, "Script cancelled"));
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some((ScriptOutcome::TimedOut, "Script timed out"))
            }
            _ => None,
        }
    }

    fn kill(&mut self, outcome: ScriptOutcome, message: &str) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.lines = None;
        self.stderr = None;
        self.fail(outcome, message.to_string());
    }

    fn fail(&mut self, outcome: ScriptOutcome, message: String) {
        self.audit.log_output(&self.step_name, "error", &message);
        self.pending.push_back(Frame::failure(&message));
        self.outcome = Some(outcome);
    }

    /// Stdout closed; wait for the exit status and settle the outcome.
    fn finish(&mut self) {
        self.lines = None;
        let status = match self.wait_for_exit() {
            Ok(Some(status)) => status,
            Ok(None) => return,
            Err(e) => {
                self.child = None;
                self.fail(ScriptOutcome::SpawnFailed, format!("Script execution error: {}", e));
                return;
            }
        };
        self.child = None;

        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if status.success() {
            self.outcome = Some(ScriptOutcome::Succeeded);
        } else {
            let message = format!("Script execution failed: {}", stderr.trim());
            self.fail(ScriptOutcome::Failed { code: status.code() }, message);
        }
    }

    /// Poll the child until it exits, honouring cancellation and the deadline.
    ///
    /// Returns `Ok(None)` if the child was killed.
    fn wait_for_exit(&mut self) -> io::Result<Option<ExitStatus>> {
        loop {
            let Some(child) = self.child.as_mut() else {
                return Err(io::Error::other("script process missing"));
            };
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if let Some((outcome, message)) = self.interrupted() {
                self.kill(outcome, message);
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Iterator for ScriptOutput {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(frame);
            }
            if self.outcome.is_some() {
                return None;
            }
            if let Some((outcome, message)) = self.interrupted() {
                self.kill(outcome, message);
                continue;
            }

            let received = match &self.lines {
                Some(rx) => rx.recv_timeout(POLL_INTERVAL),
                None => Err(RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(line) => {
                    let line = line.trim();
                    self.audit.log_output(&self.step_name, "execute", line);
                    return Some(Frame::output(line));
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => self.finish(),
            }
        }
    }
}

impl Drop for ScriptOutput {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            tracing::debug!("Killing unfinished script for {}", self.step_name);
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl std::fmt::Debug for ScriptOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptOutput")
            .field("step_name", &self.step_name)
            .field("deadline", &self.deadline)
            .field("outcome", &self.outcome)
            .finish()
    }
}

fn spawn(script: &Path, options: &ScriptOptions) -> io::Result<Child> {
    let mut cmd = Command::new(script);
    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }
    cmd.envs(&options.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut attempt = 0;
    loop {
        match cmd.spawn() {
            // ETXTBSY: another thread forked while the freshly written script was open.
            Err(e) if e.raw_os_error() == Some(26) && attempt < SPAWN_RETRIES => {
                attempt += 1;
                thread::sleep(Duration::from_millis(20 * attempt as u64));
            }
            result => return result,
        }
    }
}

fn read_lines<R: Read + Send + 'static>(stream: R) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

fn drain<R: Read + Send + 'static>(mut stream: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}
