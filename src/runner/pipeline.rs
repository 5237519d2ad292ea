//! Lazy pipeline run.
//!
//! [`PipelineRun`] drives the executor one phase at a time: nothing happens
//! until the caller pulls the next frame, and only the frames of the current
//! phase are ever buffered.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::audit::AuditLog;
use crate::error::{Result, ZenDeployError};
use crate::fetch::RepositoryFetcher;
use crate::shell::{ScriptOptions, ScriptOutcome, ScriptOutput, ScriptRunner};
use crate::steps::Step;

use super::executor::{Executor, ExecutorState, StepStatus};
use super::frame::Frame;

const MAX_LISTED_FILES: usize = 100;

enum Phase {
    NextStep,
    Fetch {
        step: Step,
        dir: PathBuf,
    },
    Launch {
        step: Step,
        root: PathBuf,
        script: PathBuf,
        env: BTreeMap<String, String>,
    },
    Script {
        step: Step,
        output: ScriptOutput,
    },
    Summary,
    Done,
}

#[derive(Debug, Clone, Copy)]
enum StopReason {
    Cancelled,
    TimedOut,
}

impl StopReason {
    fn message(self) -> &'static str {
        match self {
            StopReason::Cancelled => "Pipeline cancelled",
            StopReason::TimedOut => "Pipeline timed out",
        }
    }
}

/// Forward-only stream of frames for one pipeline run.
///
/// Yields `Ok(frame)` for everything the run reports. A fault outside the
/// step-local kinds yields its error frames, then a single
/// `Err(ZenDeployError::Unexpected)`, and ends the stream. Dropping the
/// stream early kills any running script, marks the run aborted, and
/// releases the workspace.
pub struct PipelineRun<'a> {
    executor: &'a mut Executor,
    audit: Arc<AuditLog>,
    fetcher: RepositoryFetcher,
    runner: ScriptRunner,
    deadline: Option<Instant>,
    next_index: usize,
    current: usize,
    step_started: Instant,
    phase: Phase,
    pending: VecDeque<Result<Frame>>,
}

impl<'a> PipelineRun<'a> {
    pub(super) fn new(executor: &'a mut Executor) -> Self {
        let audit = Arc::clone(&executor.audit);
        let fetcher =
            RepositoryFetcher::new(executor.options.repo_base_dir.clone(), Arc::clone(&audit))
                .with_cancel(executor.options.cancel.clone());
        let runner = ScriptRunner::new(Arc::clone(&audit), executor.options.cancel.clone());
        let deadline = executor.options.pipeline_timeout.map(|t| Instant::now() + t);

        Self {
            executor,
            audit,
            fetcher,
            runner,
            deadline,
            next_index: 0,
            current: 0,
            step_started: Instant::now(),
            phase: Phase::NextStep,
            pending: VecDeque::new(),
        }
    }

    fn emit(&mut self, frame: Frame) {
        self.pending.push_back(Ok(frame));
    }

    fn stop_reason(&self) -> Option<StopReason> {
        if self.executor.options.cancel.is_cancelled() {
            Some(StopReason::Cancelled)
        } else if self.pipeline_expired() {
            Some(StopReason::TimedOut)
        } else {
            None
        }
    }

    fn pipeline_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// The earlier of the step deadline and the pipeline deadline.
    fn step_deadline(&self) -> Option<Instant> {
        let step_deadline = self
            .executor
            .options
            .step_timeout
            .map(|t| self.step_started + t);
        match (step_deadline, self.deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn start_step(&mut self) {
        if let Some(reason) = self.stop_reason() {
            self.abort(reason);
            return;
        }

        let Some(step) = self.executor.steps.get(self.next_index).cloned() else {
            self.phase = Phase::Summary;
            return;
        };
        self.current = self.next_index;
        self.next_index += 1;
        self.step_started = Instant::now();
        self.set_status(StepStatus::Running);
        if let Some(context) = self.executor.context.as_mut() {
            context.current_step = Some(self.current);
        }
        tracing::debug!("Starting step {}: {}", step.number(), step.name);

        self.emit(Frame::step_header(step.number(), &step.name));
        match self.step_dir(&step) {
            Ok(dir) => {
                self.emit(Frame::info("Cloning repository..."));
                self.phase = Phase::Fetch { step, dir };
            }
            Err(e) => self.fatal(&step, e.to_string()),
        }
    }

    fn step_dir(&self, step: &Step) -> io::Result<PathBuf> {
        let workspace = self
            .executor
            .workspace()
            .ok_or_else(|| io::Error::other("workspace has been released"))?;
        let dir = workspace.join(format!("step_{}", step.order));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn fetch(&mut self, step: Step, dir: PathBuf) {
        let deadline = self.step_deadline();
        let repo = match self
            .fetcher
            .fetch(&step.repo_ref, &step.ssh_key_path, &dir, deadline)
        {
            Ok(repo) => repo,
            Err(e) if e.is_step_local() => {
                self.emit(Frame::failure("Failed to clone repository"));
                self.step_failed(&step, e.to_string(), None);
                if let Some(reason) = self.stop_reason() {
                    self.abort(reason);
                }
                return;
            }
            Err(e) => {
                self.fatal(&step, e.to_string());
                return;
            }
        };
        tracing::debug!(
            "Fetched {} via {} ({})",
            step.repo_ref,
            repo.method,
            repo.commit.as_deref().unwrap_or("no commit")
        );
        self.emit(Frame::success("Repository cloned successfully"));

        let env = step_environment(&step);
        self.emit(Frame::command(
            &format!("Setting AWS Profile to: {}", step.aws_profile),
            &format!("export AWS_PROFILE={}", step.aws_profile),
        ));
        self.emit(Frame::success("AWS Profile set"));
        for (key, value) in &step.env_vars {
            self.emit(Frame::command(
                &format!("Setting {}={}", key, value),
                &format!("export {}={}", key, value),
            ));
        }
        self.emit(Frame::success("Environment variables set"));

        let script = repo.root.join(&step.script_path);
        if !script.is_file() {
            let message = ZenDeployError::ScriptNotFound {
                path: script.clone(),
            }
            .to_string();
            self.audit.log_action(
                "debug",
                &format!("Looking for script at: {}", script.display()),
            );
            self.audit.log_action(
                "debug",
                &format!(
                    "Repository directory contents: {:?}",
                    list_files(&repo.root)
                ),
            );
            self.emit(Frame::failure(&message));
            self.audit.log_action("step_error", &message);
            self.step_failed(&step, message, None);
            return;
        }

        if let Err(e) = make_executable(&script) {
            self.fatal(&step, e.to_string());
            return;
        }

        self.emit(Frame::command(
            &format!("Executing script: {}", script.display()),
            &script.display().to_string(),
        ));
        self.phase = Phase::Launch {
            step,
            root: repo.root,
            script,
            env,
        };
    }

    fn launch(
        &mut self,
        step: Step,
        root: PathBuf,
        script: PathBuf,
        env: BTreeMap<String, String>,
    ) {
        let options = ScriptOptions {
            cwd: Some(root),
            env,
            deadline: self.step_deadline(),
        };
        let output = self.runner.run(&script, &step.name, options);
        self.phase = Phase::Script { step, output };
    }

    fn script_finished(&mut self, step: &Step, outcome: ScriptOutcome) {
        match outcome {
            ScriptOutcome::Succeeded => self.step_completed(step, Some(0)),
            ScriptOutcome::Cancelled => {
                self.step_failed(step, "Script cancelled".to_string(), None);
                self.abort(StopReason::Cancelled);
            }
            ScriptOutcome::TimedOut if self.pipeline_expired() => {
                self.step_failed(step, "Script timed out".to_string(), None);
                self.abort(StopReason::TimedOut);
            }
            other if !self.executor.options.fail_on_script_error => {
                tracing::debug!("Ignoring script result {:?} for {}", other, step.name);
                self.step_completed(step, other.exit_code())
            }
            other => {
                let error = ZenDeployError::ScriptExecution {
                    script: step.script_path.clone(),
                    message: describe_outcome(other),
                };
                self.step_failed(step, error.to_string(), other.exit_code())
            }
        }
    }

    fn step_completed(&mut self, step: &Step, exit_code: Option<i32>) {
        self.emit(Frame::step_completed(step.number()));
        self.emit(Frame::separator());

        let duration = self.step_started.elapsed();
        let report = &mut self.executor.reports[self.current];
        report.status = StepStatus::Completed;
        report.exit_code = exit_code;
        report.duration = Some(duration);
        self.phase = Phase::NextStep;
    }

    fn step_failed(&mut self, step: &Step, error: String, exit_code: Option<i32>) {
        self.emit(Frame::step_failed(step.number()));
        tracing::warn!("Step {} failed: {}", step.number(), error);

        let duration = self.step_started.elapsed();
        let report = &mut self.executor.reports[self.current];
        report.status = StepStatus::Failed;
        report.error = Some(error);
        report.exit_code = exit_code;
        report.duration = Some(duration);
        self.phase = Phase::NextStep;
    }

    /// A fault outside the step-local kinds: report it and end the run.
    fn fatal(&mut self, step: &Step, message: String) {
        let err = ZenDeployError::Unexpected {
            step: step.name.clone(),
            message,
        };
        let text = err.to_string();
        self.emit(Frame::failure(&text));
        self.audit.log_action("step_error", &text);
        self.step_failed(step, text.clone(), None);
        self.pending.push_back(Err(err));
        self.finish(ExecutorState::Aborted, &text);
    }

    fn abort(&mut self, reason: StopReason) {
        self.emit(Frame::summary(reason.message(), false));
        self.finish(ExecutorState::Aborted, reason.message());
    }

    fn summarize(&mut self) {
        let failed = self
            .executor
            .reports
            .iter()
            .filter(|r| r.status == StepStatus::Failed)
            .count();
        let frame = if self.executor.steps.is_empty() {
            Frame::summary("No steps to process", false)
        } else if failed == 0 {
            Frame::summary("ZenDeploy completed successfully!", true)
        } else {
            Frame::summary("ZenDeploy completed with errors!", false)
        };
        self.emit(frame);

        let succeeded = self.executor.reports.len() - failed;
        let details = format!("{} succeeded, {} failed", succeeded, failed);
        self.finish(ExecutorState::Completed, &details);
    }

    /// Settle every step report, record the outcome, and release the workspace.
    fn finish(&mut self, state: ExecutorState, details: &str) {
        self.phase = Phase::Done;

        for report in &mut self.executor.reports {
            match report.status {
                StepStatus::Pending => report.status = StepStatus::Skipped,
                StepStatus::Running => {
                    report.status = StepStatus::Failed;
                    report.error = Some("Interrupted".to_string());
                }
                _ => {}
            }
        }

        match state {
            ExecutorState::Completed => {
                self.audit.log_action("pipeline_completed", details);
                tracing::info!("Pipeline completed: {}", details);
            }
            _ => {
                self.audit.log_action("pipeline_aborted", details);
                tracing::warn!("Pipeline aborted: {}", details);
            }
        }

        if let Some(context) = self.executor.context.as_mut() {
            context.current_step = None;
        }
        self.executor.state = state;
        self.executor.run_state = Some(state);
        if let Err(e) = self.executor.cleanup() {
            tracing::error!("Cleanup after pipeline failed: {}", e);
        }
    }

    fn set_status(&mut self, status: StepStatus) {
        if let Some(report) = self.executor.reports.get_mut(self.current) {
            report.status = status;
        }
    }
}

impl Iterator for PipelineRun<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }

            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Done => return None,
                Phase::NextStep => self.start_step(),
                Phase::Fetch { step, dir } => self.fetch(step, dir),
                Phase::Launch {
                    step,
                    root,
                    script,
                    env,
                } => self.launch(step, root, script, env),
                Phase::Script { step, mut output } => match output.next() {
                    Some(frame) => {
                        self.phase = Phase::Script { step, output };
                        return Some(Ok(frame));
                    }
                    None => {
                        let outcome = output.outcome().unwrap_or(ScriptOutcome::SpawnFailed);
                        drop(output);
                        self.script_finished(&step, outcome);
                    }
                },
                Phase::Summary => self.summarize(),
            }
        }
    }
}

impl Drop for PipelineRun<'_> {
    fn drop(&mut self) {
        if matches!(self.phase, Phase::Done) {
            return;
        }
        // Replacing the phase drops any running script, which kills it.
        self.phase = Phase::Done;
        self.finish(
            ExecutorState::Aborted,
            "Pipeline dropped before completion",
        );
    }
}

impl std::fmt::Debug for PipelineRun<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRun")
            .field("next_index", &self.next_index)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Environment handed to a step's script.
fn step_environment(step: &Step) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("AWS_PROFILE".to_string(), step.aws_profile.clone());
    env.extend(step.env_vars.clone());
    env
}

fn describe_outcome(outcome: ScriptOutcome) -> String {
    match outcome {
        ScriptOutcome::Succeeded => "Script succeeded".to_string(),
        ScriptOutcome::Failed { code: Some(code) } => format!("Script exited with code {}", code),
        ScriptOutcome::Failed { code: None } => "Script terminated by signal".to_string(),
        ScriptOutcome::SpawnFailed => "Script could not be started".to_string(),
        ScriptOutcome::TimedOut => "Script timed out".to_string(),
        ScriptOutcome::Cancelled => "Script cancelled".to_string(),
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Relative paths under `root`, skipping `.git`.
fn list_files(root: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            if out.len() >= MAX_LISTED_FILES {
                return;
            }
            let path = entry.path();
            if entry.file_name() == ".git" {
                continue;
            }
            if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.display().to_string());
            }
            if path.is_dir() {
                walk(root, &path, out);
            }
        }
    }

    let mut files = Vec::new();
    walk(root, root, &mut files);
    files.sort();
    files
}
