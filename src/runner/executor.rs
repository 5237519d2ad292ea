//! Pipeline executor.
//!
//! The executor owns a snapshot of the pipeline's steps and walks through
//! `Idle → Prepared → Running → {Completed, Aborted} → Cleaned`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::audit::AuditLog;
use crate::config::Settings;
use crate::error::{Result, ZenDeployError};
use crate::steps::{Step, StepStore};

use super::cancel::CancellationToken;
use super::pipeline::PipelineRun;
use super::slot::ExecutionSlot;

const WORKSPACE_PREFIX: &str = "zd_";

/// Lifecycle state of an [`Executor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    /// Created, no workspace yet.
    Idle,
    /// Workspace allocated, ready to execute.
    Prepared,
    /// A pipeline run is in progress.
    Running,
    /// Every step was attempted.
    Completed,
    /// The run stopped early (fault, cancellation, or dropped iterator).
    Aborted,
    /// Workspace released.
    Cleaned,
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutorState::Idle => "idle",
            ExecutorState::Prepared => "prepared",
            ExecutorState::Running => "running",
            ExecutorState::Completed => "completed",
            ExecutorState::Aborted => "aborted",
            ExecutorState::Cleaned => "cleaned",
        };
        write!(f, "{}", s)
    }
}

/// Status of a step in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Step is waiting to run.
    Pending,

    /// Step is currently executing.
    Running,

    /// Step completed successfully.
    Completed,

    /// Step failed.
    Failed,

    /// Step never ran because the pipeline stopped first.
    Skipped,
}

impl StepStatus {
    /// Check if this is a terminal state (no more changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }

    /// Get a display character for this status.
    pub fn display_char(&self) -> char {
        match self {
            StepStatus::Pending => '○',
            StepStatus::Running => '◉',
            StepStatus::Completed => '✓',
            StepStatus::Failed => '✗',
            StepStatus::Skipped => '⊘',
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// Step position, 0-based.
    pub order: usize,

    /// Step name.
    pub name: String,

    /// Current status.
    pub status: StepStatus,

    /// Why the step failed.
    pub error: Option<String>,

    /// Script exit code, when the script ran to completion.
    pub exit_code: Option<i32>,

    /// Time spent on the step.
    pub duration: Option<Duration>,
}

impl StepReport {
    fn pending(step: &Step) -> Self {
        Self {
            order: step.order,
            name: step.name.clone(),
            status: StepStatus::Pending,
            error: None,
            exit_code: None,
            duration: None,
        }
    }

    /// Generate a summary line for display.
    pub fn summary_line(&self) -> String {
        let head = format!(
            "{} Step {}: {}",
            self.status.display_char(),
            self.order + 1,
            self.name
        );
        match (self.status, &self.error) {
            (StepStatus::Failed, Some(error)) => format!("{} - {}", head, error),
            (StepStatus::Skipped, _) => format!("{} (skipped)", head),
            (_, _) => match self.duration {
                Some(duration) => format!("{} ({})", head, format_duration(duration)),
                None => head,
            },
        }
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs == 0 {
        format!("{}ms", millis)
    } else if secs < 60 {
        format!("{}.{}s", secs, millis / 100)
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Final state of the run (`Completed` or `Aborted` once it has ended).
    pub state: ExecutorState,

    /// Per-step outcomes in pipeline order.
    pub steps: Vec<StepReport>,
}

impl PipelineReport {
    /// Number of completed steps.
    pub fn succeeded(&self) -> usize {
        self.count(StepStatus::Completed)
    }

    /// Number of failed steps.
    pub fn failed(&self) -> usize {
        self.count(StepStatus::Failed)
    }

    /// Number of steps that never ran.
    pub fn skipped(&self) -> usize {
        self.count(StepStatus::Skipped)
    }

    /// Whether the run completed with every step successful.
    pub fn is_success(&self) -> bool {
        self.state == ExecutorState::Completed
            && self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

/// Options controlling a pipeline run.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Parent directory for the workspace (system temp dir if unset).
    pub workspace_parent: Option<PathBuf>,

    /// Base directory for `file://` repository references.
    pub repo_base_dir: PathBuf,

    /// Per-step time limit.
    pub step_timeout: Option<Duration>,

    /// Whole-run time limit.
    pub pipeline_timeout: Option<Duration>,

    /// Mark a step failed when its script exits non-zero, times out, or
    /// cannot be started.
    pub fail_on_script_error: bool,

    /// Cancellation flag checked during the run.
    pub cancel: CancellationToken,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            workspace_parent: None,
            repo_base_dir: PathBuf::from("."),
            step_timeout: None,
            pipeline_timeout: None,
            fail_on_script_error: true,
            cancel: CancellationToken::new(),
        }
    }
}

impl ExecutorOptions {
    /// Build options from loaded settings.
    pub fn from_settings(settings: &Settings, project_root: &Path) -> Self {
        Self {
            workspace_parent: settings.workspace_dir.clone(),
            repo_base_dir: settings
                .repo_base_dir
                .clone()
                .unwrap_or_else(|| project_root.to_path_buf()),
            step_timeout: settings.step_timeout(),
            pipeline_timeout: settings.pipeline_timeout(),
            fail_on_script_error: settings.fail_on_script_error,
            cancel: CancellationToken::new(),
        }
    }
}

/// Workspace and slot held between `prepare` and `cleanup`.
pub(super) struct ExecutionContext {
    pub(super) workspace: TempDir,
    pub(super) current_step: Option<usize>,
    pub(super) slot: Option<ExecutionSlot>,
}

/// Runs a snapshot of a [`StepStore`] as a pipeline.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use zendeploy::audit::AuditLog;
/// use zendeploy::runner::{Executor, ExecutorOptions};
/// use zendeploy::steps::StepStore;
///
/// # fn main() -> zendeploy::Result<()> {
/// let mut store = StepStore::new();
/// store.add("steps/api.yml".as_ref())?;
///
/// let audit = Arc::new(AuditLog::create("logs".as_ref(), "alice")?);
/// let mut executor = Executor::new(&store, audit, ExecutorOptions::default());
/// executor.prepare()?;
/// for frame in executor.execute()? {
///     println!("{}", frame?.formatted);
/// }
/// println!("{} failed", executor.report().failed());
/// # Ok(())
/// # }
/// ```
pub struct Executor {
    pub(super) steps: Vec<Step>,
    pub(super) audit: Arc<AuditLog>,
    pub(super) options: ExecutorOptions,
    pub(super) state: ExecutorState,
    pub(super) run_state: Option<ExecutorState>,
    pub(super) context: Option<ExecutionContext>,
    pub(super) reports: Vec<StepReport>,
}

impl Executor {
    /// Create an executor for the steps currently in `store`.
    pub fn new(store: &StepStore, audit: Arc<AuditLog>, options: ExecutorOptions) -> Self {
        let steps = store.steps().to_vec();
        let reports = steps.iter().map(StepReport::pending).collect();
        Self {
            steps,
            audit,
            options,
            state: ExecutorState::Idle,
            run_state: None,
            context: None,
            reports,
        }
    }

    /// Allocate a fresh workspace.
    ///
    /// Allowed from `Idle` or `Cleaned`. Failures are audit-logged as
    /// `prepare_error`.
    pub fn prepare(&mut self) -> Result<()> {
        if !matches!(self.state, ExecutorState::Idle | ExecutorState::Cleaned) {
            return Err(ZenDeployError::InvalidState {
                expected: "idle or cleaned",
                actual: self.state.to_string(),
            });
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let created = match &self.options.workspace_parent {
            Some(parent) => {
                std::fs::create_dir_all(parent).and_then(|_| builder.tempdir_in(parent))
            }
            None => builder.tempdir(),
        };

        let workspace = match created {
            Ok(dir) => dir,
            Err(e) => {
                self.audit.log_action("prepare_error", &e.to_string());
                tracing::error!("Failed to create workspace: {}", e);
                return Err(e.into());
            }
        };

        self.audit.log_action(
            "prepare",
            &format!("Created workspace: {}", workspace.path().display()),
        );
        tracing::debug!("Prepared workspace {}", workspace.path().display());

        self.context = Some(ExecutionContext {
            workspace,
            current_step: None,
            slot: None,
        });
        self.reports = self.steps.iter().map(StepReport::pending).collect();
        self.run_state = None;
        self.state = ExecutorState::Prepared;
        Ok(())
    }

    /// Start the pipeline.
    ///
    /// Requires `Prepared` and the process-wide execution slot. The returned
    /// iterator borrows the executor until it is exhausted or dropped.
    pub fn execute(&mut self) -> Result<PipelineRun<'_>> {
        if self.state != ExecutorState::Prepared {
            return Err(ZenDeployError::InvalidState {
                expected: "prepared",
                actual: self.state.to_string(),
            });
        }

        let slot = ExecutionSlot::acquire()?;
        let Some(context) = self.context.as_mut() else {
            return Err(ZenDeployError::InvalidState {
                expected: "prepared",
                actual: "missing workspace".to_string(),
            });
        };
        context.slot = Some(slot);

        self.audit.log_action(
            "execute_start",
            &format!("Starting pipeline with {} steps", self.steps.len()),
        );
        tracing::info!("Running {} steps", self.steps.len());

        self.state = ExecutorState::Running;
        Ok(PipelineRun::new(self))
    }

    /// Release the workspace and the execution slot.
    ///
    /// Idempotent. Runs automatically when a pipeline ends and when the
    /// executor is dropped.
    pub fn cleanup(&mut self) -> Result<()> {
        let Some(context) = self.context.take() else {
            return Ok(());
        };
        let ExecutionContext {
            workspace, slot, ..
        } = context;

        let path = workspace.path().to_path_buf();
        let removed = workspace.close();
        drop(slot);
        self.state = ExecutorState::Cleaned;

        match removed {
            Ok(()) => {
                self.audit
                    .log_action("cleanup", &format!("Removed workspace: {}", path.display()));
                Ok(())
            }
            Err(e) => {
                self.audit.log_action(
                    "cleanup_error",
                    &format!("Failed to remove workspace {}: {}", path.display(), e),
                );
                tracing::error!("Failed to remove workspace {}: {}", path.display(), e);
                Err(e.into())
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Workspace directory while prepared.
    pub fn workspace(&self) -> Option<&Path> {
        self.context.as_ref().map(|c| c.workspace.path())
    }

    /// Index of the step being run, if any.
    pub fn current_step(&self) -> Option<usize> {
        self.context.as_ref().and_then(|c| c.current_step)
    }

    /// The steps this executor runs.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Outcome of the latest run.
    pub fn report(&self) -> PipelineReport {
        PipelineReport {
            state: self.run_state.unwrap_or(self.state),
            steps: self.reports.clone(),
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::error!("Cleanup on drop failed: {}", e);
        }
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("steps", &self.steps.len())
            .field("state", &self.state)
            .field("workspace", &self.workspace())
            .finish()
    }
}
