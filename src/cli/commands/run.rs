//! Run command implementation.
//!
//! The `zendeploy run` command loads step files, executes them as one
//! pipeline, and records the session in the audit log.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audit::AuditLog;
use crate::cli::args::RunArgs;
use crate::config::Settings;
use crate::error::Result;
use crate::runner::{Executor, ExecutorOptions, ExecutorState, PipelineReport};
use crate::steps::StepStore;
use crate::ui::{Transcript, UserInterface};

use super::dispatcher::{Command, CommandResult, EXIT_FAILURE};
use super::display::{config_failure, load_steps, show_step_report, show_validation_issues};

/// The run command implementation.
pub struct RunCommand {
    project_root: PathBuf,
    settings: Settings,
    args: RunArgs,
}

impl RunCommand {
    /// Create a new run command.
    ///
    /// Timeouts given on the command line replace those from settings.
    pub fn new(project_root: &Path, mut settings: Settings, args: RunArgs) -> Self {
        if args.step_timeout.is_some() {
            settings.step_timeout_secs = args.step_timeout;
        }
        if args.timeout.is_some() {
            settings.pipeline_timeout_secs = args.timeout;
        }
        Self {
            project_root: project_root.to_path_buf(),
            settings,
            args,
        }
    }

    /// Get the effective settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get the command arguments.
    pub fn args(&self) -> &RunArgs {
        &self.args
    }

    /// Stream the run to the UI, moving the store cursor past each
    /// finished step.
    fn run_pipeline(
        &self,
        executor: &mut Executor,
        store: &mut StepStore,
        ui: &mut dyn UserInterface,
    ) -> Result<Option<String>> {
        let mut transcript = match &self.args.transcript {
            Some(path) => Some(Transcript::create(path)?),
            None => None,
        };

        let mut fatal = None;
        for item in executor.execute()? {
            match item {
                Ok(frame) => {
                    if frame.ends_step() {
                        store.advance();
                    }
                    ui.frame(&frame);
                    if let Some(transcript) = transcript.as_mut() {
                        transcript.write(&frame)?;
                    }
                }
                Err(e) => {
                    tracing::error!("Pipeline aborted: {}", e);
                    fatal = Some(e.to_string());
                }
            }
        }

        if let Some(transcript) = transcript {
            let path = transcript.finish()?;
            if ui.output_mode().shows_status() {
                ui.message(&format!("Transcript written to {}", path.display()));
            }
        }
        Ok(fatal)
    }

    fn show_report(
        &self,
        ui: &mut dyn UserInterface,
        report: &PipelineReport,
        store: &StepStore,
    ) {
        if !ui.output_mode().shows_status() {
            return;
        }
        ui.message("");
        for step in &report.steps {
            show_step_report(ui, step);
        }
        ui.message(&format!(
            "{} succeeded, {} failed, {} skipped",
            report.succeeded(),
            report.failed(),
            report.skipped()
        ));

        let status = store.status();
        if !status.completed {
            ui.warning(&format!(
                "Stopped after {} of {} steps",
                status.current_step, status.total_steps
            ));
        }
    }
}

impl Command for RunCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let actor = self.settings.resolve_actor();
        let audit = Arc::new(AuditLog::create(&self.settings.log_dir, &actor)?);
        tracing::debug!("Audit log at {}", audit.path().display());

        let mut store = match load_steps(&self.args.files, Some(&audit)) {
            Ok(store) => store,
            Err(e) => {
                let message = e.to_string();
                let result = config_failure(ui, e);
                if let Err(close_err) = audit.close(Some(&message)) {
                    tracing::error!(
                        "Failed to close audit log {}: {}",
                        audit.path().display(),
                        close_err
                    );
                }
                return result;
            }
        };

        if !store.validate() {
            let issues = store.validation_errors();
            show_validation_issues(ui, &issues);
            audit.log_action("validation_error", &format!("{} invalid steps", issues.len()));
            audit.close(Some("Step validation failed"))?;
            return Ok(CommandResult::failure(EXIT_FAILURE));
        }

        if ui.output_mode().shows_status() {
            ui.show_header("ZenDeploy");
            ui.message(&format!("Running {} steps as {}", store.len(), actor));
        }

        let options = ExecutorOptions::from_settings(&self.settings, &self.project_root);
        if let Err(e) = options.cancel.cancel_on_ctrlc() {
            tracing::warn!("Could not install Ctrl-C handler: {}", e);
        }

        let mut executor = Executor::new(&store, Arc::clone(&audit), options);
        let outcome = executor
            .prepare()
            .and_then(|()| self.run_pipeline(&mut executor, &mut store, ui));

        let error = match outcome {
            Ok(fatal) => fatal,
            Err(e) => {
                ui.error(&e.to_string());
                Some(e.to_string())
            }
        };

        let report = executor.report();
        self.show_report(ui, &report, &store);

        let close_error = error.or_else(|| {
            (report.state == ExecutorState::Aborted).then(|| "Pipeline aborted".to_string())
        });
        audit.close(close_error.as_deref())?;

        if ui.output_mode().shows_status() {
            ui.message(&format!("Audit log: {}", audit.path().display()));
        }

        if report.is_success() {
            Ok(CommandResult::success())
        } else {
            Ok(CommandResult::failure(EXIT_FAILURE))
        }
    }
}
