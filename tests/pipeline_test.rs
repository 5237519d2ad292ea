//! Integration tests for running pipelines through the public API.
#![cfg(unix)]

use serial_test::serial;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use zendeploy::audit::AuditLog;
use zendeploy::runner::{
    CancellationToken, Executor, ExecutorOptions, ExecutorState, Frame, StepStatus,
};
use zendeploy::steps::{Step, StepStore};
use zendeploy::ZenDeployError;

struct Fixture {
    temp: TempDir,
    audit: Arc<AuditLog>,
    store: StepStore,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let audit = Arc::new(AuditLog::create(&temp.path().join("logs"), "tester").unwrap());
        Self {
            temp,
            audit,
            store: StepStore::new(),
        }
    }

    fn repo(&self, name: &str, script: &str) {
        let dir = self.temp.path().join("repos").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("run.sh"), script).unwrap();
    }

    fn step(&mut self, name: &str, repo: &str) {
        self.step_with_env(name, repo, BTreeMap::new());
    }

    fn step_with_env(&mut self, name: &str, repo: &str, env_vars: BTreeMap<String, String>) {
        let step = Step {
            source_path: PathBuf::from(format!("{}.yml", name)),
            order: 0,
            name: name.to_string(),
            aws_profile: "staging".to_string(),
            repo_ref: format!("file://repos/{}", repo),
            ssh_key_path: String::new(),
            script_path: "run.sh".to_string(),
            env_vars,
        };
        self.store.push(step).unwrap();
    }

    fn options(&self) -> ExecutorOptions {
        ExecutorOptions {
            workspace_parent: Some(self.temp.path().join("work")),
            repo_base_dir: self.temp.path().to_path_buf(),
            ..ExecutorOptions::default()
        }
    }

    fn executor(&self, options: ExecutorOptions) -> Executor {
        Executor::new(&self.store, Arc::clone(&self.audit), options)
    }

    fn log(&self) -> String {
        fs::read_to_string(self.audit.path()).unwrap()
    }
}

fn collect(executor: &mut Executor) -> (Vec<Frame>, Vec<ZenDeployError>) {
    let mut frames = Vec::new();
    let mut errors = Vec::new();
    for item in executor.execute().unwrap() {
        match item {
            Ok(frame) => frames.push(frame),
            Err(e) => errors.push(e),
        }
    }
    (frames, errors)
}

fn raw(frames: &[Frame]) -> Vec<&str> {
    frames.iter().map(|f| f.raw.as_str()).collect()
}

#[test]
#[serial]
fn successful_step_emits_frames_in_order() {
    let mut fx = Fixture::new();
    fx.repo("api", "#!/bin/sh\necho \"profile=$AWS_PROFILE region=$REGION\"\n");
    let mut env = BTreeMap::new();
    env.insert("REGION".to_string(), "eu-west-1".to_string());
    fx.step_with_env("Deploy", "api", env);

    let mut executor = fx.executor(fx.options());
    executor.prepare().unwrap();
    let (frames, errors) = collect(&mut executor);

    assert!(errors.is_empty());
    let separator = "-".repeat(40);
    assert_eq!(
        raw(&frames),
        vec![
            "=== Step 1: Deploy ===",
            "Cloning repository...",
            "Repository cloned successfully",
            "$ export AWS_PROFILE=staging",
            "AWS Profile set",
            "$ export REGION=eu-west-1",
            "Environment variables set",
            frames[7].raw.as_str(),
            "profile=staging region=eu-west-1",
            "=== Step 1 Completed Successfully ===",
            separator.as_str(),
            "ZenDeploy completed successfully!",
        ]
    );
    assert!(frames[7].raw.starts_with("$ "));
    assert!(frames[7].raw.ends_with("run.sh"));

    let report = executor.report();
    assert_eq!(report.state, ExecutorState::Completed);
    assert!(report.is_success());
    assert_eq!(report.steps[0].exit_code, Some(0));
    assert_eq!(executor.state(), ExecutorState::Cleaned);
}

#[test]
#[serial]
fn missing_repository_fails_only_that_step() {
    let mut fx = Fixture::new();
    fx.repo("api", "#!/bin/sh\necho one\n");
    fx.step("First", "api");
    fx.step("Second", "missing");
    fx.step("Third", "api");

    let mut executor = fx.executor(fx.options());
    executor.prepare().unwrap();
    let (frames, errors) = collect(&mut executor);

    assert!(errors.is_empty());
    let raw = raw(&frames);
    assert!(raw.contains(&"ERROR: Failed to clone repository"));
    assert!(raw.contains(&"=== Step 2 Failed ==="));
    assert!(raw.contains(&"=== Step 3 Completed Successfully ==="));
    assert_eq!(raw.last(), Some(&"ZenDeploy completed with errors!"));

    let report = executor.report();
    assert_eq!(report.state, ExecutorState::Completed);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert!(report.steps[1]
        .error
        .as_deref()
        .unwrap()
        .contains("Repository path not found"));
    assert!(fx.log().contains("repo_clone_error"));
}

#[test]
#[serial]
fn missing_script_is_step_failure() {
    let mut fx = Fixture::new();
    let dir = fx.temp.path().join("repos/empty");
    fs::create_dir_all(dir.join("docs")).unwrap();
    fs::write(dir.join("docs/README"), "").unwrap();
    fx.step("Empty", "empty");

    let mut executor = fx.executor(fx.options());
    executor.prepare().unwrap();
    let (frames, errors) = collect(&mut executor);

    assert!(errors.is_empty());
    assert!(frames
        .iter()
        .any(|f| f.raw.starts_with("ERROR: Script not found at ")));
    assert_eq!(executor.report().steps[0].status, StepStatus::Failed);

    let log = fx.log();
    assert!(log.contains("Looking for script at"));
    assert!(log.contains("docs/README"));
    assert!(log.contains("| step_error | Script not found"));
}

#[test]
#[serial]
fn script_error_fails_step_and_continues() {
    let mut fx = Fixture::new();
    fx.repo("bad", "#!/bin/sh\necho oops >&2\nexit 3\n");
    fx.repo("good", "#!/bin/sh\necho fine\n");
    fx.step("Bad", "bad");
    fx.step("Good", "good");

    let mut executor = fx.executor(fx.options());
    executor.prepare().unwrap();
    let (frames, errors) = collect(&mut executor);

    assert!(errors.is_empty());
    let raw = raw(&frames);
    assert!(raw.contains(&"ERROR: Script execution failed: oops"));
    assert!(raw.contains(&"=== Step 1 Failed ==="));
    assert!(raw.contains(&"fine"));

    let report = executor.report();
    assert_eq!(report.steps[0].exit_code, Some(3));
    assert_eq!(
        report.steps[0].error.as_deref(),
        Some("Script execution failed for run.sh: Script exited with code 3")
    );
    assert_eq!(report.steps[1].status, StepStatus::Completed);
    assert!(!report.is_success());
}

#[test]
#[serial]
fn lenient_mode_completes_on_script_error() {
    let mut fx = Fixture::new();
    fx.repo("bad", "#!/bin/sh\nexit 3\n");
    fx.step("Bad", "bad");

    let options = ExecutorOptions {
        fail_on_script_error: false,
        ..fx.options()
    };
    let mut executor = fx.executor(options);
    executor.prepare().unwrap();
    let (frames, _) = collect(&mut executor);

    assert!(raw(&frames).contains(&"=== Step 1 Completed Successfully ==="));
    let report = executor.report();
    assert_eq!(report.steps[0].status, StepStatus::Completed);
    assert_eq!(report.steps[0].exit_code, Some(3));
}

#[test]
#[serial]
fn unexpected_fault_aborts_pipeline() {
    let mut fx = Fixture::new();
    fx.repo("api", "#!/bin/sh\necho hi\n");
    fx.step("First", "api");
    fx.step("Second", "api");

    let mut executor = fx.executor(fx.options());
    executor.prepare().unwrap();
    let workspace = executor.workspace().unwrap().to_path_buf();
    fs::write(workspace.join("step_0"), "not a directory").unwrap();

    let (frames, errors) = collect(&mut executor);

    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ZenDeployError::Unexpected { .. }));
    let raw = raw(&frames);
    assert_eq!(raw[0], "=== Step 1: First ===");
    assert!(raw[1].starts_with("ERROR: Error in step First:"));
    assert_eq!(raw[2], "=== Step 1 Failed ===");
    assert_eq!(raw.len(), 3);

    let report = executor.report();
    assert_eq!(report.state, ExecutorState::Aborted);
    assert_eq!(report.steps[1].status, StepStatus::Skipped);
    assert_eq!(executor.state(), ExecutorState::Cleaned);
    assert!(!workspace.exists());
    assert!(fx.log().contains("pipeline_aborted"));
}

#[test]
#[serial]
fn cancelled_before_start_runs_nothing() {
    let mut fx = Fixture::new();
    fx.repo("api", "#!/bin/sh\necho hi\n");
    fx.step("First", "api");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let options = ExecutorOptions {
        cancel,
        ..fx.options()
    };
    let mut executor = fx.executor(options);
    executor.prepare().unwrap();
    let (frames, errors) = collect(&mut executor);

    assert!(errors.is_empty());
    assert_eq!(raw(&frames), vec!["Pipeline cancelled"]);
    let report = executor.report();
    assert_eq!(report.state, ExecutorState::Aborted);
    assert_eq!(report.steps[0].status, StepStatus::Skipped);
}

#[test]
#[serial]
fn cancellation_kills_running_script() {
    let mut fx = Fixture::new();
    fx.repo("slow", "#!/bin/sh\necho started\nsleep 10\necho never\n");
    fx.step("Slow", "slow");
    fx.step("After", "slow");

    let cancel = CancellationToken::new();
    let options = ExecutorOptions {
        cancel: cancel.clone(),
        ..fx.options()
    };
    let mut executor = fx.executor(options);
    executor.prepare().unwrap();

    let mut frames = Vec::new();
    for item in executor.execute().unwrap() {
        let frame = item.unwrap();
        if frame.raw == "started" {
            cancel.cancel();
        }
        frames.push(frame);
    }

    let raw = raw(&frames);
    assert!(!raw.contains(&"never"));
    assert_eq!(raw.last(), Some(&"Pipeline cancelled"));

    let report = executor.report();
    assert_eq!(report.state, ExecutorState::Aborted);
    assert_eq!(report.steps[0].status, StepStatus::Failed);
    assert_eq!(report.steps[1].status, StepStatus::Skipped);
}

#[test]
#[serial]
fn step_timeout_fails_step_only() {
    let mut fx = Fixture::new();
    fx.repo("slow", "#!/bin/sh\nsleep 10\n");
    fx.repo("fast", "#!/bin/sh\necho quick\n");
    fx.step("Slow", "slow");
    fx.step("Fast", "fast");

    let options = ExecutorOptions {
        step_timeout: Some(Duration::from_millis(500)),
        ..fx.options()
    };
    let mut executor = fx.executor(options);
    executor.prepare().unwrap();
    let (frames, _) = collect(&mut executor);

    let report = executor.report();
    assert_eq!(report.state, ExecutorState::Completed);
    assert_eq!(report.steps[0].status, StepStatus::Failed);
    assert_eq!(
        report.steps[0].error.as_deref(),
        Some("Script execution failed for run.sh: Script timed out")
    );
    assert_eq!(report.steps[1].status, StepStatus::Completed);
    assert!(raw(&frames).contains(&"quick"));
}

#[test]
#[serial]
fn pipeline_timeout_aborts_run() {
    let mut fx = Fixture::new();
    fx.repo("slow", "#!/bin/sh\nsleep 10\n");
    fx.step("Slow", "slow");
    fx.step("Never", "slow");

    let options = ExecutorOptions {
        pipeline_timeout: Some(Duration::from_millis(500)),
        ..fx.options()
    };
    let mut executor = fx.executor(options);
    executor.prepare().unwrap();
    let (frames, _) = collect(&mut executor);

    assert_eq!(frames.last().unwrap().raw, "Pipeline timed out");
    let report = executor.report();
    assert_eq!(report.state, ExecutorState::Aborted);
    assert_eq!(report.steps[1].status, StepStatus::Skipped);
}

#[test]
#[serial]
fn second_executor_is_busy_while_first_runs() {
    let mut fx = Fixture::new();
    fx.repo("api", "#!/bin/sh\necho hi\n");
    fx.step("Only", "api");

    let mut first = fx.executor(fx.options());
    let mut second = fx.executor(fx.options());
    first.prepare().unwrap();
    second.prepare().unwrap();

    let mut run = first.execute().unwrap();
    run.next();
    assert!(matches!(second.execute(), Err(ZenDeployError::ExecutorBusy)));
    drop(run);

    let (_, errors) = collect(&mut second);
    assert!(errors.is_empty());
    assert!(second.report().is_success());
}

#[test]
#[serial]
fn dropping_run_early_aborts_and_cleans_up() {
    let mut fx = Fixture::new();
    fx.repo("api", "#!/bin/sh\necho hi\n");
    fx.step("First", "api");
    fx.step("Second", "api");

    let mut executor = fx.executor(fx.options());
    executor.prepare().unwrap();
    let workspace = executor.workspace().unwrap().to_path_buf();

    let mut run = executor.execute().unwrap();
    assert_eq!(run.next().unwrap().unwrap().raw, "=== Step 1: First ===");
    drop(run);

    assert_eq!(executor.state(), ExecutorState::Cleaned);
    assert!(!workspace.exists());
    let report = executor.report();
    assert_eq!(report.state, ExecutorState::Aborted);
    assert_eq!(report.steps[0].error.as_deref(), Some("Interrupted"));
    assert_eq!(report.steps[1].status, StepStatus::Skipped);
    assert!(fx
        .log()
        .contains("pipeline_aborted | Pipeline dropped before completion"));
}

#[test]
#[serial]
fn executor_can_run_again_after_cleanup() {
    let mut fx = Fixture::new();
    fx.repo("api", "#!/bin/sh\necho hi\n");
    fx.step("Only", "api");

    let mut executor = fx.executor(fx.options());
    for _ in 0..2 {
        executor.prepare().unwrap();
        let (_, errors) = collect(&mut executor);
        assert!(errors.is_empty());
        assert!(executor.report().is_success());
    }
    assert_eq!(fx.log().matches("| execute_start |").count(), 2);
}

#[test]
#[serial]
fn execute_requires_prepare() {
    let mut fx = Fixture::new();
    fx.repo("api", "#!/bin/sh\necho hi\n");
    fx.step("Only", "api");

    let mut executor = fx.executor(fx.options());
    assert!(matches!(
        executor.execute(),
        Err(ZenDeployError::InvalidState { .. })
    ));
}
