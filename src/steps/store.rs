//! Ordered, deduplicated collection of pipeline steps.

use crate::error::{Result, ZenDeployError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::step::Step;

/// Progress snapshot of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    /// Number of steps in the store.
    pub total_steps: usize,
    /// Cursor position.
    pub current_step: usize,
    /// Whether the cursor has passed the last step.
    pub completed: bool,
}

/// A step that fails validation and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Order of the offending step.
    pub order: usize,
    /// Step name.
    pub name: String,
    /// Empty required fields.
    pub missing: Vec<&'static str>,
}

/// Holds the pipeline's steps in execution order.
///
/// `order` values are always `0..len()`; every mutation renumbers.
///
/// # Example
///
/// ```no_run
/// use zendeploy::steps::StepStore;
/// use std::path::Path;
///
/// let mut store = StepStore::new();
/// store.add(Path::new("steps/build.yml")).unwrap();
/// store.add(Path::new("steps/deploy.yml")).unwrap();
/// store.move_step(1, 0);
/// assert!(store.validate());
/// ```
#[derive(Debug, Default)]
pub struct StepStore {
    steps: Vec<Step>,
    cursor: usize,
}

impl StepStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the definition at `path` and append it.
    ///
    /// Fails with `DuplicateStep` if the path is already present, or a
    /// config error if the file cannot be parsed. The store is unchanged
    /// on failure.
    pub fn add(&mut self, path: &Path) -> Result<&Step> {
        if self.contains(path) {
            return Err(ZenDeployError::DuplicateStep {
                path: path.to_path_buf(),
            });
        }

        let step = Step::from_file(path, self.steps.len())?;
        self.steps.push(step);
        Ok(&self.steps[self.steps.len() - 1])
    }

    /// Append an already built step, taking over its ordering.
    pub fn push(&mut self, mut step: Step) -> Result<&Step> {
        if self.contains(&step.source_path) {
            return Err(ZenDeployError::DuplicateStep {
                path: step.source_path,
            });
        }

        step.order = self.steps.len();
        self.steps.push(step);
        Ok(&self.steps[self.steps.len() - 1])
    }

    /// Remove the step at `index`. Out-of-range indexes are a no-op.
    pub fn remove(&mut self, index: usize) -> Option<Step> {
        if index >= self.steps.len() {
            return None;
        }

        let removed = self.steps.remove(index);
        self.renumber();
        Some(removed)
    }

    /// Move a step from one position to another.
    ///
    /// Returns `false` without changing anything if either index is out of
    /// range.
    pub fn move_step(&mut self, from: usize, to: usize) -> bool {
        if from >= self.steps.len() || to >= self.steps.len() {
            return false;
        }

        let step = self.steps.remove(from);
        self.steps.insert(to, step);
        self.renumber();
        true
    }

    /// Every step's environment folded in order; later steps win.
    pub fn merged_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        for step in &self.steps {
            env.extend(step.env_vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        env
    }

    /// True iff every step has its required fields set.
    pub fn validate(&self) -> bool {
        self.steps.iter().all(Step::is_valid)
    }

    /// Steps failing validation.
    pub fn validation_errors(&self) -> Vec<ValidationIssue> {
        self.steps
            .iter()
            .filter(|s| !s.is_valid())
            .map(|s| ValidationIssue {
                order: s.order,
                name: s.name.clone(),
                missing: s.missing_fields(),
            })
            .collect()
    }

    /// Drop every step and reset the cursor.
    pub fn clear(&mut self) {
        self.steps = Vec::new();
        self.cursor = 0;
    }

    /// Current progress snapshot.
    pub fn status(&self) -> StoreStatus {
        StoreStatus {
            total_steps: self.steps.len(),
            current_step: self.cursor,
            completed: self.cursor >= self.steps.len(),
        }
    }

    /// Move the cursor forward by one step.
    pub fn advance(&mut self) {
        if self.cursor < self.steps.len() {
            self.cursor += 1;
        }
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Step at `index`.
    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Whether a step from `path` is present.
    pub fn contains(&self, path: &Path) -> bool {
        self.steps.iter().any(|s| s.source_path == path)
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn renumber(&mut self) {
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.order = i;
        }
        self.cursor = self.cursor.min(self.steps.len());
    }
}
