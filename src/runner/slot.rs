//! Process-wide execution slot.
//!
//! At most one pipeline runs per process. [`ExecutionSlot::acquire`] hands out
//! a guard that releases the slot when dropped.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, ZenDeployError};

static SLOT_TAKEN: AtomicBool = AtomicBool::new(false);

/// Guard for the process-wide execution slot.
#[derive(Debug)]
pub struct ExecutionSlot {
    _private: (),
}

impl ExecutionSlot {
    /// Take the slot, or fail with `ExecutorBusy` if another pipeline holds it.
    pub fn acquire() -> Result<Self> {
        SLOT_TAKEN
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| Self { _private: () })
            .map_err(|_| ZenDeployError::ExecutorBusy)
    }

    /// Whether any pipeline currently holds the slot.
    pub fn is_taken() -> bool {
        SLOT_TAKEN.load(Ordering::SeqCst)
    }
}

impl Drop for ExecutionSlot {
    fn drop(&mut self) {
        SLOT_TAKEN.store(false, Ordering::SeqCst);
    }
}
