//! Pipeline execution.
//!
//! An [`Executor`] snapshots a step store, allocates an ephemeral workspace
//! in [`Executor::prepare`], and returns a lazy [`PipelineRun`] from
//! [`Executor::execute`]. Only one pipeline runs per process at a time.

pub mod cancel;
pub mod executor;
pub mod frame;
pub mod pipeline;
pub mod slot;

pub use cancel::CancellationToken;
pub use executor::{
    Executor, ExecutorOptions, ExecutorState, PipelineReport, StepReport, StepStatus,
};
pub use frame::{Frame, FrameKind};
pub use pipeline::PipelineRun;
pub use slot::ExecutionSlot;
