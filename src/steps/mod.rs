//! Step definitions and the step store.
//!
//! - [`Step`] - One pipeline step loaded from a YAML definition
//! - [`StepStore`] - The ordered, deduplicated list of steps

pub mod step;
pub mod store;

pub use step::Step;
pub use store::{StepStore, StoreStatus, ValidationIssue};
