//! Browser action execution.
//!
//! Translates an approved request into an ordered action list, dispatches
//! each step to the browser plane, and reports per-step results. The
//! automation engine itself lives behind the [`BrowserPlane`] trait; only
//! the [`NullPlane`] stub ships here.

pub mod executor;
pub mod plane;
pub mod worker;

pub use executor::{compose_actions, run_actions};
pub use plane::{BrowserError, BrowserPlane, NullPlane, PlaneStatus, StepOutput};
pub use worker::{spawn_executor, ExecuteJob, ExecutionOutcome, ExecutorHandle};
