//! Test execution engine
//!
//! Provides the work queue, the per-attempt hook pipeline, the multi-threaded run
//! controller, and result aggregation.

pub mod aggregate;
mod controller;
pub mod pipeline;
mod queue;

pub use aggregate::RunReport;
pub use controller::{RunController, RunError, RunOutcome, RunState};
pub use queue::WorkQueue;
