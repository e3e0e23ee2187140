//! Data models for test execution
//!
//! This module contains the test units, per-attempt results and run counters.

mod stats;
mod test_result;

pub use stats::RunStats;
pub use test::{ClassHooks, StageFn, StageResult, Test, TestContext, TestProperties};
pub use test_result::{panic_message, Outcome, StageError, Summary, TestResult};
