//! Hook pipeline
//!
//! Runs before-each, the test body, and after-each for a single attempt.

use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

use crate::models::{StageError, StageFn, StageResult, Test, TestContext, TestResult};
use crate::utils::Timer;

/// Run one attempt of `test`.
///
/// Every stage runs even if an earlier one failed, so teardown always gets its chance.
/// Errors and panics are captured into the returned result, never propagated.
pub fn run(test: &Test, context: &mut TestContext) -> TestResult {
    let timer = Timer::start(test.properties().to_string());

    let before_each_result = run_optional(test.before_each(), context);
    let test_result = run_stage(test.body(), context);
    let after_each_result = run_optional(test.after_each(), context);

    let mut result = TestResult::new(
        test.properties().clone(),
        before_each_result,
        test_result,
        after_each_result,
    );
    result.thread_id = context.thread_id;
    result.duration_ms = timer.elapsed_ms();
    result
}

fn run_optional(stage: Option<&StageFn>, context: &mut TestContext) -> StageResult {
    match stage {
        Some(stage) => run_stage(stage, context),
        None => Ok(Value::Null),
    }
}

/// Run a single stage, turning a panic into a stage error
pub fn run_stage(stage: &StageFn, context: &mut TestContext) -> StageResult {
    panic::catch_unwind(AssertUnwindSafe(|| stage(context))).unwrap_or_else(|payload| {
        let err = StageError::from_panic(payload);
        debug!("{} stage panicked: {}", context.properties, err);
        Err(err)
    })
}
