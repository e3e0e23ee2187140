//! Test result models
//!
//! Defines stage errors, per-attempt results, outcome classification and summaries.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

use crate::models::{StageResult, TestProperties};

/// Error captured from a single stage
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageError {
    /// Deliberate, unmet expectation raised by the test body
    #[error("assertion failed: {message}")]
    Assertion { message: String },
    /// Anything else: crashes, I/O failures, setup or teardown errors
    #[error("unexpected error: {message}")]
    Unexpected { message: String },
}

impl StageError {
    pub fn assertion(message: impl Into<String>) -> Self {
        StageError::Assertion {
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        StageError::Unexpected {
            message: message.into(),
        }
    }

    pub fn is_assertion(&self) -> bool {
        matches!(self, StageError::Assertion { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            StageError::Assertion { message } | StageError::Unexpected { message } => message,
        }
    }

    /// Convert a caught panic payload into a stage error
    ///
    /// Panics raised by the `assert!` family start with "assertion" and count as
    /// assertion failures; every other panic is unexpected.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = panic_message(payload.as_ref());
        if message.starts_with("assertion") {
            StageError::assertion(message)
        } else {
            StageError::unexpected(format!("panicked: {message}"))
        }
    }
}

/// Extract the message carried by a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Classification of a single attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Broken,
    Failed,
}

impl Outcome {
    /// Classify an attempt.
    ///
    /// An assertion failure in the body wins over any other error; any remaining error
    /// in the three stages makes the attempt broken.
    pub fn classify(result: &TestResult) -> Outcome {
        if matches!(&result.test_result, Err(e) if e.is_assertion()) {
            return Outcome::Failed;
        }
        let any_error = result.before_each_result.is_err()
            || result.test_result.is_err()
            || result.after_each_result.is_err();
        if any_error {
            Outcome::Broken
        } else {
            Outcome::Passed
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Outcome::Passed => "✓",
            Outcome::Broken => "!",
            Outcome::Failed => "✗",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Passed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Passed => write!(f, "PASSED"),
            Outcome::Broken => write!(f, "BROKEN"),
            Outcome::Failed => write!(f, "FAILED"),
        }
    }
}

/// Result of one execution attempt of a test
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestResult {
    pub properties: TestProperties,
    pub before_each_result: StageResult,
    pub test_result: StageResult,
    pub after_each_result: StageResult,
    /// Worker thread that ran the attempt
    pub thread_id: usize,
    /// 1 for the first attempt, incremented per retry
    pub attempt: u32,
    pub duration_ms: u64,
}

impl TestResult {
    pub fn new(
        properties: TestProperties,
        before_each_result: StageResult,
        test_result: StageResult,
        after_each_result: StageResult,
    ) -> Self {
        Self {
            properties,
            before_each_result,
            test_result,
            after_each_result,
            thread_id: 0,
            attempt: 1,
            duration_ms: 0,
        }
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::classify(self)
    }

    /// First error among the stages, in execution order
    pub fn first_error(&self) -> Option<&StageError> {
        [
            &self.before_each_result,
            &self.test_result,
            &self.after_each_result,
        ]
        .into_iter()
        .find_map(|r| r.as_ref().err())
    }

    /// Error that decided the outcome: the body's assertion if any, else the first error
    pub fn deciding_error(&self) -> Option<&StageError> {
        match &self.test_result {
            Err(e) if e.is_assertion() => Some(e),
            _ => self.first_error(),
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = self.outcome();
        write!(
            f,
            "{} {} [{}ms]",
            outcome.symbol(),
            self.properties,
            self.duration_ms
        )?;
        if self.attempt > 1 {
            write!(f, " (attempt {})", self.attempt)?;
        }
        if let Some(err) = self.deciding_error() {
            write!(f, " - {err}")?;
        }
        Ok(())
    }
}

/// Outcome counts over a list of results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub passed: usize,
    pub broken: usize,
    pub failed: usize,
}

impl Summary {
    pub fn new(passed: usize, broken: usize, failed: usize) -> Self {
        Self {
            passed,
            broken,
            failed,
        }
    }

    /// Tally every result; retried attempts are counted individually
    pub fn from_results(results: &[TestResult]) -> Self {
        results
            .iter()
            .fold(Summary::default(), |mut summary, result| {
                match result.outcome() {
                    Outcome::Passed => summary.passed += 1,
                    Outcome::Broken => summary.broken += 1,
                    Outcome::Failed => summary.failed += 1,
                }
                summary
            })
    }

    pub fn total(&self) -> usize {
        self.passed + self.broken + self.failed
    }

    /// Process exit status: 1 if anything broke or failed, else 0
    pub fn exit_status(&self) -> i32 {
        if self.broken > 0 || self.failed > 0 {
            1
        } else {
            0
        }
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total() as f64) * 100.0
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Passed: {} | Broken: {} | Failed: {}",
            self.passed, self.broken, self.failed
        )
    }
}
