//! Pluggable run policies
//!
//! A [`Policy`] supplies every extension point of a run: initial ordering, retry
//! decisions, the global stop condition, fixture injection, the final exit status, and
//! the per-test reporter. Every hook has a default, so implementors override only what
//! they need.

mod configured;

pub use configured::ConfiguredPolicy;

use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::executor::{aggregate, WorkQueue};
use crate::models::{RunStats, Test, TestProperties, TestResult};
use crate::output::ResultFormatter;
use crate::reporter::{Reporter, TracingReporter};

/// Default directory handed to the loader
pub const DEFAULT_TEST_PATH: &str = "test";

/// Extension points of a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Hook {
    Schedule,
    Analyze,
    Stop,
    Provide,
    Exit,
    Report,
}

impl Hook {
    pub fn name(&self) -> &'static str {
        match self {
            Hook::Schedule => "schedule",
            Hook::Analyze => "analyze",
            Hook::Stop => "stop",
            Hook::Provide => "provide",
            Hook::Exit => "exit",
            Hook::Report => "report",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error raised by a policy hook; always fatal to the run
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("{0}")]
    Failed(String),

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("returned {returned} tests but only {received} were prepared")]
    ScheduleGrew { received: usize, returned: usize },
}

impl PolicyError {
    pub fn failed(message: impl Into<String>) -> Self {
        PolicyError::Failed(message.into())
    }
}

/// Run policy with a default for every hook
pub trait Policy: Send + Sync {
    /// Build the initial work order. May drop or reorder tests, never add them.
    fn schedule(&self, tests: Vec<Test>) -> Result<Vec<Test>, PolicyError> {
        Ok(tests)
    }

    /// Inspect a finished attempt; push `test` back onto `queue` to retry it.
    ///
    /// Termination is the caller's concern: requeueing unconditionally never drains.
    fn analyze(
        &self,
        _test: &Test,
        _result: &TestResult,
        _queue: &WorkQueue,
    ) -> Result<(), PolicyError> {
        Ok(())
    }

    /// Return true to stop dispatching new work after this result
    fn stop(&self, _result: &TestResult) -> Result<bool, PolicyError> {
        Ok(false)
    }

    /// Produce the fixture injected into the attempt's context
    fn provide(
        &self,
        _thread_id: usize,
        _properties: &TestProperties,
    ) -> Result<Value, PolicyError> {
        Ok(Value::Object(Default::default()))
    }

    /// Compute the process status and emit the final report
    fn exit(&self, results: &[TestResult], stats: &RunStats) -> Result<i32, PolicyError> {
        Ok(aggregate::finalize(results, stats, &ResultFormatter::default()))
    }

    /// Reporter narrating one attempt
    fn report(&self, _thread_id: usize, _properties: &TestProperties) -> Arc<dyn Reporter> {
        default_reporter()
    }

    fn thread_count(&self) -> usize {
        1
    }

    fn test_path(&self) -> &Path {
        Path::new(DEFAULT_TEST_PATH)
    }
}

/// Reporter shared by every attempt unless a policy overrides `report`
pub fn default_reporter() -> Arc<dyn Reporter> {
    static REPORTER: OnceLock<Arc<dyn Reporter>> = OnceLock::new();
    Arc::clone(REPORTER.get_or_init(|| Arc::new(TracingReporter)))
}

/// Policy using every default, with a configurable pool size and test path
#[derive(Clone, Debug)]
pub struct DefaultPolicy {
    thread_count: usize,
    test_path: PathBuf,
}

impl DefaultPolicy {
    pub fn new() -> Self {
        Self {
            thread_count: 1,
            test_path: PathBuf::from(DEFAULT_TEST_PATH),
        }
    }

    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    pub fn with_test_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.test_path = path.into();
        self
    }
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for DefaultPolicy {
    fn thread_count(&self) -> usize {
        self.thread_count
    }

    fn test_path(&self) -> &Path {
        &self.test_path
    }
}
