//! Policy built from a run configuration
//!
//! Adds bounded retries of broken attempts and fail-fast stopping on top of the defaults.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::{default_reporter, Policy, PolicyError};
use crate::config::RunConfig;
use crate::executor::{aggregate, WorkQueue};
use crate::models::{Outcome, RunStats, Test, TestProperties, TestResult};
use crate::output::{OutputFormat, ResultFormatter};
use crate::reporter::Reporter;

/// Policy driven by [`RunConfig`]
#[derive(Clone)]
pub struct ConfiguredPolicy {
    thread_count: usize,
    test_path: PathBuf,
    max_retries: u32,
    fail_fast: bool,
    format: OutputFormat,
    reporter: Arc<dyn Reporter>,
}

impl ConfiguredPolicy {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            thread_count: config.thread_count,
            test_path: config.test_path.clone(),
            max_retries: config.max_retries,
            fail_fast: config.fail_fast,
            format: OutputFormat::from_str(&config.format).unwrap_or(OutputFormat::Table),
            reporter: default_reporter(),
        }
    }

    /// Narrate every attempt through `reporter` instead of the shared default
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    fn will_retry(&self, result: &TestResult) -> bool {
        result.outcome() == Outcome::Broken && result.attempt <= self.max_retries
    }
}

impl Policy for ConfiguredPolicy {
    /// Retry broken attempts until a test has used `max_retries` extra attempts.
    ///
    /// Failed assertions are verdicts and are never retried.
    fn analyze(
        &self,
        test: &Test,
        result: &TestResult,
        queue: &WorkQueue,
    ) -> Result<(), PolicyError> {
        if self.will_retry(result) {
            info!(
                "Retrying {} (attempt {}/{})",
                result.properties,
                result.attempt + 1,
                self.max_retries + 1
            );
            queue.requeue(test.clone());
        }
        Ok(())
    }

    /// Fail fast on a final verdict only; a broken attempt that will be retried does not stop.
    fn stop(&self, result: &TestResult) -> Result<bool, PolicyError> {
        Ok(self.fail_fast && !result.outcome().is_success() && !self.will_retry(result))
    }

    fn exit(&self, results: &[TestResult], stats: &RunStats) -> Result<i32, PolicyError> {
        let formatter = ResultFormatter::new(self.format);
        Ok(aggregate::finalize(results, stats, &formatter))
    }

    fn report(&self, _thread_id: usize, _properties: &TestProperties) -> Arc<dyn Reporter> {
        Arc::clone(&self.reporter)
    }

    fn thread_count(&self) -> usize {
        self.thread_count
    }

    fn test_path(&self) -> &Path {
        &self.test_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StageError;
    use serde_json::Value;

    fn attempt(test: &Test, body: Result<Value, StageError>, attempt: u32) -> TestResult {
        let mut result = TestResult::new(
            test.properties().clone(),
            Ok(Value::Null),
            body,
            Ok(Value::Null),
        );
        result.attempt = attempt;
        result
    }

    fn policy(max_retries: u32, fail_fast: bool) -> ConfiguredPolicy {
        ConfiguredPolicy::from_config(&RunConfig {
            max_retries,
            fail_fast,
            thread_count: 3,
            ..Default::default()
        })
    }

    #[test]
    fn test_from_config() {
        let policy = policy(2, true);
        assert_eq!(policy.thread_count(), 3);
        assert_eq!(policy.max_retries(), 2);
        assert!(policy.fail_fast());
        assert_eq!(policy.test_path(), Path::new("test"));
    }

    #[test]
    fn test_retries_broken_up_to_limit() {
        let policy = policy(2, false);
        let test = Test::new("Flaky", "network", |_| Ok(Value::Null));
        let queue = WorkQueue::new(Vec::new());
        let broken = || Err(StageError::unexpected("timeout"));

        policy.analyze(&test, &attempt(&test, broken(), 1), &queue).unwrap();
        policy.analyze(&test, &attempt(&test, broken(), 2), &queue).unwrap();
        assert_eq!(queue.len(), 2);

        policy.analyze(&test, &attempt(&test, broken(), 3), &queue).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_does_not_retry_failed_or_passed() {
        let policy = policy(5, false);
        let test = Test::new("Math", "sum", |_| Ok(Value::Null));
        let queue = WorkQueue::new(Vec::new());

        let failed = attempt(&test, Err(StageError::assertion("1 != 2")), 1);
        policy.analyze(&test, &failed, &queue).unwrap();
        let passed = attempt(&test, Ok(Value::Null), 1);
        policy.analyze(&test, &passed, &queue).unwrap();

        assert!(queue.is_empty());
    }

    #[test]
    fn test_fail_fast_stop() {
        let test = Test::new("Math", "sum", |_| Ok(Value::Null));
        let passed = attempt(&test, Ok(Value::Null), 1);
        let failed = attempt(&test, Err(StageError::assertion("1 != 2")), 1);

        assert!(!policy(0, true).stop(&passed).unwrap());
        assert!(policy(0, true).stop(&failed).unwrap());
        assert!(!policy(0, false).stop(&failed).unwrap());
    }

    #[test]
    fn test_fail_fast_waits_for_retries() {
        let policy = policy(2, true);
        let test = Test::new("Flaky", "network", |_| Ok(Value::Null));
        let broken = |n| attempt(&test, Err(StageError::unexpected("timeout")), n);

        assert!(!policy.stop(&broken(1)).unwrap());
        assert!(!policy.stop(&broken(2)).unwrap());
        assert!(policy.stop(&broken(3)).unwrap());

        let failed = attempt(&test, Err(StageError::assertion("1 != 2")), 1);
        assert!(policy.stop(&failed).unwrap());
    }
}
