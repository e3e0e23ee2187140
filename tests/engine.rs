use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use threadtest::config::RunConfig;
use threadtest::executor::{aggregate, RunController, RunError, RunReport};
use threadtest::loader::{Loader, Registry};
use threadtest::models::{Outcome, RunStats, StageError, Summary, Test, TestProperties, TestResult};
use threadtest::policy::{ConfiguredPolicy, DefaultPolicy, Hook, Policy, PolicyError};
use threadtest::reporter::{MemoryReporter, ReportEvent};
use threadtest::WorkQueue;

fn registry(class: &str, count: usize) -> Registry {
    let mut registry = Registry::new();
    for i in 0..count {
        registry.register(Test::new(class, format!("t{i:02}"), |_| Ok(Value::Null)));
    }
    registry
}

fn load(registry: &Registry) -> Vec<Test> {
    registry.load(std::path::Path::new("test")).unwrap()
}

/// Policy with a configurable pool size and overrides supplied per test case
struct PoolPolicy {
    threads: usize,
    stop_on_first: bool,
    retry_broken_up_to: u32,
}

impl PoolPolicy {
    fn new(threads: usize) -> Self {
        Self {
            threads,
            stop_on_first: false,
            retry_broken_up_to: 0,
        }
    }
}

impl Policy for PoolPolicy {
    fn analyze(&self, test: &Test, result: &TestResult, queue: &WorkQueue) -> Result<(), PolicyError> {
        if result.outcome() == Outcome::Broken && result.attempt < self.retry_broken_up_to {
            queue.requeue(test.clone());
        }
        Ok(())
    }

    fn stop(&self, _result: &TestResult) -> Result<bool, PolicyError> {
        Ok(self.stop_on_first)
    }

    fn provide(&self, thread_id: usize, _properties: &TestProperties) -> Result<Value, PolicyError> {
        Ok(json!({ "thread": thread_id }))
    }

    fn thread_count(&self) -> usize {
        self.threads
    }
}

#[test]
fn three_passing_tests_end_to_end() {
    let registry = registry("Smoke", 3);
    let controller = RunController::new(Arc::new(DefaultPolicy::new()));

    let outcome = controller.run(load(&registry)).unwrap();
    assert_eq!(
        outcome.stats,
        RunStats {
            loaded: 3,
            prepared: 3,
            planned: 3,
            executed: 3,
        }
    );
    assert_eq!(outcome.summary(), Summary::new(3, 0, 0));
    assert!(!outcome.stopped);
    assert_eq!(controller.finish(&outcome).unwrap(), 0);
}

#[test]
fn every_test_runs_exactly_once_across_threads() {
    for threads in [1, 2, 4, 8] {
        let registry = registry("Pool", 40);
        let controller = RunController::new(Arc::new(PoolPolicy::new(threads)));

        let outcome = controller.run(load(&registry)).unwrap();
        assert_eq!(outcome.results.len(), 40);
        assert_eq!(outcome.stats.executed, 40);

        let mut seen: HashMap<TestProperties, usize> = HashMap::new();
        for result in &outcome.results {
            *seen.entry(result.properties.clone()).or_default() += 1;
            assert!(result.thread_id < threads);
        }
        assert_eq!(seen.len(), 40);
        assert!(seen.values().all(|&n| n == 1));
    }
}

#[test]
fn always_broken_test_is_attempted_retries_plus_one_times() {
    let mut registry = Registry::new();
    registry.register(Test::new("Net", "timeout", |_| {
        Err(StageError::unexpected("connection reset"))
    }));

    let reporter = MemoryReporter::new();
    let policy = ConfiguredPolicy::from_config(&RunConfig {
        thread_count: 3,
        max_retries: 2,
        ..Default::default()
    })
    .with_reporter(reporter.clone());
    let controller = RunController::new(Arc::new(policy));

    let outcome = controller.run(load(&registry)).unwrap();
    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.stats.planned, 1);
    assert_eq!(outcome.stats.executed, 3);
    assert_eq!(outcome.summary(), Summary::new(0, 3, 0));

    let attempts: Vec<u32> = outcome.results.iter().map(|r| r.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);

    let started = reporter
        .events_for(&TestProperties::new("Net", "timeout"))
        .into_iter()
        .filter(|e| matches!(e, ReportEvent::Started { .. }))
        .count();
    assert_eq!(started, 3);

    assert_eq!(controller.finish(&outcome).unwrap(), 1);
}

#[test]
fn stop_on_first_result_drains_without_dispatching_more() {
    let threads = 4;
    let registry = registry("Stop", 50);
    let policy = PoolPolicy {
        stop_on_first: true,
        ..PoolPolicy::new(threads)
    };
    let controller = RunController::new(Arc::new(policy));

    let outcome = controller.run(load(&registry)).unwrap();
    assert!(outcome.stopped);
    assert_eq!(outcome.stats.planned, 50);
    assert!(outcome.stats.executed >= 1);
    assert!(outcome.stats.executed < outcome.stats.planned);
    assert_eq!(outcome.results.len(), outcome.stats.executed);
}

#[test]
fn provide_receives_the_worker_thread_id() {
    let mut registry = Registry::new();
    for i in 0..20 {
        registry.register(Test::new("Fixture", format!("t{i}"), |ctx| {
            if ctx.fixture["thread"] == json!(ctx.thread_id) {
                Ok(Value::Null)
            } else {
                Err(StageError::assertion(format!(
                    "fixture {} on thread {}",
                    ctx.fixture, ctx.thread_id
                )))
            }
        }));
    }
    let controller = RunController::new(Arc::new(PoolPolicy::new(4)));

    let outcome = controller.run(load(&registry)).unwrap();
    assert_eq!(outcome.summary(), Summary::new(20, 0, 0));
}

#[test]
fn requeued_test_can_be_picked_up_by_another_thread() {
    // Breaks on whichever thread ran it first, passes anywhere else.
    let first_thread: Arc<Mutex<Option<usize>>> = Arc::new(Mutex::new(None));
    let first = Arc::clone(&first_thread);

    let mut registry = Registry::new();
    registry.register(Test::new("Sticky", "elsewhere", move |ctx| {
        let mut first = first.lock().unwrap();
        let owner = *first.get_or_insert(ctx.thread_id);
        if owner == ctx.thread_id {
            Err(StageError::unexpected("resource held by this thread"))
        } else {
            Ok(Value::Null)
        }
    }));

    let policy = PoolPolicy {
        retry_broken_up_to: 10_000,
        ..PoolPolicy::new(2)
    };
    let controller = RunController::new(Arc::new(policy));

    let outcome = controller.run(load(&registry)).unwrap();
    let owner = first_thread.lock().unwrap().unwrap();
    let last = outcome.results.last().unwrap();

    assert_eq!(last.outcome(), Outcome::Passed);
    assert_ne!(last.thread_id, owner);
    assert!(outcome.results[..outcome.results.len() - 1]
        .iter()
        .all(|r| r.outcome() == Outcome::Broken && r.thread_id == owner));
    assert_eq!(outcome.stats.executed, outcome.results.len());
}

#[test]
fn filter_and_schedule_shape_the_stats() {
    struct EveryOther;

    impl Policy for EveryOther {
        fn schedule(&self, tests: Vec<Test>) -> Result<Vec<Test>, PolicyError> {
            Ok(tests.into_iter().step_by(2).collect())
        }

        fn thread_count(&self) -> usize {
            2
        }
    }

    let mut registry = registry("Keep", 6);
    for i in 0..4 {
        registry.register(Test::new("Skip", format!("s{i}"), |_| Ok(Value::Null)));
    }

    let controller = RunController::new(Arc::new(EveryOther)).with_filter("Keep::");
    let outcome = controller.run(load(&registry)).unwrap();

    assert_eq!(
        outcome.stats,
        RunStats {
            loaded: 10,
            prepared: 6,
            planned: 3,
            executed: 3,
        }
    );
    assert!(outcome
        .results
        .iter()
        .all(|r| r.properties.test_class_name == "Keep"));
}

#[test]
fn broken_and_failed_tests_do_not_abort_the_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = Registry::new();

    let counter = Arc::clone(&calls);
    registry
        .class("Mixed")
        .test("passes", |_| Ok(json!("ok")))
        .test("asserts", |_| Err(StageError::assertion("1 != 2")))
        .test("panics", |_| panic!("index out of bounds"))
        .test("counts", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        });

    let controller = RunController::new(Arc::new(PoolPolicy::new(2)));
    let outcome = controller.run(load(&registry)).unwrap();

    assert_eq!(outcome.summary(), Summary::new(2, 1, 1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(controller.finish(&outcome).unwrap(), 1);
}

#[test]
fn aggregation_is_idempotent() {
    let registry = registry("Twice", 5);
    let controller = RunController::new(Arc::new(PoolPolicy::new(3)));
    let outcome = controller.run(load(&registry)).unwrap();

    let first = RunReport::new(&outcome.results, &outcome.stats);
    let second = RunReport::new(&outcome.results, &outcome.stats);
    assert_eq!(first, second);
    assert_eq!(first.status, 0);
    assert!(aggregate::flaky_tests(&outcome.results).is_empty());
}

/// Stops on the result of `fast`, releasing the attempt of `slow` at the same moment
struct ReleaseOnStop {
    release: Mutex<Sender<()>>,
}

impl Policy for ReleaseOnStop {
    fn stop(&self, result: &TestResult) -> Result<bool, PolicyError> {
        if result.properties.test_name != "fast" {
            return Ok(false);
        }
        let _ = self.release.lock().unwrap().send(());
        Ok(true)
    }

    fn thread_count(&self) -> usize {
        2
    }
}

#[test]
fn in_flight_attempt_finishes_and_is_recorded_after_stop() {
    let (release, released): (Sender<()>, Receiver<()>) = mpsc::channel();
    let released = Mutex::new(released);

    let mut registry = Registry::new();
    registry
        .class("Drain")
        .test("slow", move |_| {
            match released
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(10))
            {
                Ok(()) => Ok(json!("released")),
                Err(e) => Err(StageError::unexpected(format!("never released: {e}"))),
            }
        })
        .test("fast", |_| Ok(Value::Null));
    for i in 0..10 {
        registry.register(Test::new("Drain", format!("queued{i}"), |_| Ok(Value::Null)));
    }

    let policy = ReleaseOnStop {
        release: Mutex::new(release),
    };
    let controller = RunController::new(Arc::new(policy));
    let outcome = controller.run(load(&registry)).unwrap();

    assert!(outcome.stopped);
    let names: Vec<&str> = outcome
        .results
        .iter()
        .map(|r| r.properties.test_name.as_str())
        .collect();
    assert_eq!(names, vec!["fast", "slow"]);
    assert_eq!(outcome.results[1].outcome(), Outcome::Passed);
    assert_ne!(outcome.results[0].thread_id, outcome.results[1].thread_id);
    assert_eq!(outcome.stats.executed, outcome.results.len());
    assert_eq!(outcome.stats.planned, 12);
}

#[test]
fn failing_stop_hook_is_fatal_with_many_threads() {
    struct StopServiceDown;

    impl Policy for StopServiceDown {
        fn stop(&self, _result: &TestResult) -> Result<bool, PolicyError> {
            Err(PolicyError::failed("stop service down"))
        }

        fn thread_count(&self) -> usize {
            4
        }
    }

    let registry = registry("Fatal", 40);
    let controller = RunController::new(Arc::new(StopServiceDown));

    let err = controller.run(load(&registry)).unwrap_err();
    assert!(matches!(err, RunError::Policy { hook: Hook::Stop, .. }));
    assert!(err.to_string().contains("stop service down"));
}

#[test]
fn fail_fast_still_retries_a_flaky_test() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let mut registry = Registry::new();
    registry.register(Test::new("Flaky", "first_call_breaks", move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(StageError::unexpected("cold cache"))
        } else {
            Ok(Value::Null)
        }
    }));
    registry.register(Test::new("Flaky", "steady", |_| Ok(Value::Null)));

    let policy = ConfiguredPolicy::from_config(&RunConfig {
        max_retries: 2,
        fail_fast: true,
        ..Default::default()
    });
    let controller = RunController::new(Arc::new(policy));
    let outcome = controller.run(load(&registry)).unwrap();

    assert!(!outcome.stopped);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.summary(), Summary::new(2, 1, 0));
    assert_eq!(
        aggregate::flaky_tests(&outcome.results),
        vec![TestProperties::new("Flaky", "first_call_breaks")]
    );
}
