//! Run controller
//!
//! Owns the run statistics, drives the worker pool over the shared queue and
//! enforces the global stop condition.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

use super::pipeline;
use super::queue::{InFlight, WorkQueue};
use crate::loader::Loader;
use crate::models::{panic_message, RunStats, Summary, Test, TestContext, TestResult};
use crate::policy::{Hook, Policy, PolicyError};
use crate::reporter::ReportEvent;
use crate::utils::Stopwatch;

/// Fatal run errors
#[derive(Debug, Error)]
pub enum RunError {
    #[error("policy hook `{hook}` failed: {source}")]
    Policy {
        hook: Hook,
        #[source]
        source: PolicyError,
    },

    #[error("failed to spawn worker thread {thread_id}: {source}")]
    Spawn {
        thread_id: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("worker thread {thread_id} panicked: {message}")]
    WorkerPanicked { thread_id: usize, message: String },

    #[error("failed to load tests from {}: {reason:#}", .path.display())]
    Load {
        path: PathBuf,
        reason: anyhow::Error,
    },

    #[error("thread count must be at least 1")]
    NoWorkers,
}

/// Lifecycle of a run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    /// Stop requested; in-flight attempts are finishing
    Draining,
    /// Queue exhausted
    Completed,
    Finished,
}

/// Everything a finished run produced
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// Results in completion order
    pub results: Vec<TestResult>,
    pub stats: RunStats,
    /// Whether the stop policy ended the run early
    pub stopped: bool,
}

impl RunOutcome {
    pub fn summary(&self) -> Summary {
        Summary::from_results(&self.results)
    }
}

#[derive(Default)]
struct Record {
    results: Vec<TestResult>,
    stats: RunStats,
}

/// State shared by the workers of one run
struct Shared {
    queue: WorkQueue,
    record: Mutex<Record>,
    stop: AtomicBool,
    fatal: Mutex<Option<RunError>>,
}

impl Shared {
    fn record(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keep the first fatal error and wind the run down
    fn abort(&self, err: RunError) {
        error!("{err}");
        let mut fatal = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
        if fatal.is_none() {
            *fatal = Some(err);
        }
        drop(fatal);
        self.stop.store(true, Ordering::SeqCst);
        self.queue.close();
    }
}

/// Call a policy hook, turning errors and panics into a fatal [`RunError`]
fn call_hook<T>(hook: Hook, f: impl FnOnce() -> Result<T, PolicyError>) -> Result<T, RunError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(RunError::Policy { hook, source }),
        Err(payload) => Err(RunError::Policy {
            hook,
            source: PolicyError::Panicked(panic_message(payload.as_ref())),
        }),
    }
}

/// Drives one run over a fixed pool of worker threads
pub struct RunController {
    policy: Arc<dyn Policy>,
    filter: Option<String>,
    state: Mutex<RunState>,
}

impl RunController {
    pub fn new(policy: Arc<dyn Policy>) -> Self {
        Self {
            policy,
            filter: None,
            state: Mutex::new(RunState::Idle),
        }
    }

    /// Only prepare tests whose qualified name contains `pattern`
    pub fn with_filter(mut self, pattern: impl Into<String>) -> Self {
        self.filter = Some(pattern.into());
        self
    }

    pub fn policy(&self) -> &Arc<dyn Policy> {
        &self.policy
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: RunState) {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("Run state {:?} -> {:?}", *current, state);
        *current = state;
    }

    /// Load tests from the policy's test path
    pub fn load(&self, loader: &dyn Loader) -> Result<Vec<Test>, RunError> {
        let path = self.policy.test_path();
        debug!("Loading tests from {}", path.display());
        loader.load(path).map_err(|reason| RunError::Load {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Load tests through `loader`, then run them
    pub fn run_from(&self, loader: &dyn Loader) -> Result<RunOutcome, RunError> {
        let tests = self.load(loader)?;
        self.run(tests)
    }

    /// Run the loaded tests to completion or until the stop policy fires
    pub fn run(&self, tests: Vec<Test>) -> Result<RunOutcome, RunError> {
        let thread_count = self.policy.thread_count();
        if thread_count == 0 {
            return Err(RunError::NoWorkers);
        }

        let mut stopwatch = Stopwatch::new();
        let mut stats = RunStats {
            loaded: tests.len(),
            ..Default::default()
        };

        let prepared: Vec<Test> = match &self.filter {
            Some(pattern) => tests
                .into_iter()
                .filter(|t| t.properties().matches(pattern))
                .collect(),
            None => tests,
        };
        stats.prepared = prepared.len();

        let scheduled = call_hook(Hook::Schedule, || self.policy.schedule(prepared))?;
        if scheduled.len() > stats.prepared {
            return Err(RunError::Policy {
                hook: Hook::Schedule,
                source: PolicyError::ScheduleGrew {
                    received: stats.prepared,
                    returned: scheduled.len(),
                },
            });
        }
        stats.planned = scheduled.len();
        stopwatch.lap("schedule");

        info!(
            "Running {} tests on {} threads ({} loaded, {} prepared)",
            stats.planned, thread_count, stats.loaded, stats.prepared
        );

        let shared = Shared {
            queue: WorkQueue::new(scheduled),
            record: Mutex::new(Record {
                results: Vec::with_capacity(stats.planned),
                stats,
            }),
            stop: AtomicBool::new(false),
            fatal: Mutex::new(None),
        };

        self.set_state(RunState::Running);
        self.spawn_workers(thread_count, &shared);
        stopwatch.lap("execute");
        debug!("Run timings:\n{}", stopwatch.format());

        let stopped = shared.stop.load(Ordering::SeqCst);
        if let Some(err) = shared
            .fatal
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            self.set_state(RunState::Finished);
            return Err(err);
        }
        if !stopped {
            self.set_state(RunState::Completed);
        }
        self.set_state(RunState::Finished);

        let record = shared
            .record
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        info!(
            "Run finished: {} executed of {} planned{}",
            record.stats.executed,
            record.stats.planned,
            if stopped { " (stopped early)" } else { "" }
        );

        Ok(RunOutcome {
            results: record.results,
            stats: record.stats,
            stopped,
        })
    }

    /// Hand the finished run to the exit policy and return the process status
    pub fn finish(&self, outcome: &RunOutcome) -> Result<i32, RunError> {
        call_hook(Hook::Exit, || {
            self.policy.exit(&outcome.results, &outcome.stats)
        })
    }

    fn spawn_workers(&self, thread_count: usize, shared: &Shared) {
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(thread_count);
            for thread_id in 0..thread_count {
                let spawned = thread::Builder::new()
                    .name(format!("threadtest-worker-{thread_id}"))
                    .spawn_scoped(scope, move || self.worker(thread_id, shared));
                match spawned {
                    Ok(handle) => handles.push((thread_id, handle)),
                    Err(source) => {
                        shared.abort(RunError::Spawn { thread_id, source });
                        break;
                    }
                }
            }

            for (thread_id, handle) in handles {
                if let Err(payload) = handle.join() {
                    shared.abort(RunError::WorkerPanicked {
                        thread_id,
                        message: panic_message(payload.as_ref()),
                    });
                }
            }
        });
    }

    fn worker(&self, thread_id: usize, shared: &Shared) {
        let span = info_span!("worker", thread_id);
        let _enter = span.enter();

        loop {
            if shared.stop.load(Ordering::SeqCst) {
                debug!("Stop requested, worker exiting");
                break;
            }
            let Some((test, attempt)) = shared.queue.dequeue_attempt() else {
                debug!("Queue drained, worker exiting");
                break;
            };
            let _lease = InFlight::new(&shared.queue);

            if let Err(err) = self.run_attempt(thread_id, &test, attempt, shared) {
                shared.abort(err);
                break;
            }
        }
    }

    fn run_attempt(
        &self,
        thread_id: usize,
        test: &Test,
        attempt: u32,
        shared: &Shared,
    ) -> Result<(), RunError> {
        let properties = test.properties();
        let fixture = call_hook(Hook::Provide, || self.policy.provide(thread_id, properties))?;
        let reporter = call_hook(Hook::Report, || Ok(self.policy.report(thread_id, properties)))?;

        call_hook(Hook::Report, || {
            reporter.event(properties, ReportEvent::Started { thread_id, attempt });
            Ok(())
        })?;
        let mut context =
            TestContext::new(thread_id, properties.clone(), fixture, Arc::clone(&reporter));
        let mut result = pipeline::run(test, &mut context);
        drop(context);
        result.attempt = attempt;

        let outcome = result.outcome();
        call_hook(Hook::Report, || {
            reporter.event(properties, ReportEvent::Finished(outcome));
            Ok(())
        })?;
        if !outcome.is_success() {
            warn!("{result}");
        } else {
            debug!("{result}");
        }

        call_hook(Hook::Analyze, || {
            self.policy.analyze(test, &result, &shared.queue)
        })?;

        {
            let mut record = shared.record();
            record.results.push(result.clone());
            record.stats.executed += 1;
        }

        if call_hook(Hook::Stop, || self.policy.stop(&result))? {
            self.request_stop(shared, &result);
        }
        Ok(())
    }

    fn request_stop(&self, shared: &Shared, result: &TestResult) {
        if !shared.stop.swap(true, Ordering::SeqCst) {
            info!("Stop policy triggered by {}, draining", result.properties);
            self.set_state(RunState::Draining);
        }
        shared.queue.close();
    }
}
