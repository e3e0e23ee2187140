//! Shared work queue
//!
//! Hands tests to worker threads one at a time and accepts retried tests back.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::models::{Test, TestProperties};

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Test>,
    /// Attempts dequeued but not yet completed
    in_flight: usize,
    closed: bool,
    attempts: HashMap<TestProperties, u32>,
}

/// Work queue shared by all workers of one run
///
/// `dequeue` blocks while the queue is empty but attempts are still running, since a
/// running attempt may be requeued. It returns `None` once the queue is closed or
/// exhausted (empty with nothing in flight).
#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl WorkQueue {
    /// Build the queue in the given order
    pub fn new(tests: Vec<Test>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: tests.into(),
                ..Default::default()
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the next test, blocking until one is available or the queue is done
    pub fn dequeue(&self) -> Option<Test> {
        self.dequeue_attempt().map(|(test, _)| test)
    }

    /// Take the next test together with its attempt number (1-based)
    pub(crate) fn dequeue_attempt(&self) -> Option<(Test, u32)> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(test) = state.pending.pop_front() {
                state.in_flight += 1;
                let attempt = state
                    .attempts
                    .entry(test.properties().clone())
                    .or_insert(0);
                *attempt += 1;
                let attempt = *attempt;
                return Some((test, attempt));
            }
            if state.in_flight == 0 {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Append a test to the back of the queue, eligible for any idle worker
    pub fn requeue(&self, test: Test) {
        let mut state = self.lock();
        debug!("Requeued {}", test.properties());
        state.pending.push_back(test);
        drop(state);
        self.available.notify_one();
    }

    /// Mark one dequeued attempt as finished
    pub(crate) fn complete(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        let exhausted = state.in_flight == 0 && state.pending.is_empty();
        drop(state);
        if exhausted {
            self.available.notify_all();
        }
    }

    /// Stop servicing dequeues and wake every waiting worker
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Tests waiting to be dequeued
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Attempts dequeued so far for a test
    pub fn attempts(&self, properties: &TestProperties) -> u32 {
        self.lock().attempts.get(properties).copied().unwrap_or(0)
    }
}

/// Completes a dequeued attempt when dropped, even if the worker unwinds
pub(crate) struct InFlight<'a> {
    queue: &'a WorkQueue,
}

impl<'a> InFlight<'a> {
    pub(crate) fn new(queue: &'a WorkQueue) -> Self {
        Self { queue }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.queue.complete();
    }
}
