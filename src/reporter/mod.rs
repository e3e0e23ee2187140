//! Per-test narration sinks
//!
//! The engine hands every attempt a [`Reporter`] chosen by the policy's `report` hook.

use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::models::{Outcome, TestProperties};

/// Narration event emitted during an attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportEvent {
    Started { thread_id: usize, attempt: u32 },
    Step(String),
    Log(String),
    Finished(Outcome),
}

/// Sink for narration events; its format is opaque to the engine
pub trait Reporter: Send + Sync {
    fn event(&self, properties: &TestProperties, event: ReportEvent);
}

/// Reporter that narrates through `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn event(&self, properties: &TestProperties, event: ReportEvent) {
        match event {
            ReportEvent::Started { thread_id, attempt } => {
                debug!("[{thread_id}] {properties} started (attempt {attempt})")
            }
            ReportEvent::Step(step) => info!("{properties}: {step}"),
            ReportEvent::Log(line) => debug!("{properties}: {line}"),
            ReportEvent::Finished(outcome) if outcome.is_success() => {
                info!("{} {properties}", outcome.symbol())
            }
            ReportEvent::Finished(outcome) => warn!("{} {properties} {outcome}", outcome.symbol()),
        }
    }
}

/// Reporter that discards everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn event(&self, _properties: &TestProperties, _event: ReportEvent) {}
}

/// Reporter that keeps every event in memory
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<(TestProperties, ReportEvent)>>,
}

impl MemoryReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(TestProperties, ReportEvent)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events recorded for one test, in arrival order
    pub fn events_for(&self, properties: &TestProperties) -> Vec<ReportEvent> {
        self.events()
            .into_iter()
            .filter(|(p, _)| p == properties)
            .map(|(_, e)| e)
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn event(&self, properties: &TestProperties, event: ReportEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push((properties.clone(), event));
        }
    }
}
