//! Run statistics

use serde::{Deserialize, Serialize};
use std::fmt;

/// Counters tracked across a run
///
/// Owned by the run controller; every counter only grows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Tests returned by the loader
    pub loaded: usize,
    /// Tests left after filtering, ready for scheduling
    pub prepared: usize,
    /// Size of the initial work queue, before any retries
    pub planned: usize,
    /// Finalized attempts, retries included
    pub executed: usize,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `loaded >= prepared >= planned`
    pub fn is_consistent(&self) -> bool {
        self.loaded >= self.prepared && self.prepared >= self.planned
    }

    /// Planned tests that never got an attempt (only non-zero after an early stop)
    pub fn skipped(&self) -> usize {
        self.planned.saturating_sub(self.executed)
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Loaded: {} | Prepared: {} | Planned: {} | Executed: {}",
            self.loaded, self.prepared, self.planned, self.executed
        )
    }
}
