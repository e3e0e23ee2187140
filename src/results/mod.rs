//! Results storage module
//!
//! Provides persistent storage and export of finished runs.

mod storage;

pub use storage::{ExportFormat, ResultsStorage, RunInfo, StoredRun, StoredTestResult};
