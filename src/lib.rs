//! threadtest - a multi-threaded test runner core
//!
//! Tests are loaded, filtered, scheduled and handed to a pool of worker threads.
//! Every attempt runs before-each, body and after-each, is classified as passed,
//! broken or failed, and is fed back through a [`policy::Policy`] that decides on
//! retries, early stop, per-thread fixtures, reporters and the exit status.
//!
//! ```no_run
//! use std::sync::Arc;
//! use threadtest::executor::RunController;
//! use threadtest::loader::Registry;
//! use threadtest::policy::DefaultPolicy;
//!
//! let mut registry = Registry::new();
//! registry
//!     .class("Math")
//!     .test("adds", |_| Ok(serde_json::json!(2 + 2)));
//!
//! let controller = RunController::new(Arc::new(DefaultPolicy::new().with_thread_count(4)));
//! let outcome = controller.run(registry.tests().to_vec())?;
//! let status = controller.finish(&outcome)?;
//! # Ok::<(), threadtest::executor::RunError>(())
//! ```

pub mod cli;
pub mod config;
pub mod executor;
pub mod loader;
pub mod models;
pub mod output;
pub mod policy;
pub mod reporter;
pub mod results;
pub mod utils;

pub use executor::{RunController, RunError, RunOutcome, WorkQueue};
pub use models::{Outcome, RunStats, StageError, Summary, Test, TestContext, TestResult};
pub use policy::{DefaultPolicy, Policy};
