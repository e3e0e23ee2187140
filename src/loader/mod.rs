//! Test loaders
//!
//! A [`Loader`] turns a test path into the list of tests a run starts from.

mod registry;
mod suite;

pub use registry::{ClassBuilder, Registry};
pub use suite::{SuiteFile, SuiteLoader, SuiteTest};

use anyhow::Result;
use std::path::Path;

use crate::models::Test;

/// Source of tests for a run
pub trait Loader {
    fn load(&self, path: &Path) -> Result<Vec<Test>>;
}
