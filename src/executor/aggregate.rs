//! Result aggregation
//!
//! Turns the finished results list into a summary, an exit status and a report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{Outcome, RunStats, Summary, TestProperties, TestResult};
use crate::output::ResultFormatter;

/// Aggregated view of a finished run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub stats: RunStats,
    pub summary: Summary,
    pub status: i32,
    /// Tests that broke at least once and passed on a retry
    #[serde(default)]
    pub flaky: Vec<TestProperties>,
}

impl RunReport {
    pub fn new(results: &[TestResult], stats: &RunStats) -> Self {
        let summary = Summary::from_results(results);
        Self {
            stats: *stats,
            summary,
            status: summary.exit_status(),
            flaky: flaky_tests(results),
        }
    }
}

/// Compute the summary, print the report and return the exit status
pub fn finalize(results: &[TestResult], stats: &RunStats, formatter: &ResultFormatter) -> i32 {
    let report = RunReport::new(results, stats);
    println!("{}", formatter.format_report(&report));
    report.status
}

/// Latest outcome per test, in first-seen order
///
/// Useful to tell flaky tests (broken, then passed on retry) from hard failures.
pub fn final_outcomes(results: &[TestResult]) -> Vec<(TestProperties, Outcome)> {
    let mut order = Vec::new();
    let mut latest: BTreeMap<&TestProperties, (u32, Outcome)> = BTreeMap::new();

    for result in results {
        let entry = latest.entry(&result.properties).or_insert_with(|| {
            order.push(&result.properties);
            (0, result.outcome())
        });
        if result.attempt >= entry.0 {
            *entry = (result.attempt, result.outcome());
        }
    }

    order
        .into_iter()
        .map(|props| (props.clone(), latest[props].1))
        .collect()
}

/// Tests that broke at least once but ended up passing
pub fn flaky_tests(results: &[TestResult]) -> Vec<TestProperties> {
    final_outcomes(results)
        .into_iter()
        .filter(|(props, outcome)| {
            outcome.is_success()
                && results
                    .iter()
                    .any(|r| &r.properties == props && r.outcome() == Outcome::Broken)
        })
        .map(|(props, _)| props)
        .collect()
}
