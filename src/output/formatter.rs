//! Output formatters for test results
//!
//! Provides table, JSON, and summary renderings of attempts and run reports.

use serde::Serialize;
use std::fmt::Write;

use crate::executor::RunReport;
use crate::models::{Outcome, Test, TestResult};

const RULE: &str = "------------------------------------------";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn paint(&self, color: &str, text: String) -> String {
        if self.colorize {
            format!("{color}{text}{RESET}")
        } else {
            text
        }
    }

    fn outcome_color(outcome: Outcome) -> &'static str {
        match outcome {
            Outcome::Passed => GREEN,
            Outcome::Broken => YELLOW,
            Outcome::Failed => RED,
        }
    }

    fn to_json<T: Serialize>(&self, value: &T) -> String {
        let rendered = if self.format == OutputFormat::JsonPretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_default()
    }

    /// Format a single attempt
    pub fn format_result(&self, result: &TestResult) -> String {
        match self.format {
            OutputFormat::Table => self.format_result_table(result),
            OutputFormat::Json | OutputFormat::JsonPretty => self.to_json(result),
            OutputFormat::Summary => format!(
                "{} {} ({}ms)",
                result.outcome().symbol(),
                result.properties,
                result.duration_ms
            ),
        }
    }

    fn format_result_table(&self, result: &TestResult) -> String {
        let outcome = result.outcome();
        let status = self.paint(
            Self::outcome_color(outcome),
            format!("{} {:6}", outcome.symbol(), outcome.to_string()),
        );
        let mut line = format!(
            "{} {:40} [{:>6}ms] t{}",
            status,
            result.properties.to_string(),
            result.duration_ms,
            result.thread_id
        );
        if result.attempt > 1 {
            let _ = write!(line, " #{}", result.attempt);
        }
        if let Some(err) = result.deciding_error() {
            let _ = write!(line, " - {err}");
        }
        line
    }

    /// Format the final run report
    pub fn format_report(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Table => self.format_report_table(report),
            OutputFormat::Json | OutputFormat::JsonPretty => self.to_json(report),
            OutputFormat::Summary => format!(
                "{}/{} passed, {} broken, {} failed ({} executed of {} planned) - exit {}",
                report.summary.passed,
                report.summary.total(),
                report.summary.broken,
                report.summary.failed,
                report.stats.executed,
                report.stats.planned,
                report.status
            ),
        }
    }

    fn format_report_table(&self, report: &RunReport) -> String {
        let stats = &report.stats;
        let summary = &report.summary;
        let mut output = String::new();

        let _ = writeln!(output, "{RULE}");
        let _ = writeln!(output, "Loaded:    {} tests", stats.loaded);
        let _ = writeln!(output, "Prepared:  {} tests", stats.prepared);
        let _ = writeln!(output, "Planned:   {} tests", stats.planned);
        let _ = writeln!(output, "Executed:  {} tests", stats.executed);
        let _ = writeln!(
            output,
            "{}",
            self.paint(GREEN, format!("Passed:    {} tests", summary.passed))
        );
        let _ = writeln!(
            output,
            "{}",
            self.paint(YELLOW, format!("Broken:    {} tests", summary.broken))
        );
        let _ = writeln!(
            output,
            "{}",
            self.paint(RED, format!("Failed:    {} tests", summary.failed))
        );
        if !report.flaky.is_empty() {
            let names: Vec<String> = report.flaky.iter().map(ToString::to_string).collect();
            let _ = writeln!(
                output,
                "{}",
                self.paint(
                    YELLOW,
                    format!("Flaky:     {} tests ({})", names.len(), names.join(", "))
                )
            );
        }
        let _ = writeln!(output, "{RULE}");
        let _ = writeln!(output, "Exit code: {}", report.status);
        let _ = write!(output, "{RULE}");

        output
    }

    /// Format the tests a run would execute
    pub fn format_test_list(&self, tests: &[Test]) -> String {
        match self.format {
            OutputFormat::Json | OutputFormat::JsonPretty => {
                let props: Vec<_> = tests.iter().map(Test::properties).collect();
                self.to_json(&props)
            }
            _ => {
                let mut output = String::new();
                for (i, test) in tests.iter().enumerate() {
                    let _ = writeln!(output, "{:3}. {}", i + 1, test.properties());
                }
                let _ = write!(output, "{} tests", tests.len());
                output
            }
        }
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}
