//! Results storage and retrieval
//!
//! Persists finished runs as JSON and exports them to JSON or CSV.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::executor::{RunOutcome, RunReport};
use crate::models::{Outcome, RunStats, Summary, TestResult};

/// Stored run with every attempt
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredRun {
    /// Unique run ID
    pub id: String,

    /// Timestamp when the run started
    pub started_at: DateTime<Utc>,

    /// Timestamp when the run finished
    pub completed_at: DateTime<Utc>,

    /// Directory the tests were loaded from
    pub test_path: PathBuf,

    /// Worker pool size
    pub thread_count: usize,

    /// Whether the stop policy ended the run early
    pub stopped: bool,

    pub stats: RunStats,
    pub summary: Summary,

    /// Exit status computed for the run
    pub status: i32,

    /// Attempts in completion order
    pub results: Vec<StoredTestResult>,

    pub environment: EnvironmentInfo,
}

/// Stored attempt
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredTestResult {
    pub class: String,
    pub name: String,
    pub outcome: Outcome,
    pub attempt: u32,
    pub thread_id: usize,
    pub duration_ms: u64,
    /// Error that decided the outcome, if any
    pub error: Option<String>,
}

impl StoredTestResult {
    pub fn from_test_result(result: &TestResult) -> Self {
        Self {
            class: result.properties.test_class_name.clone(),
            name: result.properties.test_name.clone(),
            outcome: result.outcome(),
            attempt: result.attempt,
            thread_id: result.thread_id,
            duration_ms: result.duration_ms,
            error: result.deciding_error().map(|e| e.to_string()),
        }
    }
}

/// Environment information
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    /// Operating system
    pub os: String,

    /// Architecture
    pub arch: String,

    /// Tool version
    pub tool_version: String,
}

impl Default for EnvironmentInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl StoredRun {
    /// Build the record of a finished run
    pub fn new(config: &RunConfig, started_at: DateTime<Utc>, outcome: &RunOutcome) -> Self {
        let report = RunReport::new(&outcome.results, &outcome.stats);
        Self {
            id: generate_run_id(),
            started_at,
            completed_at: Utc::now(),
            test_path: config.test_path.clone(),
            thread_count: config.thread_count,
            stopped: outcome.stopped,
            stats: report.stats,
            summary: report.summary,
            status: report.status,
            results: outcome
                .results
                .iter()
                .map(StoredTestResult::from_test_result)
                .collect(),
            environment: EnvironmentInfo::default(),
        }
    }
}

/// Generate unique run ID
fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let random: u32 = rand::random::<u32>() % 10000;
    format!("{timestamp}_{random:04}")
}

/// Results storage manager
pub struct ResultsStorage {
    /// Base directory for results
    base_dir: PathBuf,
}

impl ResultsStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Storage under the platform data directory
    pub fn default_dir() -> Self {
        let base_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("threadtest")
            .join("runs");
        Self::new(base_dir)
    }

    /// Storage at `output` if given, else the default directory
    pub fn from_output(output: Option<&Path>) -> Self {
        match output {
            Some(dir) => Self::new(dir),
            None => Self::default_dir(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn run_path(&self, run_id: &str) -> PathBuf {
        self.base_dir.join(format!("{run_id}.json"))
    }

    /// Save a run
    pub fn save(&self, run: &StoredRun) -> Result<PathBuf> {
        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!("Failed to create results directory: {}", self.base_dir.display())
        })?;

        let path = self.run_path(&run.id);
        let file = File::create(&path).context("Failed to create results file")?;
        let writer = BufWriter::new(file);

        serde_json::to_writer_pretty(writer, run).context("Failed to write results")?;

        info!("Saved run results to {}", path.display());
        Ok(path)
    }

    /// Load a run by ID
    pub fn load(&self, run_id: &str) -> Result<StoredRun> {
        let path = self.run_path(run_id);
        if !path.exists() {
            bail!("No stored run with id {run_id} in {}", self.base_dir.display());
        }
        let run = self.load_from_path(&path)?;
        debug!("Loaded run results from {}", path.display());
        Ok(run)
    }

    /// Load from a specific path
    pub fn load_from_path(&self, path: &Path) -> Result<StoredRun> {
        let file = File::open(path).context("Failed to open results file")?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).context("Failed to parse results")
    }

    /// All stored runs, newest first; unreadable files are skipped
    pub fn load_all(&self) -> Result<Vec<StoredRun>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match self.load_from_path(&path) {
                    Ok(run) => runs.push(run),
                    Err(e) => debug!("Failed to load {}: {}", path.display(), e),
                }
            }
        }

        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    /// Brief info for every stored run, newest first
    pub fn list_runs(&self) -> Result<Vec<RunInfo>> {
        Ok(self
            .load_all()?
            .into_iter()
            .map(|run| RunInfo {
                id: run.id,
                started_at: run.started_at,
                summary: run.summary,
                status: run.status,
            })
            .collect())
    }

    /// Most recent run
    pub fn latest(&self) -> Result<Option<StoredRun>> {
        Ok(self.load_all()?.into_iter().next())
    }

    /// Delete a run
    pub fn delete(&self, run_id: &str) -> Result<()> {
        let path = self.run_path(run_id);
        if path.exists() {
            fs::remove_file(&path)?;
            info!("Deleted results: {}", path.display());
        }
        Ok(())
    }

    /// Export a run to a file
    pub fn export(&self, run: &StoredRun, path: &Path, format: ExportFormat) -> Result<()> {
        match format {
            ExportFormat::Json => {
                let file = File::create(path)?;
                let writer = BufWriter::new(file);
                serde_json::to_writer_pretty(writer, run)?;
            }
            ExportFormat::Csv => {
                let mut writer = csv::Writer::from_path(path)?;

                writer.write_record([
                    "class",
                    "name",
                    "outcome",
                    "attempt",
                    "thread_id",
                    "duration_ms",
                    "error",
                ])?;

                for result in &run.results {
                    writer.write_record([
                        result.class.clone(),
                        result.name.clone(),
                        result.outcome.to_string(),
                        result.attempt.to_string(),
                        result.thread_id.to_string(),
                        result.duration_ms.to_string(),
                        result.error.clone().unwrap_or_default(),
                    ])?;
                }
                writer.flush()?;
            }
        }

        info!("Exported results to {}", path.display());
        Ok(())
    }
}

/// Brief run information
#[derive(Clone, Debug)]
pub struct RunInfo {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub summary: Summary,
    pub status: i32,
}

/// Export format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_str)
    }
}
