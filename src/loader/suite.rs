//! Suite file loader
//!
//! Discovers YAML/JSON suite files under the test path. Each file is one test class
//! whose stages are shell commands.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::Loader;
use crate::models::{ClassHooks, StageError, StageResult, Test, TestContext};

/// Exit code a test command uses to report an assertion failure
pub const ASSERTION_EXIT_CODE: i32 = 1;

/// One suite file: a test class
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuiteFile {
    /// Class name; defaults to the file stem
    #[serde(default)]
    pub class: Option<String>,

    /// Command run before every test
    #[serde(default)]
    pub before_each: Option<String>,

    /// Command run after every test, even when the test failed
    #[serde(default)]
    pub after_each: Option<String>,

    /// Extra environment for every command
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    pub tests: Vec<SuiteTest>,
}

/// One test of a suite file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuiteTest {
    pub name: String,
    /// Shell command; exit 0 passes, exit 1 is an assertion failure
    pub run: String,
}

impl SuiteFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read suite file: {}", path.display()))?;

        let suite: Self = if is_json_file(path) {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON suite: {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML suite: {}", path.display()))?
        };
        Ok(suite)
    }

    /// Build the tests of this suite; commands run from `dir`
    pub fn into_tests(self, default_class: &str, dir: &Path) -> Vec<Test> {
        let class = self.class.unwrap_or_else(|| default_class.to_string());
        let env = Arc::new(self.env);

        let mut hooks = ClassHooks::new();
        if let Some(command) = self.before_each {
            hooks = hooks.before_each(command_stage(command, dir, &env, false));
        }
        if let Some(command) = self.after_each {
            hooks = hooks.after_each(command_stage(command, dir, &env, false));
        }
        let hooks = Arc::new(hooks);

        self.tests
            .into_iter()
            .map(|test| {
                Test::new(class.clone(), test.name, command_stage(test.run, dir, &env, true))
                    .with_hooks(Arc::clone(&hooks))
            })
            .collect()
    }
}

/// Stage running `command` through `sh -c`
fn command_stage(
    command: String,
    dir: &Path,
    env: &Arc<BTreeMap<String, String>>,
    is_body: bool,
) -> impl Fn(&mut TestContext) -> StageResult + Send + Sync + 'static {
    let dir = dir.to_path_buf();
    let env = Arc::clone(env);

    move |ctx: &mut TestContext| -> StageResult {
        debug!("[{}] $ {}", ctx.thread_id, command);
        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(&dir)
            .envs(env.iter())
            .env("THREADTEST_THREAD", ctx.thread_id.to_string())
            .env("THREADTEST_CLASS", &ctx.properties.test_class_name)
            .env("THREADTEST_TEST", &ctx.properties.test_name)
            .env("THREADTEST_FIXTURE", ctx.fixture.to_string())
            .output()
            .map_err(|e| StageError::unexpected(format!("failed to spawn `{command}`: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        for line in stdout.lines() {
            ctx.log(line);
        }

        match output.status.code() {
            Some(0) => Ok(Value::String(stdout)),
            Some(ASSERTION_EXIT_CODE) if is_body => Err(StageError::assertion(if stderr.is_empty() {
                format!("`{command}` exited with status 1")
            } else {
                stderr
            })),
            Some(code) => Err(StageError::unexpected(format!(
                "`{command}` exited with status {code}: {stderr}"
            ))),
            None => Err(StageError::unexpected(format!(
                "`{command}` was terminated by a signal"
            ))),
        }
    }
}

/// Loads every suite file found recursively under the test path
#[derive(Clone, Copy, Debug, Default)]
pub struct SuiteLoader;

impl SuiteLoader {
    pub fn new() -> Self {
        Self
    }

    /// Suite files under `root`, sorted by path; symlinks are not followed
    pub fn discover(root: &Path) -> Result<Vec<PathBuf>> {
        if !root.exists() {
            bail!("Test path not found: {}", root.display());
        }
        if root.is_file() {
            return Ok(vec![root.to_path_buf()]);
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry
                .with_context(|| format!("Failed to walk test path: {}", root.display()))?;
            if entry.file_type().is_file() && is_suite_file(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        Ok(files)
    }
}

impl Loader for SuiteLoader {
    fn load(&self, path: &Path) -> Result<Vec<Test>> {
        let files = Self::discover(path)?;
        let mut tests = Vec::new();

        for file in &files {
            let suite = SuiteFile::load(file)?;
            let stem = file
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("suite");
            let dir = file.parent().unwrap_or_else(|| Path::new("."));
            tests.extend(suite.into_tests(stem, dir));
        }

        info!(
            "Loaded {} tests from {} suite files under {}",
            tests.len(),
            files.len(),
            path.display()
        );
        Ok(tests)
    }
}

fn is_json_file(path: &Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false)
}

fn is_suite_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml" || e == "json")
        .unwrap_or(false)
}
