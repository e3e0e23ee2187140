//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;
use std::path::PathBuf;

use super::RunConfig;

/// Environment variable prefix
const ENV_PREFIX: &str = "THREADTEST";

/// Overrides read from `THREADTEST_*` variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Worker pool size from THREADTEST_THREADS
    pub thread_count: Option<usize>,
    /// Test directory from THREADTEST_PATH
    pub test_path: Option<String>,
    /// Retry budget from THREADTEST_RETRIES
    pub max_retries: Option<u32>,
    /// Fail-fast from THREADTEST_FAIL_FAST
    pub fail_fast: Option<bool>,
    /// Name filter from THREADTEST_FILTER
    pub filter: Option<String>,
    /// Report format from THREADTEST_FORMAT
    pub format: Option<String>,
    /// Results directory from THREADTEST_OUTPUT
    pub output: Option<String>,
    /// Log level from THREADTEST_LOG
    pub log_level: Option<String>,
    /// Config file from THREADTEST_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            thread_count: get_env_parse("THREADS"),
            test_path: get_env("PATH"),
            max_retries: get_env_parse("RETRIES"),
            fail_fast: get_env_bool("FAIL_FAST"),
            filter: get_env("FILTER"),
            format: get_env("FORMAT"),
            output: get_env("OUTPUT"),
            log_level: get_env("LOG"),
            config_file: get_env("CONFIG"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.thread_count.is_some()
            || self.test_path.is_some()
            || self.max_retries.is_some()
            || self.fail_fast.is_some()
            || self.filter.is_some()
            || self.format.is_some()
            || self.output.is_some()
            || self.log_level.is_some()
            || self.config_file.is_some()
    }

    /// Overlay every variable that is set onto `config`
    pub fn apply(&self, config: &mut RunConfig) {
        if let Some(threads) = self.thread_count {
            config.thread_count = threads;
        }
        if let Some(path) = &self.test_path {
            config.test_path = PathBuf::from(path);
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(fail_fast) = self.fail_fast {
            config.fail_fast = fail_fast;
        }
        if let Some(filter) = &self.filter {
            config.filter = Some(filter.clone());
        }
        if let Some(format) = &self.format {
            config.format = format.clone();
        }
        if let Some(output) = &self.output {
            config.output = Some(PathBuf::from(output));
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Print all THREADTEST environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_THREADS     Number of worker threads");
    println!("  {ENV_PREFIX}_PATH        Directory containing test suites");
    println!("  {ENV_PREFIX}_RETRIES     Extra attempts for broken tests");
    println!("  {ENV_PREFIX}_FAIL_FAST   Stop after the first broken or failed test (true/false)");
    println!("  {ENV_PREFIX}_FILTER      Only run tests whose name contains this text");
    println!("  {ENV_PREFIX}_FORMAT      Report format (table, json, json-pretty, summary)");
    println!("  {ENV_PREFIX}_OUTPUT      Directory for saved run records");
    println!("  {ENV_PREFIX}_LOG         Log level (trace, debug, info, warn, error)");
    println!("  {ENV_PREFIX}_CONFIG      Path to configuration file");
}
