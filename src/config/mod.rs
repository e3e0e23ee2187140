//! Configuration module
//!
//! Handles loading and layering run configuration: defaults, config file,
//! environment variables, then command-line flags.

mod env;
mod file;

pub use env::{print_env_help, EnvConfig};
pub use file::ConfigFile;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;
use crate::policy::DEFAULT_TEST_PATH;
use crate::utils::LogLevel;

/// Run configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Worker pool size
    pub thread_count: usize,

    /// Root directory handed to the loader
    pub test_path: PathBuf,

    /// Extra attempts granted to a broken test
    pub max_retries: u32,

    /// Stop dispatching after the first broken or failed result
    pub fail_fast: bool,

    /// Only run tests whose `Class::name` contains this pattern
    pub filter: Option<String>,

    /// Report format (table, json, json-pretty, summary)
    pub format: String,

    /// Directory where run records are saved
    pub output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            thread_count: 1,
            test_path: PathBuf::from(DEFAULT_TEST_PATH),
            max_retries: 0,
            fail_fast: false,
            filter: None,
            format: "table".to_string(),
            output: None,
            log_level: "info".to_string(),
        }
    }
}

impl RunConfig {
    /// Load configuration from a YAML or JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(ConfigFile::load(path)?.run)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            bail!("thread_count must be at least 1");
        }
        if OutputFormat::from_str(&self.format).is_none() {
            bail!(
                "Unsupported output format '{}'. Valid: table, json, json-pretty, summary",
                self.format
            );
        }
        if LogLevel::from_str(&self.log_level).is_none() {
            bail!("Unknown log level '{}'", self.log_level);
        }
        Ok(())
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_str(&self.log_level).unwrap_or(LogLevel::Info)
    }

    /// Resolve the effective configuration from an optional explicit file and the
    /// environment.
    ///
    /// The result is not validated, since command-line flags may still override it.
    /// Returns the path of the file that was read, if any.
    pub fn resolve(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        Self::resolve_with(explicit, &EnvConfig::load())
    }

    fn resolve_with(explicit: Option<&Path>, env: &EnvConfig) -> Result<(Self, Option<PathBuf>)> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| env.config_file.clone().map(PathBuf::from))
            .or_else(ConfigFile::find);

        let mut config = match &path {
            Some(path) => Self::load(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => Self::default(),
        };
        env.apply(&mut config);

        Ok((config, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.thread_count, 1);
        assert_eq!(config.test_path, PathBuf::from("test"));
        assert_eq!(config.max_retries, 0);
        assert!(!config.fail_fast);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero = RunConfig {
            thread_count: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let format = RunConfig {
            format: "xml".to_string(),
            ..Default::default()
        };
        assert!(format.validate().is_err());

        let level = RunConfig {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert!(level.validate().is_err());
    }

    #[test]
    fn test_resolve_leaves_validation_to_caller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threadtest.yaml");
        ConfigFile::example().save(&path).unwrap();

        let env = EnvConfig {
            thread_count: Some(0),
            format: Some("xml".to_string()),
            ..Default::default()
        };
        let (mut config, used) = RunConfig::resolve_with(Some(&path), &env).unwrap();
        assert_eq!(used, Some(path));
        assert_eq!(config.thread_count, 0);
        assert!(config.validate().is_err());

        config.thread_count = 4;
        config.format = "json".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: RunConfig = serde_yaml::from_str("thread_count: 4\nfail_fast: true\n").unwrap();
        assert_eq!(config.thread_count, 4);
        assert!(config.fail_fast);
        assert_eq!(config.format, "table");
    }
}
