//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::RunConfig;

/// Multi-threaded test runner
#[derive(Parser, Debug)]
#[command(name = "threadtest")]
#[command(version)]
#[command(about = "Run test suites on a pool of worker threads with retry and stop policies")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run tests
    Run(RunArgs),

    /// List the tests a run would execute
    List(ListArgs),

    /// View stored run results
    Results(ResultsArgs),

    /// Show or create configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Directory containing test suites
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Extra attempts for broken tests
    #[arg(short, long)]
    pub retries: Option<u32>,

    /// Stop after the first broken or failed test
    #[arg(long)]
    pub fail_fast: bool,

    /// Only run tests whose Class::name contains this text
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Report format (table, json, json-pretty, summary)
    #[arg(long)]
    pub format: Option<String>,

    /// Save the run record
    #[arg(short, long)]
    pub save: bool,

    /// Directory for saved run records
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    /// Overlay the flags that were given onto `config`
    pub fn apply(&self, config: &mut RunConfig) {
        if let Some(path) = &self.path {
            config.test_path = path.clone();
        }
        if let Some(threads) = self.threads {
            config.thread_count = threads;
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        if self.fail_fast {
            config.fail_fast = true;
        }
        if let Some(filter) = &self.filter {
            config.filter = Some(filter.clone());
        }
        if let Some(format) = &self.format {
            config.format = format.clone();
        }
        if let Some(output) = &self.output {
            config.output = Some(output.clone());
        }
    }
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Directory containing test suites
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Only list tests whose Class::name contains this text
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for results command
#[derive(Parser, Debug)]
pub struct ResultsArgs {
    #[command(subcommand)]
    pub action: ResultsAction,

    /// Results directory (defaults to the platform data directory)
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ResultsAction {
    /// List stored runs
    List,

    /// Show a stored run (latest if no id is given)
    Show {
        /// Run ID
        id: Option<String>,
    },

    /// Delete a stored run
    Delete {
        /// Run ID
        id: String,
    },

    /// Export a stored run
    Export {
        /// Run ID
        id: String,

        /// Destination file; format follows the extension (json, csv)
        path: PathBuf,
    },
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write an example configuration file
    Init {
        /// Destination file
        #[arg(default_value = "threadtest.yaml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Describe the supported environment variables
    Env,
}
