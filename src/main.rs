//! threadtest - run test suites on a pool of worker threads
//!
//! ## Usage
//!
//! ```bash
//! # Run every suite under ./test on 4 threads
//! threadtest run -j 4
//!
//! # Retry broken tests twice and stop on the first failure
//! threadtest run --path suites --retries 2 --fail-fast
//!
//! # List what would run
//! threadtest list --filter Checkout
//!
//! # Inspect saved runs
//! threadtest results list
//! ```

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use threadtest::cli::{self, Args, Command};
use threadtest::config::{print_env_help, ConfigFile, EnvConfig, RunConfig};
use threadtest::executor::RunController;
use threadtest::loader::SuiteLoader;
use threadtest::output::{OutputFormat, ResultFormatter};
use threadtest::policy::ConfiguredPolicy;
use threadtest::results::{ExportFormat, ResultsStorage, StoredRun};
use threadtest::utils::{init_logger, LogLevel};

/// Exit status when the run could not complete
const FATAL_EXIT_CODE: i32 = 2;

fn main() {
    let args = Args::parse();

    match dispatch(args) {
        Ok(status) => std::process::exit(status),
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            std::process::exit(FATAL_EXIT_CODE);
        }
    }
}

fn dispatch(args: Args) -> Result<i32> {
    let (mut config, config_path) = RunConfig::resolve(args.config.as_deref())?;

    if let Command::Run(run_args) = &args.command {
        run_args.apply(&mut config);
        config.validate()?;
    }

    let level = if args.verbose {
        LogLevel::Debug
    } else {
        config.log_level()
    };
    init_logger(level);

    if let Some(path) = &config_path {
        info!("Using configuration from {}", path.display());
    }

    match args.command {
        Command::Run(run_args) => run_tests(&config, run_args.save || config.output.is_some()),
        Command::List(list_args) => {
            list_tests(config, list_args)?;
            Ok(0)
        }
        Command::Results(results_args) => {
            show_results(results_args)?;
            Ok(0)
        }
        Command::Config(config_args) => {
            manage_config(&config, config_args)?;
            Ok(0)
        }
    }
}

fn run_tests(config: &RunConfig, save: bool) -> Result<i32> {
    let mut controller = RunController::new(Arc::new(ConfiguredPolicy::from_config(config)));
    if let Some(filter) = &config.filter {
        controller = controller.with_filter(filter.clone());
    }

    let tests = controller.load(&SuiteLoader::new())?;
    info!(
        "Running {} tests from {} on {} threads",
        tests.len(),
        config.test_path.display(),
        config.thread_count
    );

    let started_at = Utc::now();
    let outcome = controller.run(tests)?;

    if save {
        let storage = ResultsStorage::from_output(config.output.as_deref());
        let run = StoredRun::new(config, started_at, &outcome);
        let path = storage.save(&run)?;
        println!("Saved run {} to {}", run.id, path.display());
    }

    Ok(controller.finish(&outcome)?)
}

fn list_tests(mut config: RunConfig, args: cli::ListArgs) -> Result<()> {
    if let Some(path) = args.path {
        config.test_path = path;
    }

    let controller = RunController::new(Arc::new(ConfiguredPolicy::from_config(&config)));
    let tests = controller.load(&SuiteLoader::new())?;
    let filter = args.filter.or(config.filter);
    let tests: Vec<_> = tests
        .into_iter()
        .filter(|test| {
            filter
                .as_deref()
                .map(|pattern| test.properties().matches(pattern))
                .unwrap_or(true)
        })
        .collect();

    let format = if args.json {
        OutputFormat::JsonPretty
    } else {
        OutputFormat::Table
    };
    println!("{}", ResultFormatter::new(format).format_test_list(&tests));
    Ok(())
}

fn show_results(args: cli::ResultsArgs) -> Result<()> {
    let storage = ResultsStorage::from_output(args.dir.as_deref());

    match args.action {
        cli::ResultsAction::List => {
            let runs = storage.list_runs()?;
            if runs.is_empty() {
                println!("No stored runs in {}", storage.base_dir().display());
                println!("Save a run with: threadtest run --save");
                return Ok(());
            }

            println!(
                "{:22} {:20} {:>6} {:>6} {:>6} {:>6}",
                "Run", "Started", "Pass", "Broken", "Fail", "Exit"
            );
            println!("{}", "-".repeat(72));
            for run in runs {
                println!(
                    "{:22} {:20} {:>6} {:>6} {:>6} {:>6}",
                    run.id,
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    run.summary.passed,
                    run.summary.broken,
                    run.summary.failed,
                    run.status
                );
            }
        }
        cli::ResultsAction::Show { id } => {
            let run = match id {
                Some(id) => storage.load(&id)?,
                None => match storage.latest()? {
                    Some(run) => run,
                    None => bail!("No stored runs in {}", storage.base_dir().display()),
                },
            };
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        cli::ResultsAction::Delete { id } => {
            storage.load(&id)?;
            storage.delete(&id)?;
            println!("Deleted run {id}");
        }
        cli::ResultsAction::Export { id, path } => {
            let format = ExportFormat::from_extension(&path).with_context(|| {
                format!("Cannot infer export format from {}", path.display())
            })?;
            let run = storage.load(&id)?;
            storage.export(&run, &path, format)?;
            println!("Exported run {} to {}", run.id, path.display());
        }
    }

    Ok(())
}

fn manage_config(config: &RunConfig, args: cli::ConfigArgs) -> Result<()> {
    match args.action {
        cli::ConfigAction::Show => {
            println!("{}", serde_yaml::to_string(config)?);
        }
        cli::ConfigAction::Init { path, force } => {
            write_example_config(&path, force)?;
            println!("Wrote example configuration to {}", path.display());
        }
        cli::ConfigAction::Env => {
            print_env_help();
            if EnvConfig::load().has_any() {
                println!(
                    "THREADTEST_* overrides are active; `threadtest config show` prints the result."
                );
            } else {
                println!("No THREADTEST_* variables are set.");
            }
        }
    }
    Ok(())
}

fn write_example_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    ConfigFile::example().save(path)
}
