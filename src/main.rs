//! crudcheck command-line entry point.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use crudcheck::cli::{Cli, Command};
use crudcheck::config::HarnessConfig;
use crudcheck::scenario::OutputFormat;
use crudcheck::suite::SuiteRunner;
use crudcheck::{HarnessError, init_logging, storage};
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.config.log_level);

    if let Err(errors) = cli.config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {error}");
        }
        return ExitCode::from(2);
    }

    let result = match &cli.command {
        Command::Run {
            suite,
            scenario,
            format,
            report,
        } => run(&cli.config, suite, scenario.as_deref(), *format, report.as_deref()).await,
        Command::Check { suite } => check(suite),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, "crudcheck failed");
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

async fn run(
    config: &HarnessConfig,
    suite_path: &Path,
    only: Option<&str>,
    format: OutputFormat,
    report_path: Option<&Path>,
) -> Result<bool, HarnessError> {
    let mut suite = storage::load_suite(suite_path)?;
    if let Some(name) = only {
        suite = suite.only(name)?;
    }

    info!(suite = %suite.name, base_url = %config.base_url, "running suite");
    let mut runner = SuiteRunner::new(config)?;
    let report = runner.run(&suite).await;

    println!("{}", report.render(format)?);
    if let Some(path) = report_path {
        storage::save_report(path, &report)?;
        info!(path = %path.display(), "report written");
    }

    Ok(report.all_passed())
}

fn check(suite_path: &Path) -> Result<bool, HarnessError> {
    let suite = storage::load_suite(suite_path)?;
    let problems = suite.check();

    if problems.is_empty() {
        println!(
            "{}: {} scenarios OK",
            suite.name,
            suite.scenarios.len()
        );
        return Ok(true);
    }

    for problem in &problems {
        println!("✗ {problem}");
    }
    println!("{}: {} problems", suite.name, problems.len());
    Ok(false)
}
