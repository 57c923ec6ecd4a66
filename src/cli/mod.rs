//! Command-line interface for running suites in CI pipelines.
//!
//! - `crudcheck run suite.json` executes a suite and exits non-zero when any
//!   scenario aborted
//! - `crudcheck check suite.json` validates scenario definitions without
//!   sending a request

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::HarnessConfig;
use crate::scenario::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "crudcheck")]
#[command(version, about = "Lifecycle test harness for CRUD REST APIs")]
pub struct Cli {
    #[command(flatten)]
    pub config: HarnessConfig,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a suite against the target service
    Run {
        /// Suite file (JSON)
        suite: PathBuf,

        /// Run only the scenario with this name
        #[arg(long)]
        scenario: Option<String>,

        /// Output format printed to stdout
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Also write the JSON report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Validate a suite without contacting the service
    Check {
        /// Suite file (JSON)
        suite: PathBuf,
    },
}
