//! Harness configuration.
//!
//! Every field can come from a command-line flag, an environment variable or
//! the built-in default, in that order of precedence.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CRUDCHECK_BASE_URL` | http://localhost:5000/api | Root of the service under test |
//! | `CRUDCHECK_TIMEOUT_SECS` | 30 | Per-request deadline (seconds) |
//! | `CRUDCHECK_LOG_LEVEL` | info | Log level |
//! | `CRUDCHECK_NOT_FOUND` | empty,null | Accepted not-found signals |

use std::time::Duration;

use clap::Args;

pub use crate::assertions::{NotFoundConvention, NotFoundSignal};

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Target service and run settings, threaded into the executor and gateway.
#[derive(Debug, Clone, Args)]
pub struct HarnessConfig {
    /// Base URL of the API under test.
    #[arg(long, global = true, env = "CRUDCHECK_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Request timeout in seconds.
    #[arg(
        long,
        global = true,
        env = "CRUDCHECK_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    pub timeout_secs: u64,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true, env = "CRUDCHECK_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// How the service signals a missing resource, e.g.
    /// `empty,null` or `null,status:500|400:not Found`.
    #[arg(long, global = true, env = "CRUDCHECK_NOT_FOUND", default_value = "empty,null")]
    pub not_found: NotFoundConvention,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            log_level: "info".to_string(),
            not_found: NotFoundConvention::default(),
        }
    }
}

impl HarnessConfig {
    /// Config pointing at a local stub with a short timeout.
    pub fn for_testing(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: 5,
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validates the configuration and returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let base = self.base_url.trim();
        if base.is_empty() {
            errors.push("Base URL cannot be empty".to_string());
        } else if !(base.starts_with("http://") || base.starts_with("https://")) {
            errors.push(format!("Base URL `{base}` must start with http:// or https://"));
        }

        if self.timeout_secs == 0 {
            errors.push("Timeout cannot be 0".to_string());
        }

        if !matches!(
            self.log_level.to_ascii_lowercase().as_str(),
            "error" | "warn" | "info" | "debug" | "trace"
        ) {
            errors.push(format!("Unknown log level `{}`", self.log_level));
        }

        if self.not_found.signals.is_empty() {
            errors.push("At least one not-found signal is required".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
