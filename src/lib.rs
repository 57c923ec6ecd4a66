//! # crudcheck
//!
//! Lifecycle test harness for CRUD-style REST APIs. Scenarios are ordered
//! request steps: each step's response is checked with structural assertions
//! and may hand extracted values (ids, codes, tokens) to the steps after it.
//!
//! ```no_run
//! use crudcheck::assertions::Predicate;
//! use crudcheck::auth::Credential;
//! use crudcheck::config::HarnessConfig;
//! use crudcheck::scenario::{Scenario, ScenarioRunner, Step};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), crudcheck::HarnessError> {
//! let mut runner = ScenarioRunner::new(&HarnessConfig::default())?;
//! runner.register("user", Credential::user("john.doe@example.com", "password123"));
//!
//! let scenario = Scenario::new("category lifecycle")
//!     .step(
//!         Step::post("create", "category")
//!             .as_identity("user")
//!             .body(json!({"title": "Fictional Literature"}))
//!             .extract("_id", "categoryId")
//!             .assert(Predicate::not_empty("_id")),
//!     )
//!     .step(Step::get("fetch", "category/{{categoryId}}"));
//!
//! let report = runner.run(&scenario).await;
//! assert!(report.passed());
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod scenario;
pub mod storage;
pub mod suite;
pub mod template;

pub use config::HarnessConfig;
pub use error::{HarnessError, TemplateError};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` applies to this crate only.
/// Calling it twice is harmless.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("crudcheck={level}")));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
