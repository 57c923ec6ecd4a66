//! Error types for the harness.
//!
//! Failures are split by who has to fix them: [`HarnessError::Auth`] and
//! [`HarnessError::Transport`] point at the service under test or its
//! environment, while [`HarnessError::Definition`] and
//! [`HarnessError::Template`] point at the scenario author. Assertion failures
//! are not errors at all; they are recorded as step outcomes by the runner.

use std::path::PathBuf;

use thiserror::Error;

/// Placeholder resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// No shared-state key, builtin or token matches the placeholder.
    #[error("unresolved placeholder `{{{{{0}}}}}`")]
    Unresolved(String),

    /// A `{{` without a matching `}}`.
    #[error("unterminated placeholder in `{0}`")]
    Unterminated(String),

    /// `{{}}` with nothing inside.
    #[error("empty placeholder in `{0}`")]
    Empty(String),

    /// A `$`-prefixed name the harness does not provide.
    #[error("unknown builtin `{0}`")]
    UnknownBuiltin(String),
}

/// The primary error type for harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The identity provider rejected the credential or could not be reached.
    #[error("authentication failed for `{identity}` ({}): {body}", display_status(.status))]
    Auth {
        identity: String,
        /// `None` when no response was received at all.
        status: Option<u16>,
        body: String,
    },

    /// Network error or timeout while issuing a request.
    #[error("{method} {url} failed: {message}")]
    Transport {
        method: String,
        url: String,
        message: String,
    },

    /// The scenario itself is wrong: bad template, forward dependency,
    /// unknown identity and the like.
    #[error("scenario definition error: {0}")]
    Definition(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Invalid harness configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to access `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse `{}`: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn display_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "no response".to_string(),
    }
}
