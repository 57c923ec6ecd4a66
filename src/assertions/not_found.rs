//! How a service says "this resource does not exist".
//!
//! Observed services disagree: after a delete some answer `200` with an empty
//! body, some answer `200` with the literal `null`, and for malformed
//! identifiers some answer a 4xx/5xx with a message. The accepted signals are
//! configured per target instead of guessing one canonical behavior.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::http::HttpResponse;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum NotFoundSignal {
    /// 2xx with an empty (or whitespace-only) body.
    EmptyBody,
    /// 2xx with a body of exactly `null`.
    NullLiteral,
    /// One of `codes`, optionally with `message` somewhere in the body.
    ErrorStatus {
        codes: Vec<u16>,
        #[serde(default)]
        message: Option<String>,
    },
}

impl NotFoundSignal {
    pub fn matches(&self, response: &HttpResponse) -> bool {
        match self {
            NotFoundSignal::EmptyBody => response.is_success() && response.is_empty_body(),
            NotFoundSignal::NullLiteral => response.is_success() && response.is_null_literal(),
            NotFoundSignal::ErrorStatus { codes, message } => {
                codes.contains(&response.status)
                    && message
                        .as_deref()
                        .is_none_or(|needle| response.raw_body.contains(needle))
            }
        }
    }
}

impl Display for NotFoundSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundSignal::EmptyBody => write!(f, "empty body"),
            NotFoundSignal::NullLiteral => write!(f, "literal null"),
            NotFoundSignal::ErrorStatus { codes, message } => {
                let codes: Vec<String> = codes.iter().map(u16::to_string).collect();
                write!(f, "status {}", codes.join("|"))?;
                if let Some(message) = message {
                    write!(f, " with \"{message}\"")?;
                }
                Ok(())
            }
        }
    }
}

/// The set of signals a target service may use; any one of them counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotFoundConvention {
    pub signals: Vec<NotFoundSignal>,
}

impl Default for NotFoundConvention {
    fn default() -> Self {
        Self {
            signals: vec![NotFoundSignal::EmptyBody, NotFoundSignal::NullLiteral],
        }
    }
}

impl NotFoundConvention {
    pub fn new(signals: Vec<NotFoundSignal>) -> Self {
        Self { signals }
    }

    /// The first accepted signal the response exhibits.
    pub fn matched(&self, response: &HttpResponse) -> Option<&NotFoundSignal> {
        self.signals.iter().find(|signal| signal.matches(response))
    }

    pub fn describe(&self) -> String {
        let parts: Vec<String> = self.signals.iter().map(ToString::to_string).collect();
        parts.join(" or ")
    }
}

/// Parses a comma-separated list such as `empty,null,status:500|400:not Found`.
///
/// A status message runs up to the next item that is itself a signal, so it
/// may contain commas: `status:500:not valid, or not Found,null`.
impl FromStr for NotFoundConvention {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut items: Vec<String> = Vec::new();
        for raw in input.split(',') {
            match items.last_mut() {
                Some(last) if has_message(last) && !starts_signal(raw) => {
                    last.push(',');
                    last.push_str(raw);
                }
                _ => items.push(raw.to_string()),
            }
        }

        let mut signals = Vec::new();
        for raw in &items {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }

            let signal = match raw {
                "empty" => NotFoundSignal::EmptyBody,
                "null" => NotFoundSignal::NullLiteral,
                other => parse_status_signal(other)?,
            };
            signals.push(signal);
        }

        if signals.is_empty() {
            return Err("at least one not-found signal is required".to_string());
        }
        Ok(Self { signals })
    }
}

fn starts_signal(raw: &str) -> bool {
    let raw = raw.trim();
    matches!(raw, "empty" | "null") || raw.starts_with("status:")
}

fn has_message(item: &str) -> bool {
    item.trim()
        .strip_prefix("status:")
        .is_some_and(|spec| spec.contains(':'))
}

fn parse_status_signal(raw: &str) -> Result<NotFoundSignal, String> {
    let spec = raw.strip_prefix("status:").ok_or_else(|| {
        format!("Unknown not-found signal `{raw}` (expected empty, null or status:<codes>)")
    })?;

    let (codes, message) = match spec.split_once(':') {
        Some((codes, message)) => (codes, Some(message.trim().to_string())),
        None => (spec, None),
    };

    let codes = codes
        .split('|')
        .map(|code| {
            code.trim()
                .parse::<u16>()
                .map_err(|e| format!("Invalid status code `{code}` in `{raw}`: {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NotFoundSignal::ErrorStatus {
        codes,
        message: message.filter(|m| !m.is_empty()),
    })
}
