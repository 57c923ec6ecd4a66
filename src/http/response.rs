use std::collections::BTreeMap;

use serde_json::Value;

/// Best-effort interpretation of a response body.
///
/// An empty body and the literal `null` stay distinct: some services signal
/// "not found" with one, some with the other.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    Text(String),
}

impl Body {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Body::Empty;
        }
        match serde_json::from_str(trimmed) {
            Ok(value) => Body::Json(value),
            Err(_) => Body::Text(raw.to_string()),
        }
    }
}

/// Normalized response handed to assertions and extraction rules.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: BTreeMap<String, String>,
    pub raw_body: String,
    pub body: Body,
    pub duration_ms: u64,
}

impl HttpResponse {
    pub fn new(
        status: u16,
        headers: BTreeMap<String, String>,
        raw_body: String,
        duration_ms: u64,
    ) -> Self {
        let body = Body::parse(&raw_body);
        Self {
            status,
            headers,
            raw_body,
            body,
            duration_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parsed JSON document, if the body was valid JSON.
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_empty_body(&self) -> bool {
        matches!(self.body, Body::Empty)
    }

    /// True when the raw body is exactly the token `null`.
    pub fn is_null_literal(&self) -> bool {
        self.raw_body.trim() == "null"
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}
