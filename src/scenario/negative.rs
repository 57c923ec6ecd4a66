//! Steps that are expected to be rejected.
//!
//! A negative step passes when the service answers with the expected failure
//! class and the body carries the expected error shape. Anything else,
//! including a success status, is an expected-failure mismatch.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assertions::{Predicate, StatusExpectation};

/// A structured error code at a JSON path, e.g. `{"path": "code", "value": "INVALID_ID"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCode {
    pub path: String,
    pub value: Value,
}

/// The failure a negative step expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedFailure {
    /// Accepted status class. Must not admit any 2xx.
    #[serde(default = "client_error")]
    pub status: StatusExpectation,
    /// The body must contain at least one of these substrings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_contains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

fn client_error() -> StatusExpectation {
    StatusExpectation::ClientError
}

impl ExpectedFailure {
    pub fn new(status: StatusExpectation) -> Self {
        Self {
            status,
            message_contains: Vec::new(),
            error_code: None,
        }
    }

    /// Adds an accepted message substring.
    pub fn message(mut self, text: impl Into<String>) -> Self {
        self.message_contains.push(text.into());
        self
    }

    pub fn code(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.error_code = Some(ErrorCode {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    /// The checks a response must pass to count as the expected failure.
    pub fn checks(&self) -> Vec<Predicate> {
        let mut checks = vec![Predicate::status(self.status.clone())];
        if !self.message_contains.is_empty() {
            checks.push(Predicate::BodyContains {
                any_of: self.message_contains.clone(),
            });
        }
        if let Some(code) = &self.error_code {
            checks.push(Predicate::equals(code.path.clone(), code.value.clone()));
        }
        checks
    }

    pub fn describe(&self) -> String {
        let mut text = format!("status {}", self.status.describe());
        if !self.message_contains.is_empty() {
            let quoted: Vec<String> = self
                .message_contains
                .iter()
                .map(|m| format!("\"{m}\""))
                .collect();
            text.push_str(&format!(" with {}", quoted.join(" or ")));
        }
        if let Some(code) = &self.error_code {
            text.push_str(&format!(" and `{}` == {}", code.path, code.value));
        }
        text
    }

    /// Definition problems, e.g. a status class that admits success.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.status.permits_success() {
            problems.push(format!(
                "expected failure status {} admits a success status",
                self.status.describe()
            ));
        }
        if self.message_contains.iter().any(|m| m.is_empty()) {
            problems.push("expected failure message is empty".to_string());
        }
        problems
    }
}

impl Default for ExpectedFailure {
    fn default() -> Self {
        Self::new(client_error())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::assertions::{AssertionEngine, NotFoundConvention};
    use crate::http::HttpResponse;

    fn passes(expected: &ExpectedFailure, status: u16, body: &str) -> bool {
        let response = HttpResponse::new(status, BTreeMap::new(), body.to_string(), 0);
        let convention = NotFoundConvention::default();
        AssertionEngine::new(&convention)
            .evaluate_all(&expected.checks(), &response)
            .iter()
            .all(|r| r.passed)
    }

    fn invalid_id() -> ExpectedFailure {
        ExpectedFailure::new(StatusExpectation::AnyOf(vec![500, 400]))
            .message("This id is not valid or not Found")
            .message("Invalid ID")
    }

    #[test]
    fn accepts_any_listed_message() {
        let expected = invalid_id();
        assert!(passes(&expected, 500, r#"{"message":"This id is not valid or not Found"}"#));
        assert!(passes(&expected, 400, r#"{"message":"Invalid ID"}"#));
    }

    #[test]
    fn success_or_wrong_class_mismatches() {
        let expected = invalid_id();
        assert!(!passes(&expected, 200, r#"{"message":"Invalid ID"}"#));
        assert!(!passes(&expected, 404, r#"{"message":"Invalid ID"}"#));
        assert!(!passes(&expected, 500, r#"{"message":"boom"}"#));
    }

    #[test]
    fn structured_error_code() {
        let expected = ExpectedFailure::default().code("error.code", "DUPLICATE");
        assert!(passes(&expected, 409, r#"{"error":{"code":"DUPLICATE"}}"#));
        assert!(!passes(&expected, 409, r#"{"error":{"code":"OTHER"}}"#));
    }

    #[test]
    fn success_class_is_a_definition_problem() {
        let expected = ExpectedFailure::new(StatusExpectation::AnyOf(vec![200, 400]));
        assert_eq!(expected.problems().len(), 1);
        assert!(invalid_id().problems().is_empty());
    }

    #[test]
    fn describes_the_expected_shape() {
        assert_eq!(
            invalid_id().describe(),
            "status one of 500, 400 with \"This id is not valid or not Found\" or \"Invalid ID\""
        );
    }

    #[test]
    fn status_defaults_to_client_error() {
        let expected: ExpectedFailure =
            serde_json::from_str(r#"{"message_contains": ["Not Authorized"]}"#).unwrap();
        assert_eq!(expected.status, StatusExpectation::ClientError);
    }
}
