//! Structural assertions over HTTP responses and the JSON documents they carry.
//!
//! Predicates are plain data (they deserialize straight out of suite files)
//! and are evaluated by an [`AssertionEngine`]. Evaluation never stops at the
//! first failure: every predicate of a step yields an [`AssertionResult`], so
//! one failing step reports every violated expectation at once.

mod not_found;
pub mod path;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::HttpResponse;

pub use not_found::{NotFoundConvention, NotFoundSignal};

const PREVIEW_CHARS: usize = 200;

/// Accepted status codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusExpectation {
    /// Any 2xx.
    Success,
    Code(u16),
    AnyOf(Vec<u16>),
    /// Any 4xx.
    ClientError,
    /// Any 5xx.
    ServerError,
}

impl StatusExpectation {
    pub fn matches(&self, status: u16) -> bool {
        match self {
            StatusExpectation::Success => (200..300).contains(&status),
            StatusExpectation::Code(code) => status == *code,
            StatusExpectation::AnyOf(codes) => codes.contains(&status),
            StatusExpectation::ClientError => (400..500).contains(&status),
            StatusExpectation::ServerError => (500..600).contains(&status),
        }
    }

    /// Whether some 2xx status would satisfy this expectation.
    pub fn permits_success(&self) -> bool {
        match self {
            StatusExpectation::Success => true,
            StatusExpectation::Code(code) => (200..300).contains(code),
            StatusExpectation::AnyOf(codes) => codes.iter().any(|c| (200..300).contains(c)),
            StatusExpectation::ClientError | StatusExpectation::ServerError => false,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            StatusExpectation::Success => "2xx".to_string(),
            StatusExpectation::Code(code) => code.to_string(),
            StatusExpectation::AnyOf(codes) => {
                let codes: Vec<String> = codes.iter().map(u16::to_string).collect();
                format!("one of {}", codes.join(", "))
            }
            StatusExpectation::ClientError => "4xx".to_string(),
            StatusExpectation::ServerError => "5xx".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
        }
    }

    fn apply(self, actual: f64, expected: f64) -> bool {
        match self {
            Comparison::Gt => actual > expected,
            Comparison::Ge => actual >= expected,
            Comparison::Lt => actual < expected,
            Comparison::Le => actual <= expected,
        }
    }
}

/// A single check against a response or a JSON document.
///
/// `path` fields use the notation of [`path::get`]; an empty path addresses the
/// whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Predicate {
    Status {
        expect: StatusExpectation,
    },
    BodyNotEmpty,
    /// Raw body contains at least one of the substrings.
    BodyContains {
        any_of: Vec<String>,
    },
    /// The response matches the not-found convention. `accept` overrides the
    /// configured convention for this one check.
    NotFound {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accept: Option<Vec<NotFoundSignal>>,
    },
    Exists {
        path: String,
    },
    NotNull {
        path: String,
    },
    /// Non-empty string, array or object; other non-null scalars pass.
    NotEmpty {
        path: String,
    },
    Equals {
        path: String,
        value: Value,
    },
    NumberEquals {
        path: String,
        value: f64,
        #[serde(default)]
        tolerance: f64,
    },
    IsArray {
        path: String,
    },
    IsObject {
        path: String,
    },
    LengthEquals {
        path: String,
        len: usize,
    },
    LengthGreaterThan {
        path: String,
        len: usize,
    },
    LengthAtLeast {
        path: String,
        len: usize,
    },
    /// Array contains the scalar, or string contains the substring.
    Contains {
        path: String,
        value: Value,
    },
    /// Array of objects has an element whose `field` equals `value`.
    HasElement {
        path: String,
        field: String,
        value: Value,
    },
    FieldsDiffer {
        left: String,
        right: String,
    },
    FieldsMatch {
        left: String,
        right: String,
    },
    Compare {
        path: String,
        op: Comparison,
        value: f64,
    },
    /// Both fields are RFC 3339 timestamps and `earlier` is not after `later`
    /// (strictly before when `strict`).
    TimestampsOrdered {
        earlier: String,
        later: String,
        #[serde(default)]
        strict: bool,
    },
    /// Applies `all` to every element of the array at `path`.
    Each {
        path: String,
        all: Vec<Predicate>,
    },
    /// Finds the first element of the array at `path` whose `field` equals
    /// `value` and applies `then` to it.
    Find {
        path: String,
        field: String,
        value: Value,
        then: Vec<Predicate>,
    },
}

impl Predicate {
    pub fn status(expect: StatusExpectation) -> Self {
        Predicate::Status { expect }
    }

    pub fn status_code(code: u16) -> Self {
        Predicate::Status {
            expect: StatusExpectation::Code(code),
        }
    }

    pub fn not_found() -> Self {
        Predicate::NotFound { accept: None }
    }

    pub fn not_empty(path: impl Into<String>) -> Self {
        Predicate::NotEmpty { path: path.into() }
    }

    pub fn equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Equals {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn has_element(
        path: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Predicate::HasElement {
            path: path.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn fields_match(left: impl Into<String>, right: impl Into<String>) -> Self {
        Predicate::FieldsMatch {
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn fields_differ(left: impl Into<String>, right: impl Into<String>) -> Self {
        Predicate::FieldsDiffer {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Whether the check decides the accepted status on its own: an explicit
    /// status check, or a not-found check whose convention defines it.
    pub fn constrains_status(&self) -> bool {
        matches!(self, Predicate::Status { .. } | Predicate::NotFound { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Predicate::Status { expect } => format!("status is {}", expect.describe()),
            Predicate::BodyNotEmpty => "response body is not empty".to_string(),
            Predicate::BodyContains { any_of } => {
                let quoted: Vec<String> = any_of.iter().map(|s| format!("\"{s}\"")).collect();
                format!("body contains {}", quoted.join(" or "))
            }
            Predicate::NotFound { .. } => "resource is not found".to_string(),
            Predicate::Exists { path } => format!("{} exists", label(path)),
            Predicate::NotNull { path } => format!("{} is not null", label(path)),
            Predicate::NotEmpty { path } => format!("{} is not empty", label(path)),
            Predicate::Equals { path, value } => format!("{} equals {value}", label(path)),
            Predicate::NumberEquals {
                path,
                value,
                tolerance,
            } => {
                if *tolerance > 0.0 {
                    format!("{} equals {value} ±{tolerance}", label(path))
                } else {
                    format!("{} equals {value}", label(path))
                }
            }
            Predicate::IsArray { path } => format!("{} is an array", label(path)),
            Predicate::IsObject { path } => format!("{} is an object", label(path)),
            Predicate::LengthEquals { path, len } => format!("{} has {len} elements", label(path)),
            Predicate::LengthGreaterThan { path, len } => {
                format!("{} has more than {len} elements", label(path))
            }
            Predicate::LengthAtLeast { path, len } => {
                format!("{} has at least {len} elements", label(path))
            }
            Predicate::Contains { path, value } => format!("{} contains {value}", label(path)),
            Predicate::HasElement { path, field, value } => {
                format!("{} has an element with `{field}` == {value}", label(path))
            }
            Predicate::FieldsDiffer { left, right } => {
                format!("{} differs from {}", label(left), label(right))
            }
            Predicate::FieldsMatch { left, right } => {
                format!("{} matches {}", label(left), label(right))
            }
            Predicate::Compare { path, op, value } => {
                format!("{} {} {value}", label(path), op.symbol())
            }
            Predicate::TimestampsOrdered {
                earlier,
                later,
                strict,
            } => {
                let relation = if *strict { "before" } else { "not after" };
                format!("{} is {relation} {}", label(earlier), label(later))
            }
            Predicate::Each { path, .. } => format!("each element of {}", label(path)),
            Predicate::Find { path, field, value, .. } => {
                format!("{} has an element with `{field}` == {value}", label(path))
            }
        }
    }
}

/// Outcome of one predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub description: String,
    pub passed: bool,
    pub expected: String,
    pub actual: String,
}

impl AssertionResult {
    pub fn new(
        description: impl Into<String>,
        passed: bool,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            passed,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn pass(
        description: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::new(description, true, expected, actual)
    }

    pub fn fail(
        description: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::new(description, false, expected, actual)
    }
}

/// What a predicate is evaluated against. Nested predicates (`each`, `find`)
/// only see a document, so response-level checks fail inside them.
#[derive(Clone, Copy)]
enum Target<'a> {
    Response(&'a HttpResponse),
    Document(&'a Value),
}

impl<'a> Target<'a> {
    fn document(self) -> Option<&'a Value> {
        match self {
            Target::Response(response) => response.json(),
            Target::Document(value) => Some(value),
        }
    }

    fn response(self) -> Option<&'a HttpResponse> {
        match self {
            Target::Response(response) => Some(response),
            Target::Document(_) => None,
        }
    }

    fn text(self) -> String {
        match self {
            Target::Response(response) => response.raw_body.clone(),
            Target::Document(value) => value.to_string(),
        }
    }
}

/// Evaluates predicates; holds the target's not-found convention.
#[derive(Debug, Clone, Copy)]
pub struct AssertionEngine<'a> {
    not_found: &'a NotFoundConvention,
}

impl<'a> AssertionEngine<'a> {
    pub fn new(not_found: &'a NotFoundConvention) -> Self {
        Self { not_found }
    }

    /// Evaluates every predicate against the response. Never short-circuits.
    pub fn evaluate_all(
        &self,
        predicates: &[Predicate],
        response: &HttpResponse,
    ) -> Vec<AssertionResult> {
        let mut results = Vec::with_capacity(predicates.len());
        for predicate in predicates {
            self.eval(predicate, Target::Response(response), "", &mut results);
        }
        results
    }

    /// Evaluates predicates against a bare document, e.g. a stored record.
    pub fn evaluate_document(
        &self,
        predicates: &[Predicate],
        document: &Value,
    ) -> Vec<AssertionResult> {
        let mut results = Vec::with_capacity(predicates.len());
        for predicate in predicates {
            self.eval(predicate, Target::Document(document), "", &mut results);
        }
        results
    }

    fn eval(
        &self,
        predicate: &Predicate,
        target: Target<'_>,
        prefix: &str,
        out: &mut Vec<AssertionResult>,
    ) {
        let description = format!("{prefix}{}", predicate.describe());

        match predicate {
            Predicate::Each { path, all } => {
                let items = match array_at(target, path) {
                    Ok(items) => items,
                    Err(actual) => {
                        out.push(AssertionResult::fail(description, "array", actual));
                        return;
                    }
                };
                for (index, item) in items.iter().enumerate() {
                    let nested = format!("{prefix}{}[{index}]: ", label(path));
                    for inner in all {
                        self.eval(inner, Target::Document(item), &nested, out);
                    }
                }
            }
            Predicate::Find {
                path,
                field,
                value,
                then,
            } => {
                let items = match array_at(target, path) {
                    Ok(items) => items,
                    Err(actual) => {
                        out.push(AssertionResult::fail(description, "array", actual));
                        return;
                    }
                };
                let found = items
                    .iter()
                    .find(|item| path::get(item, field).is_some_and(|v| json_eq(v, value)));
                match found {
                    Some(item) => {
                        out.push(AssertionResult::pass(
                            description,
                            value.to_string(),
                            preview(&item.to_string()),
                        ));
                        let nested =
                            format!("{prefix}{} where `{field}` == {value}: ", label(path));
                        for inner in then {
                            self.eval(inner, Target::Document(item), &nested, out);
                        }
                    }
                    None => out.push(AssertionResult::fail(
                        description,
                        value.to_string(),
                        format!("no match among {} elements", items.len()),
                    )),
                }
            }
            other => out.push(self.check(other, target, description)),
        }
    }

    fn check(
        &self,
        predicate: &Predicate,
        target: Target<'_>,
        description: String,
    ) -> AssertionResult {
        let outcome = match predicate {
            Predicate::Status { expect } => match target.response() {
                Some(response) => verdict(
                    expect.matches(response.status),
                    expect.describe(),
                    response.status.to_string(),
                ),
                None => Err(("HTTP response".to_string(), "nested document".to_string())),
            },
            Predicate::BodyNotEmpty => {
                let text = target.text();
                verdict(!text.trim().is_empty(), "non-empty body", preview_or_empty(&text))
            }
            Predicate::BodyContains { any_of } => {
                let text = target.text();
                let found = any_of.iter().any(|needle| text.contains(needle.as_str()));
                verdict(found, any_of.join(" | "), preview_or_empty(&text))
            }
            Predicate::NotFound { accept } => match target.response() {
                Some(response) => {
                    let convention = accept
                        .as_ref()
                        .map(|signals| NotFoundConvention::new(signals.clone()));
                    let convention = convention.as_ref().unwrap_or(self.not_found);
                    let actual = format!(
                        "status {}, body {}",
                        response.status,
                        preview_or_empty(&response.raw_body)
                    );
                    match convention.matched(response) {
                        Some(signal) => Ok((convention.describe(), format!("{signal} ({actual})"))),
                        None => Err((convention.describe(), actual)),
                    }
                }
                None => Err(("HTTP response".to_string(), "nested document".to_string())),
            },
            Predicate::Exists { path } => {
                field(target, path).map(|value| ("present".to_string(), render(value)))
            }
            Predicate::NotNull { path } => field(target, path)
                .and_then(|value| verdict(!value.is_null(), "not null", render(value))),
            Predicate::NotEmpty { path } => field(target, path).and_then(|value| {
                let non_empty = match value {
                    Value::Null => false,
                    Value::String(s) => !s.is_empty(),
                    Value::Array(items) => !items.is_empty(),
                    Value::Object(map) => !map.is_empty(),
                    _ => true,
                };
                verdict(non_empty, "non-empty", render(value))
            }),
            Predicate::Equals { path, value } => field(target, path).and_then(|actual| {
                verdict(json_eq(actual, value), value.to_string(), render(actual))
            }),
            Predicate::NumberEquals {
                path,
                value,
                tolerance,
            } => field(target, path).and_then(|actual| match actual.as_f64() {
                Some(number) => verdict(
                    (number - value).abs() <= tolerance.abs(),
                    format!("{value} ±{tolerance}"),
                    number.to_string(),
                ),
                None => Err(("number".to_string(), render(actual))),
            }),
            Predicate::IsArray { path } => field(target, path)
                .and_then(|value| verdict(value.is_array(), "array", path::type_name(value))),
            Predicate::IsObject { path } => field(target, path)
                .and_then(|value| verdict(value.is_object(), "object", path::type_name(value))),
            Predicate::LengthEquals { path, len } => {
                length(target, path, |n| n == *len, len.to_string())
            }
            Predicate::LengthGreaterThan { path, len } => {
                length(target, path, |n| n > *len, format!("> {len}"))
            }
            Predicate::LengthAtLeast { path, len } => {
                length(target, path, |n| n >= *len, format!(">= {len}"))
            }
            Predicate::Contains { path, value } => {
                field(target, path).and_then(|actual| match actual {
                    Value::Array(items) => verdict(
                        items.iter().any(|item| json_eq(item, value)),
                        value.to_string(),
                        render(actual),
                    ),
                    Value::String(text) => match value {
                        Value::String(needle) => verdict(
                            text.contains(needle.as_str()),
                            value.to_string(),
                            render(actual),
                        ),
                        _ => Err((value.to_string(), render(actual))),
                    },
                    _ => Err((
                        "array or string".to_string(),
                        path::type_name(actual).to_string(),
                    )),
                })
            }
            Predicate::HasElement { path, field: key, value } => array_at(target, path)
                .map_err(|actual| ("array".to_string(), actual))
                .and_then(|items| {
                    let found = items
                        .iter()
                        .any(|item| path::get(item, key).is_some_and(|v| json_eq(v, value)));
                    verdict(
                        found,
                        format!("`{key}` == {value}"),
                        format!("no match among {} elements", items.len()),
                    )
                }),
            Predicate::FieldsDiffer { left, right } => field(target, left).and_then(|l| {
                field(target, right)
                    .and_then(|r| verdict(!json_eq(l, r), format!("!= {}", render(r)), render(l)))
            }),
            Predicate::FieldsMatch { left, right } => field(target, left).and_then(|l| {
                field(target, right).and_then(|r| verdict(json_eq(l, r), render(r), render(l)))
            }),
            Predicate::Compare { path, op, value } => {
                field(target, path).and_then(|actual| match actual.as_f64() {
                    Some(number) => verdict(
                        op.apply(number, *value),
                        format!("{} {value}", op.symbol()),
                        number.to_string(),
                    ),
                    None => Err(("number".to_string(), render(actual))),
                })
            }
            Predicate::TimestampsOrdered {
                earlier,
                later,
                strict,
            } => timestamp(target, earlier).and_then(|first| {
                timestamp(target, later).and_then(|second| {
                    let ordered = if *strict { first < second } else { first <= second };
                    verdict(
                        ordered,
                        format!("{} {}", if *strict { "<" } else { "<=" }, second.to_rfc3339()),
                        first.to_rfc3339(),
                    )
                })
            }),
            // expanded by `eval`
            Predicate::Each { .. } | Predicate::Find { .. } => {
                Err(("element checks".to_string(), "not expanded".to_string()))
            }
        };

        match outcome {
            Ok((expected, actual)) => AssertionResult::pass(description, expected, actual),
            Err((expected, actual)) => AssertionResult::fail(description, expected, actual),
        }
    }
}

/// `Ok((expected, actual))` on pass, `Err((expected, actual))` on failure.
type Outcome = Result<(String, String), (String, String)>;

fn verdict(passed: bool, expected: impl Into<String>, actual: impl Into<String>) -> Outcome {
    let pair = (expected.into(), actual.into());
    if passed { Ok(pair) } else { Err(pair) }
}

fn field<'a>(target: Target<'a>, path: &str) -> Result<&'a Value, (String, String)> {
    let document = target
        .document()
        .ok_or_else(|| ("JSON body".to_string(), preview_or_empty(&target.text())))?;
    path::get(document, path)
        .ok_or_else(|| (format!("{} present", label(path)), "missing".to_string()))
}

fn length(
    target: Target<'_>,
    path: &str,
    passes: impl Fn(usize) -> bool,
    expected: String,
) -> Outcome {
    let items = array_at(target, path).map_err(|actual| ("array".to_string(), actual))?;
    verdict(passes(items.len()), expected, items.len().to_string())
}

fn array_at<'a>(target: Target<'a>, path: &str) -> Result<&'a Vec<Value>, String> {
    let value = field(target, path).map_err(|(_, actual)| actual)?;
    value
        .as_array()
        .ok_or_else(|| format!("{} ({})", path::type_name(value), preview(&value.to_string())))
}

fn timestamp(
    target: Target<'_>,
    path: &str,
) -> Result<DateTime<chrono::FixedOffset>, (String, String)> {
    let value = field(target, path)?;
    let text = value
        .as_str()
        .ok_or_else(|| ("RFC 3339 timestamp".to_string(), render(value)))?;
    DateTime::parse_from_rfc3339(text)
        .map_err(|err| ("RFC 3339 timestamp".to_string(), format!("{text} ({err})")))
}

/// Equality with numbers compared by value, so `20` equals `20.0`.
fn json_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        _ => left == right,
    }
}

fn label(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "$" {
        "body".to_string()
    } else {
        format!("`{trimmed}`")
    }
}

fn render(value: &Value) -> String {
    preview(&value.to_string())
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

fn preview_or_empty(text: &str) -> String {
    if text.is_empty() {
        "<empty>".to_string()
    } else {
        preview(text)
    }
}
