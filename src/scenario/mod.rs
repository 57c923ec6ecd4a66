//! Scenarios: ordered request steps that thread state from one response into
//! the next request.
//!
//! A [`Scenario`] is static data. Before it runs, [`Scenario::problems`]
//! derives what every step reads from its templates and checks that each name
//! is written by an earlier step, declared in `vars`, or a builtin. The
//! [`runner`] then executes the steps one at a time.

pub mod negative;
pub mod report;
pub mod runner;
pub mod state;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assertions::Predicate;
use crate::error::{HarnessError, TemplateError};
use crate::http::HttpMethod;
use crate::template::{self, TOKEN_PREFIX};

pub use negative::{ErrorCode, ExpectedFailure};
pub use report::{OutputFormat, ScenarioReport, StepReport, SuiteReport};
pub use runner::{RunState, ScenarioRunner, StepOutcome};
pub use state::SharedState;

/// Method, path, headers and body of a step, all of which may hold
/// `{{placeholders}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTemplate {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Copies the value at `path` in the response body into shared state as `into`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub path: String,
    pub into: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub request: RequestTemplate,
    /// Identity whose bearer token is attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Re-authenticate before this step instead of reusing the cached token.
    #[serde(default)]
    pub fresh_token: bool,
    /// Pause before sending.
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extract: Vec<Extraction>,
    #[serde(default, rename = "assert", skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<Predicate>,
    /// Turns this into a negative step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_failure: Option<ExpectedFailure>,
}

impl Step {
    pub fn new(name: impl Into<String>, method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            request: RequestTemplate {
                method,
                path: path.into(),
                headers: BTreeMap::new(),
                body: None,
            },
            identity: None,
            fresh_token: false,
            delay_ms: 0,
            extract: Vec::new(),
            assertions: Vec::new(),
            expect_failure: None,
        }
    }

    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, HttpMethod::Get, path)
    }

    pub fn post(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, HttpMethod::Post, path)
    }

    pub fn put(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, HttpMethod::Put, path)
    }

    pub fn delete(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, HttpMethod::Delete, path)
    }

    pub fn as_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_fresh_token(mut self) -> Self {
        self.fresh_token = true;
        self
    }

    pub fn delay_ms(mut self, millis: u64) -> Self {
        self.delay_ms = millis;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.request.body = Some(body);
        self
    }

    pub fn extract(mut self, path: impl Into<String>, into: impl Into<String>) -> Self {
        self.extract.push(Extraction {
            path: path.into(),
            into: into.into(),
        });
        self
    }

    pub fn assert(mut self, predicate: Predicate) -> Self {
        self.assertions.push(predicate);
        self
    }

    pub fn expect_failure(mut self, expected: ExpectedFailure) -> Self {
        self.expect_failure = Some(expected);
        self
    }

    pub fn is_negative(&self) -> bool {
        self.expect_failure.is_some()
    }

    /// Every placeholder name the step's templates and checks reference.
    pub fn reads(&self) -> Result<BTreeSet<String>, TemplateError> {
        let mut names = BTreeSet::new();
        names.extend(template::placeholders(&self.request.path)?);
        for value in self.request.headers.values() {
            names.extend(template::placeholders(value)?);
        }
        if let Some(body) = &self.request.body {
            template::value_placeholders(body, &mut names)?;
        }
        for predicate in &self.assertions {
            template::value_placeholders(&as_value(predicate), &mut names)?;
        }
        if let Some(expected) = &self.expect_failure {
            template::value_placeholders(&as_value(expected), &mut names)?;
        }
        Ok(names)
    }

    /// Shared-state keys this step writes when it passes.
    pub fn writes(&self) -> impl Iterator<Item = &str> {
        self.extract.iter().map(|e| e.into.as_str())
    }
}

fn as_value<T: Serialize>(item: &T) -> Value {
    serde_json::to_value(item).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Literal values, resolved once when the scenario starts. They may use
    /// generator builtins, so `"{{$suffix}}"` is the same in every step.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, Value>,
    pub steps: Vec<Step>,
    /// Clean-up steps that run whether or not the main steps passed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            vars: BTreeMap::new(),
            steps: Vec::new(),
            teardown: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn teardown(mut self, step: Step) -> Self {
        self.teardown.push(step);
        self
    }

    /// Every definition problem, in step order. Empty means runnable.
    pub fn problems(&self, identities: &BTreeSet<String>) -> Vec<String> {
        let mut problems = Vec::new();

        if self.steps.is_empty() {
            problems.push("scenario has no steps".to_string());
        }

        for (key, value) in &self.vars {
            let mut names = BTreeSet::new();
            if let Err(err) = template::value_placeholders(value, &mut names) {
                problems.push(format!("var `{key}`: {err}"));
                continue;
            }
            for name in names.iter().filter(|n| !template::is_generator(n)) {
                problems.push(format!(
                    "var `{key}` reads `{{{{{name}}}}}`; vars may only use $uuid and $suffix"
                ));
            }
        }

        let mut available: BTreeSet<&str> = self.vars.keys().map(String::as_str).collect();
        for (index, step) in self.steps.iter().enumerate() {
            let mut later = BTreeMap::new();
            for writer in &self.steps[index..] {
                for key in writer.writes() {
                    later.entry(key).or_insert(writer.name.as_str());
                }
            }
            StepCheck {
                available: &available,
                later,
                identities,
            }
            .run(step, &mut problems);
            available.extend(step.writes());
        }

        for step in &self.teardown {
            StepCheck {
                available: &available,
                later: BTreeMap::new(),
                identities,
            }
            .run(step, &mut problems);
            available.extend(step.writes());
        }

        problems
    }

    /// [`Scenario::problems`] as a single definition error.
    pub fn validate(&self, identities: &BTreeSet<String>) -> Result<(), HarnessError> {
        let problems = self.problems(identities);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::Definition(problems.join("; ")))
        }
    }
}

/// Checks one step against the names available to it. `later` maps names
/// written by this or a later step to the first writer.
struct StepCheck<'a> {
    available: &'a BTreeSet<&'a str>,
    later: BTreeMap<&'a str, &'a str>,
    identities: &'a BTreeSet<String>,
}

impl StepCheck<'_> {
    fn run(&self, step: &Step, problems: &mut Vec<String>) {
        let label = &step.name;

        if let Some(identity) = &step.identity
            && !self.identities.contains(identity)
        {
            problems.push(format!("step '{label}' uses unknown identity `{identity}`"));
        }

        if let Some(expected) = &step.expect_failure {
            for problem in expected.problems() {
                problems.push(format!("step '{label}': {problem}"));
            }
        }

        let names = match step.reads() {
            Ok(names) => names,
            Err(err) => {
                problems.push(format!("step '{label}': {err}"));
                return;
            }
        };

        for name in &names {
            if template::is_generator(name) {
                continue;
            }
            if let Some(identity) = name.strip_prefix(TOKEN_PREFIX) {
                if !self.identities.contains(identity) {
                    problems.push(format!(
                        "step '{label}' reads the token of unknown identity `{identity}`"
                    ));
                }
                continue;
            }
            if template::is_builtin(name) {
                let err = TemplateError::UnknownBuiltin(name.clone());
                problems.push(format!("step '{label}': {err}"));
                continue;
            }
            if self.available.contains(name.as_str()) {
                continue;
            }
            match self.later.get(name.as_str()) {
                Some(writer) => problems.push(format!(
                    "step '{label}' reads `{{{{{name}}}}}` before step '{writer}' writes it"
                )),
                None => problems.push(format!(
                    "step '{label}' reads `{{{{{name}}}}}` which no earlier step writes"
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertions::StatusExpectation;
    use serde_json::json;

    fn identities(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn category_lifecycle() -> Scenario {
        Scenario::new("category lifecycle")
            .var("title", "Fictional Literature")
            .step(
                Step::post("create", "category")
                    .as_identity("user")
                    .body(json!({"title": "{{title}}"}))
                    .extract("_id", "categoryId"),
            )
            .step(Step::get("fetch", "category/{{categoryId}}"))
            .teardown(Step::delete("cleanup", "category/{{categoryId}}").as_identity("user"))
    }

    #[test]
    fn well_formed_scenario_has_no_problems() {
        let scenario = category_lifecycle();
        assert!(scenario.problems(&identities(&["user"])).is_empty());
        assert!(scenario.validate(&identities(&["user"])).is_ok());
    }

    #[test]
    fn reads_cover_path_headers_body_and_checks() {
        let step = Step::put("update", "book/{{bookId}}")
            .header("X-Trace", "{{trace}}")
            .body(json!({"category": {"_id": "{{categoryId}}"}}))
            .assert(Predicate::equals("title", "{{newTitle}}"));
        let reads: Vec<String> = step.reads().unwrap().into_iter().collect();
        assert_eq!(reads, vec!["bookId", "categoryId", "newTitle", "trace"]);
    }

    #[test]
    fn forward_dependency_is_reported() {
        let scenario = Scenario::new("backwards")
            .step(Step::get("fetch", "category/{{categoryId}}"))
            .step(Step::post("create", "category").extract("_id", "categoryId"));
        let problems = scenario.problems(&identities(&[]));
        assert_eq!(
            problems,
            vec!["step 'fetch' reads `{{categoryId}}` before step 'create' writes it"]
        );
    }

    #[test]
    fn step_cannot_read_its_own_extraction() {
        let scenario = Scenario::new("self").step(
            Step::get("fetch", "category/{{categoryId}}").extract("_id", "categoryId"),
        );
        assert_eq!(scenario.problems(&identities(&[])).len(), 1);
    }

    #[test]
    fn unknown_names_are_reported() {
        let scenario = Scenario::new("typos")
            .step(Step::get("fetch", "category/{{catId}}").as_identity("ghost"))
            .step(
                Step::get("odd", "x/{{$nope}}")
                    .header("Authorization", "Bearer {{$token:admin}}"),
            );
        let problems = scenario.problems(&identities(&["user"]));
        assert_eq!(problems.len(), 4, "{problems:?}");
        assert!(problems[0].contains("unknown identity `ghost`"));
        assert!(problems[1].contains("which no earlier step writes"));
    }

    #[test]
    fn teardown_may_read_anything_the_main_steps_write() {
        let scenario =
            category_lifecycle().teardown(Step::delete("cleanup book", "book/{{bookId}}"));
        let problems = scenario.problems(&identities(&["user"]));
        assert_eq!(
            problems,
            vec!["step 'cleanup book' reads `{{bookId}}` which no earlier step writes"]
        );
    }

    #[test]
    fn vars_may_only_use_generators() {
        let scenario = Scenario::new("vars")
            .var("email", "user{{$suffix}}@example.com")
            .var("bad", "{{categoryId}}")
            .step(Step::get("list", "category"));
        assert_eq!(scenario.problems(&identities(&[])).len(), 1);
    }

    #[test]
    fn empty_scenario_is_a_problem() {
        assert_eq!(
            Scenario::new("empty").problems(&identities(&[])),
            vec!["scenario has no steps"]
        );
    }

    #[test]
    fn negative_step_must_expect_a_failure() {
        let scenario = Scenario::new("neg").step(
            Step::get("invalid", "product/InvalidId")
                .expect_failure(ExpectedFailure::new(StatusExpectation::Success)),
        );
        assert_eq!(scenario.problems(&identities(&[])).len(), 1);
    }

    #[test]
    fn deserializes_from_suite_json() {
        let raw = r#"{
            "name": "category lifecycle",
            "steps": [{
                "name": "create",
                "request": {"method": "POST", "path": "category", "body": {"title": "Fiction"}},
                "identity": "user",
                "extract": [{"path": "_id", "into": "categoryId"}],
                "assert": [{"check": "not_empty", "path": "_id"}]
            }]
        }"#;
        let scenario: Scenario = serde_json::from_str(raw).unwrap();
        assert_eq!(scenario.steps[0].request.method, HttpMethod::Post);
        assert_eq!(scenario.steps[0].writes().collect::<Vec<_>>(), vec!["categoryId"]);
        assert_eq!(scenario.steps[0].assertions, vec![Predicate::not_empty("_id")]);
        assert!(scenario.teardown.is_empty());
    }
}
