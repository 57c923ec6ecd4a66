//! Sequential, fail-fast scenario execution.
//!
//! ```text
//! Pending -> Running(0) -> Running(1) -> ... -> Completed
//!                \______________\________________-> Aborted
//! ```
//!
//! A step advances the run only when every one of its checks passed; its
//! extractions are written to [`SharedState`] at that point and not before.
//! Teardown steps run afterwards in either terminal state and never change it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::assertions::{
    AssertionEngine, AssertionResult, NotFoundConvention, Predicate, StatusExpectation, path,
};
use crate::auth::{AuthGateway, Credential};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, TemplateError};
use crate::http::{HttpExecutor, PreparedRequest};
use crate::template::{self, Lookup, TOKEN_PREFIX};

use super::report::{ScenarioReport, StepReport};
use super::state::SharedState;
use super::{Scenario, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    /// Executing the step at this index.
    Running(usize),
    Completed,
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted)
    }

    pub fn start(self, step_count: usize) -> RunState {
        match self {
            RunState::Pending if step_count == 0 => RunState::Completed,
            RunState::Pending => RunState::Running(0),
            other => other,
        }
    }

    /// Moves past the current step. Terminal states stay put.
    pub fn advance(self, passed: bool, step_count: usize) -> RunState {
        match self {
            RunState::Running(_) if !passed => RunState::Aborted,
            RunState::Running(index) if index + 1 >= step_count => RunState::Completed,
            RunState::Running(index) => RunState::Running(index + 1),
            other => other,
        }
    }

    pub fn abort(self) -> RunState {
        if self.is_terminal() { self } else { RunState::Aborted }
    }
}

impl Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Pending => write!(f, "pending"),
            RunState::Running(index) => write!(f, "running step {}", index + 1),
            RunState::Completed => write!(f, "completed"),
            RunState::Aborted => write!(f, "aborted"),
        }
    }
}

/// How one step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    Passed,
    AssertionFailure {
        failed: usize,
    },
    /// A negative step got a success or the wrong kind of failure.
    ExpectedFailureMismatch {
        expected: String,
        status: u16,
    },
    TransportFailure {
        message: String,
    },
    AuthFailure {
        identity: String,
        status: Option<u16>,
        body: String,
    },
    DefinitionError {
        message: String,
    },
    /// Teardown only: the step's inputs were never produced.
    Skipped {
        reason: String,
    },
}

impl StepOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, StepOutcome::Passed)
    }
}

impl From<HarnessError> for StepOutcome {
    fn from(err: HarnessError) -> Self {
        match err {
            HarnessError::Auth {
                identity,
                status,
                body,
            } => StepOutcome::AuthFailure {
                identity,
                status,
                body,
            },
            err @ HarnessError::Transport { .. } => StepOutcome::TransportFailure {
                message: err.to_string(),
            },
            other => StepOutcome::DefinitionError {
                message: other.to_string(),
            },
        }
    }
}

impl Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Passed => write!(f, "passed"),
            StepOutcome::AssertionFailure { failed } => write!(f, "{failed} assertion(s) failed"),
            StepOutcome::ExpectedFailureMismatch { expected, status } => {
                write!(f, "expected failure mismatch: wanted {expected}, got status {status}")
            }
            StepOutcome::TransportFailure { message } => write!(f, "transport failure: {message}"),
            StepOutcome::AuthFailure {
                identity,
                status,
                body,
            } => {
                let status =
                    status.map_or_else(|| "no response".to_string(), |s| format!("status {s}"));
                write!(f, "authentication failed for `{identity}` ({status}): {body}")
            }
            StepOutcome::DefinitionError { message } => write!(f, "{message}"),
            StepOutcome::Skipped { reason } => write!(f, "skipped: {reason}"),
        }
    }
}

/// Placeholder lookup for one step: shared state, then scenario vars, then
/// the tokens fetched for `$token:` references.
struct StepLookup<'a> {
    state: &'a SharedState,
    vars: &'a BTreeMap<String, Value>,
    tokens: &'a BTreeMap<String, Value>,
}

impl Lookup for StepLookup<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.state
            .lookup(name)
            .or_else(|| self.vars.get(name).cloned())
            .or_else(|| self.tokens.get(name).cloned())
    }
}

/// Runs scenarios against one target service.
///
/// Tokens minted for an identity are reused by every later scenario run on
/// the same runner.
#[derive(Debug)]
pub struct ScenarioRunner {
    executor: HttpExecutor,
    gateway: AuthGateway,
    not_found: NotFoundConvention,
}

impl ScenarioRunner {
    pub fn new(config: &HarnessConfig) -> Result<Self, HarnessError> {
        let executor = HttpExecutor::new(config)?;
        Ok(Self {
            gateway: AuthGateway::new(executor.clone()),
            executor,
            not_found: config.not_found.clone(),
        })
    }

    pub fn register(&mut self, name: impl Into<String>, credential: Credential) {
        self.gateway.register(name, credential);
    }

    pub fn gateway(&self) -> &AuthGateway {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut AuthGateway {
        &mut self.gateway
    }

    pub fn identities(&self) -> BTreeSet<String> {
        self.gateway.identities().map(str::to_string).collect()
    }

    /// Runs `scenario` to a terminal state with a fresh [`SharedState`].
    pub async fn run(&mut self, scenario: &Scenario) -> ScenarioReport {
        let started = Instant::now();
        let mut report = ScenarioReport {
            name: scenario.name.clone(),
            state: RunState::Pending,
            error: None,
            steps: Vec::new(),
            teardown: Vec::new(),
            duration_ms: 0,
        };

        info!(scenario = %scenario.name, steps = scenario.steps.len(), "starting scenario");

        let prepared = scenario
            .validate(&self.identities())
            .and_then(|()| resolve_vars(&scenario.vars).map_err(HarnessError::from));
        let vars = match prepared {
            Ok(vars) => vars,
            Err(err) => {
                warn!(scenario = %scenario.name, error = %err, "scenario rejected");
                report.state = report.state.abort();
                report.error = Some(err.to_string());
                report.duration_ms = started.elapsed().as_millis() as u64;
                return report;
            }
        };

        let mut state = SharedState::new();
        let step_count = scenario.steps.len();
        report.state = report.state.start(step_count);

        for step in &scenario.steps {
            let RunState::Running(index) = report.state else {
                break;
            };
            let step_report = self.run_step(step, &mut state, &vars).await;
            let passed = step_report.passed();
            if passed {
                info!(scenario = %scenario.name, step = %step.name, index, "step passed");
            } else {
                warn!(
                    scenario = %scenario.name,
                    step = %step.name,
                    index,
                    outcome = %step_report.outcome,
                    "step failed, aborting scenario"
                );
            }
            report.steps.push(step_report);
            report.state = report.state.advance(passed, step_count);
        }

        for step in &scenario.teardown {
            let step_report = match unresolved(step, &state, &vars) {
                Some(name) => {
                    debug!(step = %step.name, missing = %name, "skipping teardown step");
                    StepReport {
                        name: step.name.clone(),
                        method: step.request.method,
                        url: None,
                        status: None,
                        duration_ms: 0,
                        outcome: StepOutcome::Skipped {
                            reason: format!("`{{{{{name}}}}}` was never written"),
                        },
                        assertions: Vec::new(),
                    }
                }
                None => self.run_step(step, &mut state, &vars).await,
            };
            let skipped = matches!(step_report.outcome, StepOutcome::Skipped { .. });
            if !step_report.passed() && !skipped {
                warn!(
                    scenario = %scenario.name,
                    step = %step.name,
                    outcome = %step_report.outcome,
                    "teardown step failed"
                );
            }
            report.teardown.push(step_report);
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            scenario = %scenario.name,
            state = %report.state,
            duration_ms = report.duration_ms,
            "scenario finished"
        );
        report
    }

    async fn run_step(
        &mut self,
        step: &Step,
        state: &mut SharedState,
        vars: &BTreeMap<String, Value>,
    ) -> StepReport {
        if step.delay_ms > 0 {
            debug!(step = %step.name, delay_ms = step.delay_ms, "pausing before step");
            tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
        }

        let started = Instant::now();
        let mut report = StepReport {
            name: step.name.clone(),
            method: step.request.method,
            url: None,
            status: None,
            duration_ms: 0,
            outcome: StepOutcome::Passed,
            assertions: Vec::new(),
        };

        if let Err(err) = self.execute_step(step, state, vars, &mut report).await {
            report.outcome = StepOutcome::from(err);
        }
        report.duration_ms = started.elapsed().as_millis() as u64;
        report
    }

    async fn execute_step(
        &mut self,
        step: &Step,
        state: &mut SharedState,
        vars: &BTreeMap<String, Value>,
        report: &mut StepReport,
    ) -> Result<(), HarnessError> {
        let mut tokens = BTreeMap::new();
        for name in step.reads()? {
            if let Some(identity) = name.strip_prefix(TOKEN_PREFIX) {
                let token = self.gateway.token(identity).await?;
                tokens.insert(name.clone(), Value::String(token.value));
            }
        }

        let lookup = StepLookup {
            state: &*state,
            vars,
            tokens: &tokens,
        };

        let mut request = PreparedRequest::new(
            step.request.method,
            template::render_str(&step.request.path, &lookup)?,
        );
        if let Some(identity) = &step.identity {
            let token = if step.fresh_token {
                self.gateway.refresh(identity).await?
            } else {
                self.gateway.token(identity).await?
            };
            request = request.bearer(&token.value);
        }
        for (name, value) in &step.request.headers {
            request = request.header(name.clone(), template::render_str(value, &lookup)?);
        }
        if let Some(body) = &step.request.body {
            request = request.json(template::render_value(body, &lookup)?);
        }

        let assertions: Vec<Predicate> = step
            .assertions
            .iter()
            .map(|p| render_item(p, &lookup))
            .collect::<Result<_, _>>()?;
        let expected = step
            .expect_failure
            .as_ref()
            .map(|e| render_item(e, &lookup))
            .transpose()?;

        report.url = Some(self.executor.url_for(&request.path));
        let response = self.executor.send(&request).await?;
        report.status = Some(response.status);

        let engine = AssertionEngine::new(&self.not_found);
        let (mut results, mismatch) = match &expected {
            Some(expected) => {
                let mut results = engine.evaluate_all(&expected.checks(), &response);
                let mismatch = results.iter().any(|r| !r.passed);
                results.extend(engine.evaluate_all(&assertions, &response));
                (results, mismatch)
            }
            None => {
                let implicit = (!assertions.iter().any(Predicate::constrains_status))
                    .then(|| Predicate::status(StatusExpectation::Success));
                let checks: Vec<Predicate> = implicit.into_iter().chain(assertions).collect();
                (engine.evaluate_all(&checks, &response), false)
            }
        };

        let mut extracted = Vec::with_capacity(step.extract.len());
        for rule in &step.extract {
            match response.json().and_then(|doc| path::get(doc, &rule.path)) {
                Some(value) => extracted.push((rule.into.clone(), value.clone())),
                None => results.push(AssertionResult::fail(
                    format!("extract `{}` into `{{{{{}}}}}`", rule.path, rule.into),
                    "present",
                    "missing",
                )),
            }
        }

        let failed = results.iter().filter(|r| !r.passed).count();
        report.outcome = match &expected {
            Some(expected) if mismatch => StepOutcome::ExpectedFailureMismatch {
                expected: expected.describe(),
                status: response.status,
            },
            _ if failed > 0 => StepOutcome::AssertionFailure { failed },
            _ => {
                for (key, value) in extracted {
                    debug!(step = %step.name, key = %key, "extracted");
                    state.insert(key, value);
                }
                StepOutcome::Passed
            }
        };
        report.assertions = results;
        Ok(())
    }
}

/// Resolves generator builtins in scenario vars once per run.
fn resolve_vars(vars: &BTreeMap<String, Value>) -> Result<BTreeMap<String, Value>, TemplateError> {
    let none = BTreeMap::<String, Value>::new();
    vars.iter()
        .map(|(key, value)| Ok((key.clone(), template::render_value(value, &none)?)))
        .collect()
}

/// Runs an item through placeholder resolution via its JSON form.
fn render_item<T, L>(item: &T, lookup: &L) -> Result<T, HarnessError>
where
    T: Serialize + DeserializeOwned,
    L: Lookup,
{
    let value = serde_json::to_value(item)?;
    let rendered = template::render_value(&value, lookup)?;
    Ok(serde_json::from_value(rendered)?)
}

/// The first state name `step` reads that is not available yet.
fn unresolved(step: &Step, state: &SharedState, vars: &BTreeMap<String, Value>) -> Option<String> {
    let names = step.reads().ok()?;
    names
        .into_iter()
        .filter(|name| !template::is_builtin(name))
        .find(|name| !state.contains(name) && !vars.contains_key(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn advances_only_on_pass() {
        let state = RunState::Pending.start(3);
        assert_eq!(state, RunState::Running(0));
        let state = state.advance(true, 3);
        assert_eq!(state, RunState::Running(1));
        assert_eq!(state.advance(false, 3), RunState::Aborted);
        assert_eq!(RunState::Running(2).advance(true, 3), RunState::Completed);
    }

    #[test]
    fn terminal_states_are_final() {
        assert_eq!(RunState::Completed.advance(false, 3), RunState::Completed);
        assert_eq!(RunState::Aborted.advance(true, 3), RunState::Aborted);
        assert_eq!(RunState::Aborted.start(3), RunState::Aborted);
        assert_eq!(RunState::Completed.abort(), RunState::Completed);
        assert_eq!(RunState::Pending.abort(), RunState::Aborted);
    }

    #[test]
    fn errors_map_to_outcomes() {
        let auth = StepOutcome::from(HarnessError::Auth {
            identity: "user".into(),
            status: Some(401),
            body: "Invalid Credentials".into(),
        });
        assert_eq!(
            auth,
            StepOutcome::AuthFailure {
                identity: "user".into(),
                status: Some(401),
                body: "Invalid Credentials".into()
            }
        );

        let transport = StepOutcome::from(HarnessError::Transport {
            method: "GET".into(),
            url: "http://127.0.0.1:9/x".into(),
            message: "timed out after 1s".into(),
        });
        assert!(matches!(
            transport,
            StepOutcome::TransportFailure { ref message } if message.contains("timed out")
        ));

        let definition =
            StepOutcome::from(HarnessError::from(TemplateError::Unresolved("id".into())));
        assert!(matches!(definition, StepOutcome::DefinitionError { .. }));
    }

    #[test]
    fn vars_resolve_once() {
        let mut vars = BTreeMap::new();
        vars.insert("code".to_string(), json!("DISCOUNT20-{{$suffix}}"));
        vars.insert("price".to_string(), json!(99.99));
        let resolved = resolve_vars(&vars).unwrap();
        let code = resolved["code"].as_str().unwrap();
        assert!(code.starts_with("DISCOUNT20-"));
        assert_ne!(code, "DISCOUNT20-{{$suffix}}");
        assert_eq!(resolved["price"], json!(99.99));
    }

    #[test]
    fn state_shadows_vars() {
        let mut state = SharedState::new();
        state.insert("id", json!("from-state"));
        let mut vars = BTreeMap::new();
        vars.insert("id".to_string(), json!("from-vars"));
        vars.insert("title".to_string(), json!("Poetry"));
        let tokens = BTreeMap::new();
        let lookup = StepLookup {
            state: &state,
            vars: &vars,
            tokens: &tokens,
        };
        assert_eq!(lookup.lookup("id"), Some(json!("from-state")));
        assert_eq!(lookup.lookup("title"), Some(json!("Poetry")));
        assert_eq!(lookup.lookup("missing"), None);
    }

    #[test]
    fn predicates_render_with_typed_values() {
        let mut vars = BTreeMap::new();
        vars.insert("price".to_string(), json!(99.99));
        let state = SharedState::new();
        let tokens = BTreeMap::new();
        let lookup = StepLookup {
            state: &state,
            vars: &vars,
            tokens: &tokens,
        };
        let rendered = render_item(&Predicate::equals("price", "{{price}}"), &lookup).unwrap();
        assert_eq!(rendered, Predicate::equals("price", 99.99));
    }

    #[test]
    fn teardown_skip_detection() {
        let step = Step::delete("cleanup", "category/{{categoryId}}");
        let vars = BTreeMap::new();
        let mut state = SharedState::new();
        assert_eq!(unresolved(&step, &state, &vars), Some("categoryId".to_string()));
        state.insert("categoryId", json!("abc"));
        assert_eq!(unresolved(&step, &state, &vars), None);
    }

    #[test]
    fn outcome_display() {
        let outcome = StepOutcome::ExpectedFailureMismatch {
            expected: "status 4xx".into(),
            status: 200,
        };
        assert_eq!(
            outcome.to_string(),
            "expected failure mismatch: wanted status 4xx, got status 200"
        );
        assert_eq!(
            StepOutcome::AssertionFailure { failed: 2 }.to_string(),
            "2 assertion(s) failed"
        );
    }
}
