//! Suites: named identities plus the scenarios that use them.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::Credential;
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::scenario::{Scenario, ScenarioRunner, SuiteReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    pub name: String,
    #[serde(default)]
    pub identities: BTreeMap<String, Credential>,
    pub scenarios: Vec<Scenario>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identities: BTreeMap::new(),
            scenarios: Vec::new(),
        }
    }

    pub fn identity(mut self, name: impl Into<String>, credential: Credential) -> Self {
        self.identities.insert(name.into(), credential);
        self
    }

    pub fn scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    /// Definition problems of every scenario, prefixed with its name. No
    /// request is made.
    pub fn check(&self) -> Vec<String> {
        let identities: BTreeSet<String> = self.identities.keys().cloned().collect();
        let mut problems = Vec::new();

        let mut seen = BTreeSet::new();
        for scenario in &self.scenarios {
            if !seen.insert(scenario.name.as_str()) {
                problems.push(format!("duplicate scenario name `{}`", scenario.name));
            }
            for problem in scenario.problems(&identities) {
                problems.push(format!("{}: {problem}", scenario.name));
            }
        }
        problems
    }

    /// Keeps only the named scenario.
    pub fn only(mut self, name: &str) -> Result<Self, HarnessError> {
        self.scenarios.retain(|s| s.name == name);
        if self.scenarios.is_empty() {
            return Err(HarnessError::Definition(format!(
                "no scenario named `{name}` in suite `{}`",
                self.name
            )));
        }
        Ok(self)
    }
}

/// Runs the scenarios of a suite one after another. A failed scenario never
/// stops the ones after it.
#[derive(Debug)]
pub struct SuiteRunner {
    runner: ScenarioRunner,
}

impl SuiteRunner {
    pub fn new(config: &HarnessConfig) -> Result<Self, HarnessError> {
        Ok(Self {
            runner: ScenarioRunner::new(config)?,
        })
    }

    pub async fn run(&mut self, suite: &Suite) -> SuiteReport {
        let started = Instant::now();
        info!(suite = %suite.name, scenarios = suite.scenarios.len(), "starting suite");

        for (name, credential) in &suite.identities {
            self.runner.register(name.clone(), credential.clone());
        }

        let mut reports = Vec::with_capacity(suite.scenarios.len());
        for scenario in &suite.scenarios {
            reports.push(self.runner.run(scenario).await);
        }
        self.runner.gateway_mut().clear();

        let report = SuiteReport::new(&suite.name, reports, started.elapsed().as_millis() as u64);
        info!(
            suite = %suite.name,
            passed = report.passed,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "suite finished"
        );
        report
    }
}
