//! Run reports, as JSON or as a plain-text summary.

use std::fmt::Write as _;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::assertions::AssertionResult;
use crate::http::HttpMethod;

use super::runner::{RunState, StepOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub name: String,
    pub method: HttpMethod,
    /// Resolved URL; `None` when the step never got that far.
    pub url: Option<String>,
    pub status: Option<u16>,
    pub duration_ms: u64,
    pub outcome: StepOutcome,
    pub assertions: Vec<AssertionResult>,
}

impl StepReport {
    pub fn passed(&self) -> bool {
        self.outcome.is_pass()
    }

    pub fn failed_assertions(&self) -> impl Iterator<Item = &AssertionResult> {
        self.assertions.iter().filter(|a| !a.passed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub state: RunState,
    /// Set when the scenario was rejected before any step ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps: Vec<StepReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown: Vec<StepReport>,
    pub duration_ms: u64,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.state == RunState::Completed
    }

    /// The step that aborted the scenario, if any.
    pub fn failed_step(&self) -> Option<&StepReport> {
        self.steps.iter().find(|s| !s.passed())
    }

    pub fn assertion_count(&self) -> usize {
        self.steps.iter().map(|s| s.assertions.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub name: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn new(name: impl Into<String>, scenarios: Vec<ScenarioReport>, duration_ms: u64) -> Self {
        let passed = scenarios.iter().filter(|s| s.passed()).count();
        Self {
            name: name.into(),
            total: scenarios.len(),
            passed,
            failed: scenarios.len() - passed,
            duration_ms,
            scenarios,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn render(&self, format: OutputFormat) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Text => Ok(render_text(self)),
            OutputFormat::Json => serde_json::to_string_pretty(self),
        }
    }
}

/// Human-readable summary listing every assertion.
pub fn render_text(report: &SuiteReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Suite: {}", report.name);

    for scenario in &report.scenarios {
        let mark = if scenario.passed() { "✓" } else { "✗" };
        let _ = writeln!(
            out,
            "\n{mark} {} [{}] ({} checks, {}ms)",
            scenario.name,
            scenario.state,
            scenario.assertion_count(),
            scenario.duration_ms
        );
        if let Some(error) = &scenario.error {
            let _ = writeln!(out, "    {error}");
        }
        for step in &scenario.steps {
            write_step(&mut out, step, "  ");
        }
        if !scenario.teardown.is_empty() {
            let _ = writeln!(out, "  teardown:");
            for step in &scenario.teardown {
                write_step(&mut out, step, "    ");
            }
        }
    }

    let _ = writeln!(
        out,
        "\n{} scenarios: {} passed, {} failed ({}ms)",
        report.total, report.passed, report.failed, report.duration_ms
    );
    out
}

fn write_step(out: &mut String, step: &StepReport, indent: &str) {
    let mark = if step.passed() { "✓" } else { "✗" };
    let target = step.url.as_deref().unwrap_or("-");
    let status = step
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "---".to_string());
    let _ = writeln!(
        out,
        "{indent}{mark} {} ({} {target} -> {status}, {}ms)",
        step.name, step.method, step.duration_ms
    );
    if !step.outcome.is_pass() && !matches!(step.outcome, StepOutcome::AssertionFailure { .. }) {
        let _ = writeln!(out, "{indent}    {}", step.outcome);
    }
    for assertion in &step.assertions {
        if assertion.passed {
            let _ = writeln!(out, "{indent}    ✓ {}", assertion.description);
        } else {
            let _ = writeln!(
                out,
                "{indent}    ✗ {} (expected {}, got {})",
                assertion.description, assertion.expected, assertion.actual
            );
        }
    }
}
