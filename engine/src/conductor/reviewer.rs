//! Conductor Reviewer
//!
//! Scores a completed step from quality signals. Each step type has a table of
//! checks; a check whose signal falls below its threshold deducts its weight
//! from 100. The signal source is injectable so scoring can be deterministic.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::telemetry::{Outcome, TelemetryEvent, TelemetrySink};
use rand::Rng;
use sdk::agent::{names, Agent, ReviewAgent};
use sdk::reports::ReviewResult;
use sdk::types::{ExecutionStep, StepType};

/// Observable quality dimension, normalized to 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    CodeQuality,
    TestCoverage,
    Documentation,
    Stability,
    HealthChecks,
    Rollback,
    Configuration,
    Security,
    Performance,
    ErrorHandling,
    Completeness,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Check {
    pub signal: Signal,
    pub threshold: f64,
    pub deduction: u8,
    pub issue: &'static str,
}

const fn check(signal: Signal, threshold: f64, deduction: u8, issue: &'static str) -> Check {
    Check {
        signal,
        threshold,
        deduction,
        issue,
    }
}

const SETUP_CHECKS: &[Check] = &[
    check(Signal::Configuration, 0.7, 15, "configuration is incomplete"),
    check(Signal::Documentation, 0.5, 5, "setup steps are undocumented"),
];

const PLANNING_CHECKS: &[Check] = &[
    check(Signal::Completeness, 0.7, 15, "design leaves requirements uncovered"),
    check(Signal::Documentation, 0.5, 5, "design rationale missing"),
];

const DEVELOPMENT_CHECKS: &[Check] = &[
    check(Signal::CodeQuality, 0.7, 15, "code quality below standard"),
    check(Signal::TestCoverage, 0.6, 10, "insufficient unit test coverage"),
    check(Signal::Documentation, 0.5, 5, "public interfaces undocumented"),
];

const TESTING_CHECKS: &[Check] = &[
    check(Signal::TestCoverage, 0.8, 20, "coverage below target"),
    check(Signal::Stability, 0.7, 10, "flaky tests detected"),
];

const DEPLOYMENT_CHECKS: &[Check] = &[
    check(Signal::HealthChecks, 0.9, 20, "health checks failing after release"),
    check(Signal::Rollback, 0.5, 10, "no rollback path"),
];

const INTEGRATION_CHECKS: &[Check] = &[
    check(Signal::ErrorHandling, 0.7, 15, "external failures are not handled"),
    check(Signal::Performance, 0.6, 5, "integration latency too high"),
];

const INFRASTRUCTURE_CHECKS: &[Check] = &[
    check(Signal::Security, 0.8, 20, "security baseline not met"),
    check(Signal::Performance, 0.6, 10, "capacity below expected load"),
];

const ANALYSIS_CHECKS: &[Check] = &[
    check(Signal::Completeness, 0.7, 15, "analysis misses parts of the process"),
    check(Signal::Documentation, 0.5, 5, "findings not written down"),
];

pub fn checks_for(step_type: StepType) -> &'static [Check] {
    match step_type {
        StepType::Setup => SETUP_CHECKS,
        StepType::Planning => PLANNING_CHECKS,
        StepType::Development => DEVELOPMENT_CHECKS,
        StepType::Testing => TESTING_CHECKS,
        StepType::Deployment => DEPLOYMENT_CHECKS,
        StepType::Integration => INTEGRATION_CHECKS,
        StepType::Infrastructure => INFRASTRUCTURE_CHECKS,
        StepType::Analysis => ANALYSIS_CHECKS,
    }
}

/// Source of quality signal readings
pub trait QualitySignals: Send + Sync {
    fn read(&self, step: &ExecutionStep, signal: Signal) -> f64;
}

/// Uniformly random readings in `floor..=1.0`
pub struct RandomSignals {
    floor: f64,
}

impl RandomSignals {
    pub fn new(floor: f64) -> Self {
        Self {
            floor: floor.clamp(0.0, 1.0),
        }
    }
}

impl Default for RandomSignals {
    fn default() -> Self {
        Self::new(0.75)
    }
}

impl QualitySignals for RandomSignals {
    fn read(&self, _step: &ExecutionStep, _signal: Signal) -> f64 {
        rand::thread_rng().gen_range(self.floor..=1.0)
    }
}

/// Fixed readings, with per-signal overrides
#[derive(Debug, Clone)]
pub struct FixedSignals {
    default: f64,
    overrides: HashMap<Signal, f64>,
}

impl FixedSignals {
    pub fn uniform(value: f64) -> Self {
        Self {
            default: value,
            overrides: HashMap::new(),
        }
    }

    pub fn with(mut self, signal: Signal, value: f64) -> Self {
        self.overrides.insert(signal, value);
        self
    }
}

impl QualitySignals for FixedSignals {
    fn read(&self, _step: &ExecutionStep, signal: Signal) -> f64 {
        self.overrides.get(&signal).copied().unwrap_or(self.default)
    }
}

pub struct Reviewer {
    signals: Arc<dyn QualitySignals>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Reviewer {
    pub fn new(signals: Arc<dyn QualitySignals>, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self { signals, telemetry }
    }

    /// Score a step without emitting telemetry
    pub fn score(&self, step: &ExecutionStep) -> ReviewResult {
        let mut score: u8 = 100;
        let mut issues = Vec::new();
        for c in checks_for(step.step_type) {
            if self.signals.read(step, c.signal) < c.threshold {
                score = score.saturating_sub(c.deduction);
                issues.push(c.issue.to_string());
            }
        }
        ReviewResult::from_score(step.id.clone(), score, issues)
    }
}

impl Agent for Reviewer {
    fn name(&self) -> &str {
        names::REVIEWER
    }

    fn description(&self) -> &str {
        "Scores completed steps against type-specific quality checks"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn as_reviewer(&self) -> Option<&dyn ReviewAgent> {
        Some(self)
    }
}

#[async_trait]
impl ReviewAgent for Reviewer {
    async fn review_step(&self, step: &ExecutionStep, project_id: &str) -> ReviewResult {
        let review = self.score(step);
        let outcome = if review.passed {
            Outcome::Success
        } else {
            Outcome::Failure
        };
        self.telemetry.record(
            TelemetryEvent::new(names::REVIEWER, "step_reviewed", outcome)
                .project(project_id)
                .context(step.id.clone())
                .metadata(serde_json::json!({
                    "score": review.score,
                    "issues": review.issues,
                })),
        );
        review
    }
}
