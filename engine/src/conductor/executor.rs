//! Conductor Executor
//!
//! Performs the simulated work for one `ExecutionStep`. Each step type maps to
//! a handler that describes the work unit; the wall-clock time spent is the
//! step's estimate compressed by `millis_per_minute`. Whether the work
//! succeeds is decided by a pluggable [`WorkOutcome`].

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::ExecutorConfig;
use crate::telemetry::{EventLevel, Outcome, TelemetryEvent, TelemetrySink};
use sdk::agent::{names, Agent, ExecutionAgent};
use sdk::reports::StepResult;
use sdk::types::{ExecutionStep, StepType};

/// Description of the simulated work behind one step
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    pub activity: &'static str,
    pub artifacts: Vec<String>,
    /// Fraction of the estimate actually spent waiting
    pub weight: f64,
}

pub type Handler = fn(&ExecutionStep) -> WorkUnit;

/// Handler lookup, one per step type
pub fn handler_for(step_type: StepType) -> Handler {
    match step_type {
        StepType::Setup => setup_work,
        StepType::Planning => planning_work,
        StepType::Development => development_work,
        StepType::Testing => testing_work,
        StepType::Deployment => deployment_work,
        StepType::Integration => integration_work,
        StepType::Infrastructure => infrastructure_work,
        StepType::Analysis => analysis_work,
    }
}

fn artifact(step: &ExecutionStep, name: &str) -> String {
    format!("{}/{}", step.template_id, name)
}

fn setup_work(step: &ExecutionStep) -> WorkUnit {
    WorkUnit {
        activity: "scaffold",
        artifacts: vec![artifact(step, "config"), artifact(step, "README.md")],
        weight: 0.5,
    }
}

fn planning_work(step: &ExecutionStep) -> WorkUnit {
    WorkUnit {
        activity: "design",
        artifacts: vec![artifact(step, "design.md")],
        weight: 0.6,
    }
}

fn development_work(step: &ExecutionStep) -> WorkUnit {
    WorkUnit {
        activity: "implement",
        artifacts: vec![artifact(step, "src"), artifact(step, "CHANGELOG.md")],
        weight: 1.0,
    }
}

fn testing_work(step: &ExecutionStep) -> WorkUnit {
    WorkUnit {
        activity: "verify",
        artifacts: vec![artifact(step, "test-report.json")],
        weight: 0.8,
    }
}

fn deployment_work(step: &ExecutionStep) -> WorkUnit {
    WorkUnit {
        activity: "release",
        artifacts: vec![artifact(step, "release-notes.md")],
        weight: 0.7,
    }
}

fn integration_work(step: &ExecutionStep) -> WorkUnit {
    WorkUnit {
        activity: "connect",
        artifacts: vec![artifact(step, "connectors")],
        weight: 0.8,
    }
}

fn infrastructure_work(step: &ExecutionStep) -> WorkUnit {
    WorkUnit {
        activity: "provision",
        artifacts: vec![artifact(step, "infrastructure.tf")],
        weight: 0.7,
    }
}

fn analysis_work(step: &ExecutionStep) -> WorkUnit {
    WorkUnit {
        activity: "analyze",
        artifacts: vec![artifact(step, "findings.md")],
        weight: 0.5,
    }
}

/// Decides whether a simulated work unit succeeds
pub trait WorkOutcome: Send + Sync {
    fn decide(&self, step: &ExecutionStep, unit: &WorkUnit) -> Result<(), String>;
}

/// Every work unit succeeds
pub struct AlwaysSucceed;

impl WorkOutcome for AlwaysSucceed {
    fn decide(&self, _step: &ExecutionStep, _unit: &WorkUnit) -> Result<(), String> {
        Ok(())
    }
}

/// Fails the steps generated from the listed template ids
pub struct FailSteps {
    template_ids: HashSet<String>,
}

impl FailSteps {
    pub fn new<I, S>(template_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            template_ids: template_ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl WorkOutcome for FailSteps {
    fn decide(&self, step: &ExecutionStep, unit: &WorkUnit) -> Result<(), String> {
        if self.template_ids.contains(&step.template_id) {
            Err(format!("{} failed for '{}'", unit.activity, step.name))
        } else {
            Ok(())
        }
    }
}

pub struct SimulatedExecutor {
    config: ExecutorConfig,
    outcome: Arc<dyn WorkOutcome>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl SimulatedExecutor {
    pub fn new(config: ExecutorConfig, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self::with_outcome(config, Arc::new(AlwaysSucceed), telemetry)
    }

    pub fn with_outcome(
        config: ExecutorConfig,
        outcome: Arc<dyn WorkOutcome>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            config,
            outcome,
            telemetry,
        }
    }

    /// Wall-clock delay for a work unit, capped at `max_step_delay_ms`
    pub fn delay_for(&self, step: &ExecutionStep, unit: &WorkUnit) -> Duration {
        let millis = f64::from(step.estimated_duration)
            * unit.weight
            * self.config.millis_per_minute as f64;
        let millis = (millis.round() as u64).min(self.config.max_step_delay_ms);
        Duration::from_millis(millis)
    }
}

impl Agent for SimulatedExecutor {
    fn name(&self) -> &str {
        names::EXECUTOR
    }

    fn description(&self) -> &str {
        "Runs simulated work units for each step type"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn as_executor(&self) -> Option<&dyn ExecutionAgent> {
        Some(self)
    }
}

#[async_trait]
impl ExecutionAgent for SimulatedExecutor {
    async fn execute_step(&self, step: &ExecutionStep, project_id: &str) -> StepResult {
        let start = Instant::now();
        let unit = handler_for(step.step_type)(step);

        self.telemetry.record(
            TelemetryEvent::new(names::EXECUTOR, "step_started", Outcome::Started)
                .level(EventLevel::Debug)
                .project(project_id)
                .context(step.id.clone())
                .metadata(serde_json::json!({
                    "step_type": step.step_type,
                    "activity": unit.activity,
                })),
        );

        let delay = self.delay_for(step, &unit);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let decision = self.outcome.decide(step, &unit);
        let elapsed = start.elapsed().as_millis() as u64;

        let (result, outcome) = match decision {
            Ok(()) => {
                debug!("Step {} ({}) finished in {}ms", step.id, unit.activity, elapsed);
                (
                    StepResult::succeeded(step.id.clone(), unit.artifacts, elapsed),
                    Outcome::Success,
                )
            }
            Err(e) => {
                warn!("Step {} failed: {}", step.id, e);
                (StepResult::failed(step.id.clone(), e, elapsed), Outcome::Failure)
            }
        };

        self.telemetry.record(
            TelemetryEvent::new(names::EXECUTOR, "step_finished", outcome)
                .project(project_id)
                .context(step.id.clone())
                .metadata(serde_json::json!({
                    "duration_ms": elapsed,
                    "error": result.error,
                })),
        );

        result
    }
}
