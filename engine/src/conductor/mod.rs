//! Conductor System
//!
//! Plans projects from templates, schedules their steps and runs them through
//! the executor, reviewer and validator agents.

pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod questioner;
pub mod reviewer;
pub mod scheduler;
pub mod store;
pub mod templates;
pub mod validator;

use std::sync::Arc;

use crate::config::Config;
use crate::telemetry::TelemetrySink;
use sdk::agent::Agent;

pub use executor::{AlwaysSucceed, FailSteps, SimulatedExecutor, WorkOutcome, WorkUnit};
pub use orchestrator::{ExecutionReport, Orchestrator, ProjectUpdate, SystemHealth, SystemStatus};
pub use planner::Planner;
pub use questioner::Questioner;
pub use reviewer::{FixedSignals, QualitySignals, RandomSignals, Reviewer, Signal};
pub use store::{NewStep, PlanStore, PlanUpdate};
pub use templates::{StepTemplate, TemplateStore};
pub use validator::Validator;

/// The built-in agents, in the order they are registered
pub fn default_agents(config: &Config, telemetry: Arc<dyn TelemetrySink>) -> Vec<Arc<dyn Agent>> {
    vec![
        Arc::new(Planner::new(
            Arc::new(TemplateStore::builtin()),
            telemetry.clone(),
        )),
        Arc::new(SimulatedExecutor::new(
            config.executor.clone(),
            telemetry.clone(),
        )),
        Arc::new(Reviewer::new(
            Arc::new(RandomSignals::default()),
            telemetry.clone(),
        )),
        Arc::new(Validator::new(telemetry.clone())),
        Arc::new(Questioner::new(telemetry)),
    ]
}
