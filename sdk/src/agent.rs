//! Agent capability trait and worker roles
//!
//! Every worker registered with the orchestrator implements [`Agent`]. The
//! orchestrator only needs the capability interface to register and list a
//! worker; the role it plays is discovered through the `as_*` accessors, so a
//! single registry can hold planners, executors, reviewers and validators side
//! by side without the orchestrator knowing their concrete types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::reports::{ReviewResult, StepResult, ValidationReport};
use crate::requirements::Requirements;
use crate::session::QuestionSession;
use crate::types::{ExecutionPlan, ExecutionStep, ProjectType};

/// Well-known agent names the orchestrator looks up
pub mod names {
    pub const PLANNER: &str = "planner";
    pub const EXECUTOR: &str = "executor";
    pub const REVIEWER: &str = "reviewer";
    pub const VALIDATOR: &str = "validator";
    pub const QUESTIONER: &str = "questioner";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of an agent health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHealth {
    pub status: HealthStatus,
    pub detail: Option<String>,
}

impl AgentHealth {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            detail: None,
        }
    }

    pub fn with_detail(status: HealthStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: Some(detail.into()),
        }
    }
}

/// Trait that all registered workers must implement
pub trait Agent: Send + Sync {
    /// Unique name; registering the same name again replaces the agent
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn version(&self) -> &str;

    fn health(&self) -> AgentHealth {
        AgentHealth::healthy()
    }

    fn as_planner(&self) -> Option<&dyn PlanningAgent> {
        None
    }

    fn as_executor(&self) -> Option<&dyn ExecutionAgent> {
        None
    }

    fn as_reviewer(&self) -> Option<&dyn ReviewAgent> {
        None
    }

    fn as_validator(&self) -> Option<&dyn ValidationAgent> {
        None
    }

    fn as_questioner(&self) -> Option<&dyn QuestioningAgent> {
        None
    }
}

/// Turns a project type and requirement map into a concrete plan
#[async_trait]
pub trait PlanningAgent: Send + Sync {
    async fn create_plan(
        &self,
        project_id: &str,
        project_type: ProjectType,
        requirements: &Requirements,
    ) -> Result<ExecutionPlan, EngineError>;
}

/// Performs the work for one step. Must always return and never mutate the step.
#[async_trait]
pub trait ExecutionAgent: Send + Sync {
    async fn execute_step(&self, step: &ExecutionStep, project_id: &str) -> StepResult;
}

/// Scores a step whose execution succeeded
#[async_trait]
pub trait ReviewAgent: Send + Sync {
    async fn review_step(&self, step: &ExecutionStep, project_id: &str) -> ReviewResult;
}

/// Scores a finished plan for completeness
#[async_trait]
pub trait ValidationAgent: Send + Sync {
    async fn validate_project(&self, plan: &ExecutionPlan, project_id: &str) -> ValidationReport;
}

/// Produces question sessions that gather requirements
pub trait QuestioningAgent: Send + Sync {
    fn start_session(&self, project_id: &str, project_type: ProjectType) -> QuestionSession;
}

/// Descriptive snapshot of a registered agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub description: String,
    pub version: String,
    pub health: AgentHealth,
}

impl AgentInfo {
    pub fn of(agent: &dyn Agent) -> Self {
        Self {
            name: agent.name().to_string(),
            description: agent.description().to_string(),
            version: agent.version().to_string(),
            health: agent.health(),
        }
    }
}
