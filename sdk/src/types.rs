//! Project, plan and step types
//!
//! These are the entities the orchestrator owns. Every status enum carries its
//! own transition table so illegal moves are rejected at the type that owns the
//! state rather than at each call site.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::EngineError;
use crate::requirements::Requirements;

/// Kind of project being delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Website,
    Automation,
}

impl ProjectType {
    pub const ALL: [ProjectType; 2] = [ProjectType::Website, ProjectType::Automation];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Website => "website",
            ProjectType::Automation => "automation",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "website" => Ok(ProjectType::Website),
            "automation" => Ok(ProjectType::Automation),
            other => Err(EngineError::UnknownProjectType(other.to_string())),
        }
    }
}

/// Project lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Planning,
    Active,
    Executing,
    Completed,
    Stopped,
    Failed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "planning",
            ProjectStatus::Active => "active",
            ProjectStatus::Executing => "executing",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Stopped => "stopped",
            ProjectStatus::Failed => "failed",
        }
    }

    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, next),
            (Planning, Active)
                | (Stopped, Active)
                | (Active, Executing)
                | (Active, Stopped)
                | (Active, Failed)
                | (Executing, Completed)
                | (Executing, Stopped)
                | (Executing, Failed)
        )
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution plan status, monotonic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Draft,
    Approved,
    Executing,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Approved => "approved",
            PlanStatus::Executing => "executing",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
        }
    }

    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        matches!(
            (self, next),
            (Draft, Approved) | (Approved, Executing) | (Executing, Completed) | (Executing, Failed)
        )
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Skipped)
                | (InProgress, Completed)
                | (InProgress, Failed)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of step kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Setup,
    Planning,
    Development,
    Testing,
    Deployment,
    Integration,
    Infrastructure,
    Analysis,
}

impl StepType {
    pub const ALL: [StepType; 8] = [
        StepType::Setup,
        StepType::Planning,
        StepType::Development,
        StepType::Testing,
        StepType::Deployment,
        StepType::Integration,
        StepType::Infrastructure,
        StepType::Analysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Setup => "setup",
            StepType::Planning => "planning",
            StepType::Development => "development",
            StepType::Testing => "testing",
            StepType::Deployment => "deployment",
            StepType::Integration => "integration",
            StepType::Infrastructure => "infrastructure",
            StepType::Analysis => "analysis",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A project being delivered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub project_type: ProjectType,
    pub status: ProjectStatus,
    pub requirements: Requirements,
    /// The plan `execute` operates on. Regenerating a plan moves this pointer.
    pub active_plan_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(
        name: impl Into<String>,
        project_type: ProjectType,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            project_type,
            status: ProjectStatus::Planning,
            requirements: Requirements::default(),
            active_plan_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a status transition, returning the previous status.
    pub fn transition(&mut self, next: ProjectStatus) -> Result<ProjectStatus, EngineError> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::transition("project", self.status, next));
        }
        let previous = self.status;
        self.status = next;
        self.updated_at = Utc::now();
        Ok(previous)
    }
}

/// One unit of work inside a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub id: String,
    /// Template the step was generated from (`setup_repo`, ...)
    pub template_id: String,
    pub name: String,
    pub description: String,
    pub step_type: StepType,
    /// Step ids that must be completed first
    pub dependencies: Vec<String>,
    /// Estimated duration in minutes
    pub estimated_duration: u32,
    pub required: bool,
    pub order: u32,
    pub status: StepStatus,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionStep {
    fn transition(&mut self, next: StepStatus) -> Result<(), EngineError> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::transition("step", self.status, next));
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), EngineError> {
        self.transition(StepStatus::InProgress)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), EngineError> {
        self.transition(StepStatus::Completed)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), EngineError> {
        self.transition(StepStatus::Failed)?;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn skip(&mut self, reason: impl Into<String>) -> Result<(), EngineError> {
        self.transition(StepStatus::Skipped)?;
        self.error = Some(reason.into());
        Ok(())
    }
}

/// An ordered, dependency-annotated set of steps for one project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: String,
    pub project_id: String,
    pub project_type: ProjectType,
    pub steps: Vec<ExecutionStep>,
    pub status: PlanStatus,
    /// Sum of step durations in minutes
    pub total_estimated_duration: u32,
    /// Requirement snapshot the plan was generated from
    pub requirements: Requirements,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionPlan {
    pub fn step(&self, step_id: &str) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut ExecutionStep> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }

    pub fn step_by_template(&self, template_id: &str) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| s.template_id == template_id)
    }

    /// Steps sorted by their `order` rank.
    pub fn ordered_steps(&self) -> Vec<&ExecutionStep> {
        let mut steps: Vec<&ExecutionStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }

    pub fn recompute_duration(&mut self) {
        self.total_estimated_duration = self.steps.iter().map(|s| s.estimated_duration).sum();
    }

    pub fn transition(&mut self, next: PlanStatus) -> Result<PlanStatus, EngineError> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::transition("plan", self.status, next));
        }
        let previous = self.status;
        self.status = next;
        self.updated_at = Utc::now();
        Ok(previous)
    }

    /// True when every required step reached `completed`.
    pub fn required_steps_completed(&self) -> bool {
        self.steps
            .iter()
            .filter(|s| s.required)
            .all(|s| s.status == StepStatus::Completed)
    }
}
