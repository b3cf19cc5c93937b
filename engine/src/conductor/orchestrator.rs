//! Orchestrator
//!
//! Owns every project and plan and is the only component that writes their
//! status. Agents are looked up by name from the registry and only ever hand
//! results back; the orchestrator applies them.
//!
//! Plan execution walks the dependency graph:
//!
//! 1. Approve a draft plan, move plan and project to `executing`
//! 2. Skip pending steps whose dependency failed or was skipped
//! 3. Start ready steps (ascending `order`) up to `max_parallel_steps`
//! 4. Run each through the executor, then the reviewer; a failed review
//!    fails the step
//! 5. Repeat until nothing is running and nothing is ready
//! 6. Plan completes iff every required step completed; the project follows
//!
//! Locks are never held across an agent call.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::agent::AgentRegistry;
use crate::conductor::scheduler;
use crate::conductor::store::{NewStep, PlanStore, PlanUpdate};
use crate::config::{Config, OrchestratorConfig};
use crate::message_bus::{Event, MessageBus};
use crate::telemetry::{Outcome, TelemetryEvent, TelemetrySink};
use sdk::agent::{names, Agent, AgentInfo};
use sdk::errors::EngineError;
use sdk::reports::{ReviewResult, StepResult, ValidationReport};
use sdk::requirements::Requirements;
use sdk::session::{QuestionSession, SessionStatus};
use sdk::types::{
    ExecutionPlan, ExecutionStep, PlanStatus, Project, ProjectStatus, ProjectType, StepStatus,
};

const SOURCE: &str = "orchestrator";

/// Partial update for a project. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Replaces the whole requirement map
    pub requirements: Option<Requirements>,
}

/// Everything a plan run produced
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub project_id: String,
    pub plan_id: String,
    pub project_status: ProjectStatus,
    pub plan_status: PlanStatus,
    pub step_results: Vec<StepResult>,
    pub reviews: Vec<ReviewResult>,
    /// Steps never run because a dependency did not complete
    pub skipped: Vec<String>,
    /// Present when a validator is registered. Informational only.
    pub validation: Option<ValidationReport>,
    pub plan: ExecutionPlan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    Healthy,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemHealth {
    pub status: SystemStatus,
    pub agents: usize,
    pub projects: usize,
    pub plans: usize,
}

#[derive(Clone, Copy)]
enum Role {
    Planner,
    Executor,
    Reviewer,
    Validator,
    Questioner,
}

impl Role {
    fn agent_name(&self) -> &'static str {
        match self {
            Role::Planner => names::PLANNER,
            Role::Executor => names::EXECUTOR,
            Role::Reviewer => names::REVIEWER,
            Role::Validator => names::VALIDATOR,
            Role::Questioner => names::QUESTIONER,
        }
    }

    fn provided_by(&self, agent: &dyn Agent) -> bool {
        match self {
            Role::Planner => agent.as_planner().is_some(),
            Role::Executor => agent.as_executor().is_some(),
            Role::Reviewer => agent.as_reviewer().is_some(),
            Role::Validator => agent.as_validator().is_some(),
            Role::Questioner => agent.as_questioner().is_some(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.agent_name())
    }
}

#[derive(Default)]
struct State {
    projects: HashMap<String, Project>,
    /// Project ids in creation order
    project_order: Vec<String>,
    plans: PlanStore,
}

/// What one scheduling pass decided
struct Batch {
    started: Vec<ExecutionStep>,
    skipped: Vec<ExecutionStep>,
    /// The project left `executing` (it was stopped); start nothing new
    halted: bool,
}

struct StepOutcome {
    result: StepResult,
    review: Option<ReviewResult>,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: AgentRegistry,
    state: RwLock<State>,
    bus: Arc<MessageBus>,
    telemetry: Arc<dyn TelemetrySink>,
    shut_down: AtomicBool,
}

impl Orchestrator {
    /// Create an orchestrator with no agents registered
    pub fn new(
        config: OrchestratorConfig,
        telemetry: Arc<dyn TelemetrySink>,
        bus: Arc<MessageBus>,
    ) -> Self {
        Self {
            config,
            registry: AgentRegistry::new(telemetry.clone()),
            state: RwLock::new(State::default()),
            bus,
            telemetry,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Create an orchestrator with the built-in planner, executor, reviewer,
    /// validator and questioner registered
    pub async fn with_default_agents(config: &Config, telemetry: Arc<dyn TelemetrySink>) -> Self {
        let orchestrator = Self::new(
            config.orchestrator.clone(),
            telemetry.clone(),
            Arc::new(MessageBus::new()),
        );
        for agent in super::default_agents(config, telemetry) {
            // Fresh orchestrator, cannot be shut down yet
            let _ = orchestrator.register_agent(agent).await;
        }
        orchestrator
    }

    pub fn bus(&self) -> Arc<MessageBus> {
        self.bus.clone()
    }

    pub fn telemetry(&self) -> Arc<dyn TelemetrySink> {
        self.telemetry.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.is_shut_down() {
            return Err(EngineError::ShutDown);
        }
        Ok(())
    }

    /// Error for an entity that vanished: shutdown wins over not-found
    fn gone(&self, err: EngineError) -> EngineError {
        if self.is_shut_down() {
            EngineError::ShutDown
        } else {
            err
        }
    }

    fn record(&self, event: TelemetryEvent) {
        self.telemetry.record(event);
    }

    // ----- agents -----

    /// Register (or replace) an agent. Returns `true` if one was replaced.
    pub async fn register_agent(&self, agent: Arc<dyn Agent>) -> Result<bool, EngineError> {
        self.ensure_running()?;
        let name = agent.name().to_string();
        let replaced = self.registry.register(agent).await;
        self.bus.publish(Event::AgentRegistered { name }).await;
        Ok(replaced)
    }

    pub async fn list_agents(&self) -> Vec<AgentInfo> {
        self.registry
            .list()
            .await
            .iter()
            .map(|a| AgentInfo::of(a.as_ref()))
            .collect()
    }

    async fn require_agent(&self, role: Role) -> Result<Arc<dyn Agent>, EngineError> {
        let agent = self
            .registry
            .lookup(role.agent_name())
            .await
            .map_err(|_| EngineError::AgentUnavailable(role.agent_name().to_string()))?;
        if !role.provided_by(agent.as_ref()) {
            return Err(EngineError::AgentUnavailable(format!(
                "{} (registered agent lacks the {} role)",
                role.agent_name(),
                role
            )));
        }
        Ok(agent)
    }

    // ----- projects -----

    pub async fn create_project(
        &self,
        name: &str,
        project_type: &str,
        description: &str,
    ) -> Result<Project, EngineError> {
        self.create_project_with_requirements(name, project_type, description, Requirements::new())
            .await
    }

    pub async fn create_project_with_requirements(
        &self,
        name: &str,
        project_type: &str,
        description: &str,
        requirements: Requirements,
    ) -> Result<Project, EngineError> {
        self.ensure_running()?;

        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidInput(
                "project name is required".to_string(),
            ));
        }
        let project_type: ProjectType = project_type.parse()?;

        let mut project = Project::new(name, project_type, description.trim());
        project.requirements = requirements;

        {
            let mut state = self.state.write().await;
            state.project_order.push(project.id.clone());
            state.projects.insert(project.id.clone(), project.clone());
        }

        info!("Created {} project '{}' ({})", project_type, name, project.id);
        self.record(
            TelemetryEvent::new(SOURCE, "project_created", Outcome::Success)
                .project(project.id.clone())
                .context(name.to_string())
                .metadata(serde_json::json!({ "project_type": project_type })),
        );
        self.bus
            .publish(Event::ProjectCreated {
                project_id: project.id.clone(),
            })
            .await;

        Ok(project)
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Project, EngineError> {
        self.state
            .read()
            .await
            .projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))
    }

    /// All projects in creation order
    pub async fn list_projects(&self) -> Vec<Project> {
        let state = self.state.read().await;
        state
            .project_order
            .iter()
            .filter_map(|id| state.projects.get(id))
            .cloned()
            .collect()
    }

    pub async fn update_project(
        &self,
        project_id: &str,
        update: ProjectUpdate,
    ) -> Result<Project, EngineError> {
        self.ensure_running()?;

        let project = {
            let mut state = self.state.write().await;
            let project = state
                .projects
                .get_mut(project_id)
                .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))?;
            if project.status == ProjectStatus::Executing {
                return Err(EngineError::transition("project", project.status, "updated"));
            }

            let name = match update.name.as_deref().map(str::trim) {
                Some("") => {
                    return Err(EngineError::InvalidInput(
                        "project name cannot be empty".to_string(),
                    ))
                }
                other => other.map(str::to_string),
            };

            if let Some(name) = name {
                project.name = name;
            }
            if let Some(description) = update.description {
                project.description = description.trim().to_string();
            }
            if let Some(requirements) = update.requirements {
                project.requirements = requirements;
            }
            project.updated_at = Utc::now();
            project.clone()
        };

        self.record(
            TelemetryEvent::new(SOURCE, "project_updated", Outcome::Success)
                .project(project_id),
        );
        Ok(project)
    }

    /// Remove a project and all its plans
    pub async fn delete_project(&self, project_id: &str) -> Result<Project, EngineError> {
        self.ensure_running()?;

        let (project, plans_removed) = {
            let mut state = self.state.write().await;
            match state.projects.get(project_id) {
                None => return Err(EngineError::ProjectNotFound(project_id.to_string())),
                Some(p) if p.status == ProjectStatus::Executing => {
                    return Err(EngineError::transition("project", p.status, "deleted"))
                }
                Some(_) => {}
            }
            let project = state
                .projects
                .remove(project_id)
                .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))?;
            state.project_order.retain(|id| id != project_id);
            (project, state.plans.remove_for_project(project_id))
        };

        debug!("Deleted project {} and {} plans", project_id, plans_removed);
        self.record(
            TelemetryEvent::new(SOURCE, "project_deleted", Outcome::Success)
                .project(project_id)
                .metadata(serde_json::json!({ "plans_removed": plans_removed })),
        );
        Ok(project)
    }

    /// planning|stopped -> active
    pub async fn start_project(&self, project_id: &str) -> Result<Project, EngineError> {
        self.set_status(project_id, ProjectStatus::Active).await
    }

    /// active|executing -> stopped. A running plan stops scheduling new steps.
    pub async fn stop_project(&self, project_id: &str) -> Result<Project, EngineError> {
        self.set_status(project_id, ProjectStatus::Stopped).await
    }

    async fn set_status(
        &self,
        project_id: &str,
        next: ProjectStatus,
    ) -> Result<Project, EngineError> {
        self.ensure_running()?;

        let (project, previous) = {
            let mut state = self.state.write().await;
            let project = state
                .projects
                .get_mut(project_id)
                .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))?;
            let previous = project.transition(next)?;
            (project.clone(), previous)
        };

        self.announce_status(project_id, previous, next).await;
        Ok(project)
    }

    async fn announce_status(&self, project_id: &str, from: ProjectStatus, to: ProjectStatus) {
        info!("Project {}: {} -> {}", project_id, from, to);
        let outcome = match to {
            ProjectStatus::Failed => Outcome::Failure,
            _ => Outcome::Info,
        };
        self.record(
            TelemetryEvent::new(SOURCE, "project_status_changed", outcome)
                .project(project_id)
                .metadata(serde_json::json!({ "from": from, "to": to })),
        );
        self.bus
            .publish(Event::ProjectStatusChanged {
                project_id: project_id.to_string(),
                from,
                to,
            })
            .await;
    }

    // ----- requirements -----

    /// Open a question session for a project through the questioner agent
    pub async fn start_question_session(
        &self,
        project_id: &str,
    ) -> Result<QuestionSession, EngineError> {
        self.ensure_running()?;
        let project = self.get_project(project_id).await?;
        let agent = self.require_agent(Role::Questioner).await?;
        let questioner = agent
            .as_questioner()
            .ok_or_else(|| EngineError::AgentUnavailable(names::QUESTIONER.to_string()))?;
        Ok(questioner.start_session(&project.id, project.project_type))
    }

    /// Merge the answers of a completed session into the project's requirements
    pub async fn apply_question_session(
        &self,
        project_id: &str,
        session: &QuestionSession,
    ) -> Result<Project, EngineError> {
        self.ensure_running()?;

        if session.project_id != project_id {
            return Err(EngineError::InvalidInput(format!(
                "session {} belongs to project {}",
                session.id, session.project_id
            )));
        }
        if session.status != SessionStatus::Completed {
            return Err(EngineError::InvalidInput(format!(
                "session {} is {}, not completed",
                session.id, session.status
            )));
        }

        let answers = session.requirements();
        let project = {
            let mut state = self.state.write().await;
            let project = state
                .projects
                .get_mut(project_id)
                .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))?;
            if project.project_type != session.project_type {
                return Err(EngineError::InvalidInput(format!(
                    "session is for {} projects",
                    session.project_type
                )));
            }
            if project.status == ProjectStatus::Executing {
                return Err(EngineError::transition("project", project.status, "updated"));
            }
            project.requirements.merge(&answers);
            project.updated_at = Utc::now();
            project.clone()
        };

        self.record(
            TelemetryEvent::new(SOURCE, "requirements_applied", Outcome::Success)
                .project(project_id)
                .context(session.id.clone())
                .metadata(serde_json::json!({ "keys": answers.len() })),
        );
        Ok(project)
    }

    // ----- plans -----

    /// Ask the planner for a fresh plan and make it the project's active plan.
    /// Earlier plans are kept as history.
    pub async fn generate_execution_plan(
        &self,
        project_id: &str,
    ) -> Result<ExecutionPlan, EngineError> {
        self.ensure_running()?;

        let project = self.get_project(project_id).await?;
        if !matches!(
            project.status,
            ProjectStatus::Planning | ProjectStatus::Active | ProjectStatus::Stopped
        ) {
            return Err(EngineError::transition("project", project.status, "replanned"));
        }

        let agent = self.require_agent(Role::Planner).await?;
        let planner = agent
            .as_planner()
            .ok_or_else(|| EngineError::AgentUnavailable(names::PLANNER.to_string()))?;
        let plan = planner
            .create_plan(&project.id, project.project_type, &project.requirements)
            .await?;

        if plan.project_id != project.id {
            return Err(EngineError::Execution(format!(
                "planner returned a plan for project {}",
                plan.project_id
            )));
        }
        scheduler::validate_order(&plan)?;

        {
            let mut state = self.state.write().await;
            let State {
                projects, plans, ..
            } = &mut *state;
            let owner = projects.get_mut(project_id).ok_or_else(|| {
                self.gone(EngineError::ProjectNotFound(project_id.to_string()))
            })?;
            owner.active_plan_id = Some(plan.id.clone());
            owner.updated_at = Utc::now();
            plans.insert(plan.clone());
        }

        self.record(
            TelemetryEvent::new(SOURCE, "plan_generated", Outcome::Success)
                .project(project_id)
                .context(plan.id.clone())
                .metadata(serde_json::json!({
                    "steps": plan.steps.len(),
                    "total_estimated_duration": plan.total_estimated_duration,
                })),
        );
        self.bus
            .publish(Event::PlanGenerated {
                project_id: project_id.to_string(),
                plan_id: plan.id.clone(),
            })
            .await;

        Ok(plan)
    }

    /// The plan `execute_project_plan` would run
    pub async fn active_plan(&self, project_id: &str) -> Result<ExecutionPlan, EngineError> {
        let state = self.state.read().await;
        let project = state
            .projects
            .get(project_id)
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))?;
        let plan_id = project
            .active_plan_id
            .as_deref()
            .ok_or_else(|| EngineError::PlanNotFound(format!("no plan for project {}", project_id)))?;
        state.plans.get(plan_id).cloned()
    }

    pub async fn get_plan(&self, plan_id: &str) -> Result<ExecutionPlan, EngineError> {
        self.state.read().await.plans.get(plan_id).cloned()
    }

    /// Every plan generated for a project, oldest first
    pub async fn plans_for_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<ExecutionPlan>, EngineError> {
        let state = self.state.read().await;
        if !state.projects.contains_key(project_id) {
            return Err(EngineError::ProjectNotFound(project_id.to_string()));
        }
        Ok(state
            .plans
            .for_project(project_id)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn approve_plan(&self, plan_id: &str) -> Result<ExecutionPlan, EngineError> {
        self.ensure_running()?;
        let plan = self.state.write().await.plans.approve(plan_id)?.clone();
        self.plan_updated(&plan, "approved");
        Ok(plan)
    }

    pub async fn update_plan(
        &self,
        plan_id: &str,
        update: PlanUpdate,
    ) -> Result<ExecutionPlan, EngineError> {
        self.ensure_running()?;
        let plan = self.state.write().await.plans.update(plan_id, update)?.clone();
        self.plan_updated(&plan, "updated");
        Ok(plan)
    }

    pub async fn add_step(
        &self,
        plan_id: &str,
        step: NewStep,
    ) -> Result<ExecutionPlan, EngineError> {
        self.ensure_running()?;
        let plan = self.state.write().await.plans.add_step(plan_id, step)?.clone();
        self.plan_updated(&plan, "step_added");
        Ok(plan)
    }

    fn plan_updated(&self, plan: &ExecutionPlan, change: &str) {
        self.record(
            TelemetryEvent::new(SOURCE, "plan_updated", Outcome::Success)
                .project(plan.project_id.clone())
                .context(plan.id.clone())
                .metadata(serde_json::json!({ "change": change, "status": plan.status })),
        );
    }

    // ----- execution -----

    /// Run the project's active plan to a terminal state.
    ///
    /// Step, review and validation failures are reported in the returned
    /// report and in plan/project status, never as `Err`.
    pub async fn execute_project_plan(
        &self,
        project_id: &str,
    ) -> Result<ExecutionReport, EngineError> {
        self.ensure_running()?;
        let executor = self.require_agent(Role::Executor).await?;
        let reviewer = self.require_agent(Role::Reviewer).await?;

        let plan_id = self.begin_execution(project_id).await?;
        self.announce_status(project_id, ProjectStatus::Active, ProjectStatus::Executing)
            .await;
        self.record(
            TelemetryEvent::new(SOURCE, "execution_started", Outcome::Started)
                .project(project_id)
                .context(plan_id.clone()),
        );

        let limit = self.config.max_parallel_steps.max(1);
        let mut in_flight: JoinSet<StepOutcome> = JoinSet::new();
        let mut step_results = Vec::new();
        let mut reviews = Vec::new();
        let mut skipped = Vec::new();
        let mut halted = false;

        loop {
            if self.is_shut_down() {
                in_flight.abort_all();
                return Err(EngineError::ShutDown);
            }

            if !halted {
                let batch = self
                    .schedule(project_id, &plan_id, limit - in_flight.len())
                    .await?;
                halted = batch.halted;
                for step in batch.skipped {
                    self.announce_step(project_id, &plan_id, &step).await;
                    skipped.push(step.id);
                }
                for step in batch.started {
                    self.bus
                        .publish(Event::StepStarted {
                            plan_id: plan_id.clone(),
                            step_id: step.id.clone(),
                        })
                        .await;
                    spawn_step(
                        &mut in_flight,
                        executor.clone(),
                        reviewer.clone(),
                        step,
                        project_id.to_string(),
                    );
                }
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let outcome = joined.map_err(|e| EngineError::Execution(e.to_string()))?;
            self.apply_outcome(project_id, &plan_id, &outcome).await?;
            step_results.push(outcome.result);
            reviews.extend(outcome.review);
        }

        let (project_status, plan) = self.finish_execution(project_id, &plan_id).await?;

        let validation = match self.require_agent(Role::Validator).await {
            Ok(agent) => match agent.as_validator() {
                Some(validator) => Some(validator.validate_project(&plan, project_id).await),
                None => None,
            },
            Err(_) => None,
        };

        Ok(ExecutionReport {
            project_id: project_id.to_string(),
            plan_id,
            project_status,
            plan_status: plan.status,
            step_results,
            reviews,
            skipped,
            validation,
            plan,
        })
    }

    /// Check preconditions and move plan and project to `executing`.
    async fn begin_execution(&self, project_id: &str) -> Result<String, EngineError> {
        let mut state = self.state.write().await;
        let State {
            projects, plans, ..
        } = &mut *state;

        let project = projects
            .get_mut(project_id)
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))?;
        if project.status != ProjectStatus::Active {
            return Err(EngineError::transition(
                "project",
                project.status,
                ProjectStatus::Executing,
            ));
        }
        let plan_id = project
            .active_plan_id
            .clone()
            .ok_or_else(|| EngineError::PlanNotFound(format!("no plan for project {}", project_id)))?;

        let plan = plans.get_mut(&plan_id)?;
        match plan.status {
            PlanStatus::Draft => {
                plan.transition(PlanStatus::Approved)?;
            }
            PlanStatus::Approved => {}
            other => return Err(EngineError::transition("plan", other, PlanStatus::Executing)),
        }
        plan.transition(PlanStatus::Executing)?;
        project.transition(ProjectStatus::Executing)?;

        Ok(plan_id)
    }

    /// Skip blocked steps and start up to `capacity` ready ones.
    async fn schedule(
        &self,
        project_id: &str,
        plan_id: &str,
        capacity: usize,
    ) -> Result<Batch, EngineError> {
        let mut state = self.state.write().await;
        let State {
            projects, plans, ..
        } = &mut *state;

        let project = projects
            .get(project_id)
            .ok_or_else(|| self.gone(EngineError::ProjectNotFound(project_id.to_string())))?;
        if project.status != ProjectStatus::Executing {
            debug!("Project {} is {}, not scheduling", project_id, project.status);
            return Ok(Batch {
                started: Vec::new(),
                skipped: Vec::new(),
                halted: true,
            });
        }

        let plan = plans
            .get_mut(plan_id)
            .map_err(|e| self.gone(e))?;

        let skipped: Vec<ExecutionStep> = scheduler::skip_blocked(plan)
            .iter()
            .filter_map(|id| plan.step(id).cloned())
            .collect();

        let mut started = Vec::new();
        for id in scheduler::ready_steps(plan).into_iter().take(capacity) {
            if let Some(step) = plan.step_mut(&id) {
                step.start()?;
                started.push(step.clone());
            }
        }

        Ok(Batch {
            started,
            skipped,
            halted: false,
        })
    }

    /// Write a step's execution and review outcome into the plan.
    async fn apply_outcome(
        &self,
        project_id: &str,
        plan_id: &str,
        outcome: &StepOutcome,
    ) -> Result<(), EngineError> {
        let result = &outcome.result;
        let step = {
            let mut state = self.state.write().await;
            let plan = state.plans.get_mut(plan_id).map_err(|e| self.gone(e))?;
            let step = plan
                .step_mut(&result.step_id)
                .ok_or_else(|| EngineError::StepNotFound(result.step_id.clone()))?;

            step.metadata
                .insert("duration_ms".to_string(), serde_json::json!(result.duration_ms));
            step.metadata
                .insert("artifacts".to_string(), serde_json::json!(result.artifacts));
            if let Some(review) = &outcome.review {
                step.metadata
                    .insert("review_score".to_string(), serde_json::json!(review.score));
            }

            match (&outcome.review, result.success) {
                (_, false) => step.fail(
                    result
                        .error
                        .clone()
                        .unwrap_or_else(|| "execution failed".to_string()),
                )?,
                (Some(review), true) if !review.passed => step.fail(format!(
                    "review failed with score {}: {}",
                    review.score,
                    review.issues.join("; ")
                ))?,
                _ => step.complete()?,
            }
            step.clone()
        };

        self.announce_step(project_id, plan_id, &step).await;
        Ok(())
    }

    async fn announce_step(&self, project_id: &str, plan_id: &str, step: &ExecutionStep) {
        let (action, outcome) = match step.status {
            StepStatus::Completed => ("step_completed", Outcome::Success),
            StepStatus::Skipped => ("step_skipped", Outcome::Info),
            _ => ("step_failed", Outcome::Failure),
        };
        if step.status != StepStatus::Completed {
            warn!(
                "Step {} {}: {}",
                step.id,
                step.status,
                step.error.as_deref().unwrap_or("-")
            );
        }
        self.record(
            TelemetryEvent::new(SOURCE, action, outcome)
                .project(project_id)
                .context(step.id.clone())
                .metadata(serde_json::json!({
                    "template_id": step.template_id,
                    "error": step.error,
                })),
        );
        self.bus
            .publish(Event::StepFinished {
                plan_id: plan_id.to_string(),
                step_id: step.id.clone(),
                status: step.status,
            })
            .await;
    }

    /// Settle plan and project status once nothing else can run.
    async fn finish_execution(
        &self,
        project_id: &str,
        plan_id: &str,
    ) -> Result<(ProjectStatus, ExecutionPlan), EngineError> {
        let (plan, previous, project_status) = {
            let mut state = self.state.write().await;
            let State {
                projects, plans, ..
            } = &mut *state;

            let plan = plans.get_mut(plan_id).map_err(|e| self.gone(e))?;
            let plan_status = scheduler::outcome(plan);
            plan.transition(plan_status)?;

            let project = projects
                .get_mut(project_id)
                .ok_or_else(|| self.gone(EngineError::ProjectNotFound(project_id.to_string())))?;
            let previous = project.status;
            // A stopped project keeps its status
            if previous == ProjectStatus::Executing {
                let next = match plan_status {
                    PlanStatus::Completed => ProjectStatus::Completed,
                    _ => ProjectStatus::Failed,
                };
                project.transition(next)?;
            }
            (plan.clone(), previous, project.status)
        };

        let outcome = match plan.status {
            PlanStatus::Completed => Outcome::Success,
            _ => Outcome::Failure,
        };
        info!("Plan {} finished: {}", plan_id, plan.status);
        self.record(
            TelemetryEvent::new(SOURCE, "plan_finished", outcome)
                .project(project_id)
                .context(plan_id.to_string())
                .metadata(serde_json::json!({ "status": plan.status })),
        );
        self.bus
            .publish(Event::PlanFinished {
                project_id: project_id.to_string(),
                plan_id: plan_id.to_string(),
                status: plan.status,
            })
            .await;
        if previous != project_status {
            self.announce_status(project_id, previous, project_status)
                .await;
        }

        Ok((project_status, plan))
    }

    /// Run the validator against the project's active plan
    pub async fn validate_project(
        &self,
        project_id: &str,
    ) -> Result<ValidationReport, EngineError> {
        self.ensure_running()?;
        let agent = self.require_agent(Role::Validator).await?;
        let plan = self.active_plan(project_id).await?;
        let validator = agent
            .as_validator()
            .ok_or_else(|| EngineError::AgentUnavailable(names::VALIDATOR.to_string()))?;
        Ok(validator.validate_project(&plan, project_id).await)
    }

    // ----- observability -----

    /// Most recent telemetry for a project, oldest first
    pub async fn get_project_logs(
        &self,
        project_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<TelemetryEvent>, EngineError> {
        if !self.state.read().await.projects.contains_key(project_id) {
            return Err(EngineError::ProjectNotFound(project_id.to_string()));
        }
        let limit = limit.unwrap_or(self.config.default_log_limit);
        Ok(self.telemetry.recent_for_project(project_id, limit))
    }

    pub async fn get_system_health(&self) -> SystemHealth {
        if self.is_shut_down() {
            return SystemHealth {
                status: SystemStatus::Shutdown,
                agents: 0,
                projects: 0,
                plans: 0,
            };
        }
        let agents = self.registry.len().await;
        let state = self.state.read().await;
        SystemHealth {
            status: SystemStatus::Healthy,
            agents,
            projects: state.projects.len(),
            plans: state.plans.len(),
        }
    }

    /// Release every agent, project, plan and buffered event. Idempotent.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down orchestrator");
        self.bus.publish(Event::ShuttingDown).await;
        self.registry.clear().await;
        self.telemetry.clear();
        let mut state = self.state.write().await;
        state.projects.clear();
        state.project_order.clear();
        state.plans.clear();
    }
}

/// Run one step on its own task so a panicking agent fails only that step.
fn spawn_step(
    in_flight: &mut JoinSet<StepOutcome>,
    executor: Arc<dyn Agent>,
    reviewer: Arc<dyn Agent>,
    step: ExecutionStep,
    project_id: String,
) {
    let step_id = step.id.clone();
    let work = tokio::spawn(run_step(executor, reviewer, step, project_id));
    in_flight.spawn(async move {
        match work.await {
            Ok(outcome) => outcome,
            Err(e) => StepOutcome {
                result: StepResult::failed(step_id, format!("step worker aborted: {}", e), 0),
                review: None,
            },
        }
    });
}

async fn run_step(
    executor: Arc<dyn Agent>,
    reviewer: Arc<dyn Agent>,
    step: ExecutionStep,
    project_id: String,
) -> StepOutcome {
    let result = match executor.as_executor() {
        Some(executor) => executor.execute_step(&step, &project_id).await,
        None => StepResult::failed(step.id.clone(), "executor role unavailable", 0),
    };
    if !result.success {
        return StepOutcome {
            result,
            review: None,
        };
    }

    let review = match reviewer.as_reviewer() {
        Some(reviewer) => Some(reviewer.review_step(&step, &project_id).await),
        None => None,
    };
    StepOutcome { result, review }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MemorySink;

    async fn orchestrator() -> Orchestrator {
        let mut config = Config::default();
        config.executor.millis_per_minute = 0;
        Orchestrator::with_default_agents(&config, Arc::new(MemorySink::default())).await
    }

    #[tokio::test]
    async fn test_default_agents_registered() {
        let orch = orchestrator().await;
        let names: Vec<String> = orch.list_agents().await.into_iter().map(|a| a.name).collect();
        assert_eq!(
            names,
            vec!["planner", "executor", "reviewer", "validator", "questioner"]
        );
    }

    #[tokio::test]
    async fn test_create_project_validates_input() {
        let orch = orchestrator().await;
        assert!(matches!(
            orch.create_project("  ", "website", "").await,
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            orch.create_project("x", "mobile", "").await,
            Err(EngineError::UnknownProjectType(_))
        ));
        let p = orch.create_project(" Site ", "Website", "landing").await.unwrap();
        assert_eq!(p.name, "Site");
        assert_eq!(p.status, ProjectStatus::Planning);
    }

    #[tokio::test]
    async fn test_restart_rejected() {
        let orch = orchestrator().await;
        let p = orch.create_project("site", "website", "").await.unwrap();
        orch.start_project(&p.id).await.unwrap();
        assert!(matches!(
            orch.start_project(&p.id).await,
            Err(EngineError::InvalidTransition { .. })
        ));
        orch.stop_project(&p.id).await.unwrap();
        assert_eq!(
            orch.start_project(&p.id).await.unwrap().status,
            ProjectStatus::Active
        );
    }

    #[tokio::test]
    async fn test_regeneration_moves_active_pointer() {
        let orch = orchestrator().await;
        let p = orch.create_project("site", "website", "").await.unwrap();
        let first = orch.generate_execution_plan(&p.id).await.unwrap();
        let second = orch.generate_execution_plan(&p.id).await.unwrap();

        assert_eq!(orch.active_plan(&p.id).await.unwrap().id, second.id);
        let history: Vec<String> = orch
            .plans_for_project(&p.id)
            .await
            .unwrap()
            .into_iter()
            .map(|plan| plan.id)
            .collect();
        assert_eq!(history, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_execute_requires_active_project() {
        let orch = orchestrator().await;
        let p = orch.create_project("site", "website", "").await.unwrap();
        orch.generate_execution_plan(&p.id).await.unwrap();
        assert!(matches!(
            orch.execute_project_plan(&p.id).await,
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_plans() {
        let orch = orchestrator().await;
        let p = orch.create_project("site", "website", "").await.unwrap();
        let plan = orch.generate_execution_plan(&p.id).await.unwrap();
        orch.delete_project(&p.id).await.unwrap();

        assert!(matches!(
            orch.get_plan(&plan.id).await,
            Err(EngineError::PlanNotFound(_))
        ));
        assert_eq!(orch.get_system_health().await.plans, 0);
    }

    #[tokio::test]
    async fn test_update_project() {
        let orch = orchestrator().await;
        let p = orch.create_project("site", "website", "").await.unwrap();
        let update = ProjectUpdate {
            name: Some("renamed".to_string()),
            description: None,
            requirements: Some(Requirements::new().with("cms", true)),
        };
        let updated = orch.update_project(&p.id, update).await.unwrap();
        assert_eq!(updated.name, "renamed");
        assert!(updated.requirements.is_enabled("cms"));

        let blank = ProjectUpdate {
            name: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(orch.update_project(&p.id, blank).await.is_err());
    }

    #[tokio::test]
    async fn test_plan_update_cannot_bypass_execution() {
        let orch = orchestrator().await;
        let p = orch.create_project("site", "website", "").await.unwrap();
        orch.start_project(&p.id).await.unwrap();
        let plan = orch.generate_execution_plan(&p.id).await.unwrap();
        orch.approve_plan(&plan.id).await.unwrap();

        for next in [PlanStatus::Executing, PlanStatus::Completed] {
            let update = PlanUpdate {
                status: Some(next),
                requirements: None,
            };
            assert!(matches!(
                orch.update_plan(&plan.id, update).await,
                Err(EngineError::InvalidTransition { .. })
            ));
        }
        assert_eq!(
            orch.get_plan(&plan.id).await.unwrap().status,
            PlanStatus::Approved
        );

        let report = orch.execute_project_plan(&p.id).await.unwrap();
        assert_eq!(report.plan_status, PlanStatus::Completed);
        assert_eq!(report.project_status, ProjectStatus::Completed);
    }

    #[tokio::test]
    async fn test_shutdown_drops_buffered_events() {
        let orch = orchestrator().await;
        let p = orch.create_project("site", "website", "").await.unwrap();
        orch.generate_execution_plan(&p.id).await.unwrap();
        let telemetry = orch.telemetry();
        assert!(!telemetry.recent_for_project(&p.id, 10).is_empty());

        orch.shutdown().await;
        assert!(telemetry.recent_for_project(&p.id, 10).is_empty());
    }
}
