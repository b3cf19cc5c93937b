//! Conductor Planner
//!
//! Turns a project type and requirement map into a concrete `ExecutionPlan`:
//! template steps are filtered by their requirement gates, given fresh
//! identities and scaled by the requested complexity.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::conductor::templates::{StepTemplate, TemplateStore};
use crate::telemetry::{Outcome, TelemetryEvent, TelemetrySink};
use sdk::agent::{names, Agent, PlanningAgent};
use sdk::errors::EngineError;
use sdk::requirements::Requirements;
use sdk::types::{ExecutionPlan, ExecutionStep, PlanStatus, ProjectType, StepStatus};

pub struct Planner {
    templates: Arc<TemplateStore>,
    telemetry: Arc<dyn TelemetrySink>,
    generation: AtomicU64,
}

impl Planner {
    pub fn new(templates: Arc<TemplateStore>, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            templates,
            telemetry,
            generation: AtomicU64::new(0),
        }
    }

    /// Unique suffix for one plan generation: creation millis plus a counter
    fn next_generation(&self) -> String {
        let counter = self.generation.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", Utc::now().timestamp_millis(), counter)
    }

    /// Build the plan without recording it anywhere.
    pub fn build_plan(
        &self,
        project_id: &str,
        project_type: ProjectType,
        requirements: &Requirements,
    ) -> Result<ExecutionPlan, EngineError> {
        let template = self.templates.template_for(project_type)?;
        let kept = select_steps(template, requirements);

        let generation = self.next_generation();
        let step_id = |template_id: &str| format!("{}-{}", template_id, generation);
        let ids: HashMap<&str, String> = kept
            .iter()
            .map(|t| (t.id.as_str(), step_id(&t.id)))
            .collect();

        let complexity = requirements.complexity();
        let steps: Vec<ExecutionStep> = kept
            .iter()
            .map(|t| ExecutionStep {
                id: ids[t.id.as_str()].clone(),
                template_id: t.id.clone(),
                name: t.name.clone(),
                description: t.description.clone(),
                step_type: t.step_type,
                // Dependencies on excluded optional steps disappear
                dependencies: t
                    .dependencies
                    .iter()
                    .filter_map(|d| ids.get(d.as_str()).cloned())
                    .collect(),
                estimated_duration: complexity.scale(t.base_duration),
                required: t.required,
                order: t.order,
                status: StepStatus::Pending,
                error: None,
                metadata: Default::default(),
                started_at: None,
                completed_at: None,
            })
            .collect();

        let now = Utc::now();
        let mut plan = ExecutionPlan {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            project_type,
            steps,
            status: PlanStatus::Draft,
            total_estimated_duration: 0,
            requirements: requirements.clone(),
            created_at: now,
            updated_at: now,
        };
        plan.recompute_duration();
        Ok(plan)
    }
}

/// Required steps, plus optional steps whose gate is truthy. Template order is
/// preserved.
pub fn select_steps<'a>(
    template: &'a [StepTemplate],
    requirements: &Requirements,
) -> Vec<&'a StepTemplate> {
    template
        .iter()
        .filter(|t| {
            t.required
                || t
                    .gate
                    .as_deref()
                    .map(|key| requirements.is_enabled(key))
                    .unwrap_or(false)
        })
        .collect()
}

impl Agent for Planner {
    fn name(&self) -> &str {
        names::PLANNER
    }

    fn description(&self) -> &str {
        "Generates requirement-filtered execution plans from project templates"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn as_planner(&self) -> Option<&dyn PlanningAgent> {
        Some(self)
    }
}

#[async_trait]
impl PlanningAgent for Planner {
    async fn create_plan(
        &self,
        project_id: &str,
        project_type: ProjectType,
        requirements: &Requirements,
    ) -> Result<ExecutionPlan, EngineError> {
        let plan = match self.build_plan(project_id, project_type, requirements) {
            Ok(plan) => plan,
            Err(e) => {
                self.telemetry.record(
                    TelemetryEvent::new(names::PLANNER, "plan_created", Outcome::Failure)
                        .project(project_id)
                        .context(e.to_string()),
                );
                return Err(e);
            }
        };

        debug!(
            "Planned {} steps ({} min) for project {}",
            plan.steps.len(),
            plan.total_estimated_duration,
            project_id
        );
        self.telemetry.record(
            TelemetryEvent::new(names::PLANNER, "plan_created", Outcome::Success)
                .project(project_id)
                .context(plan.id.clone())
                .metadata(serde_json::json!({
                    "project_type": project_type,
                    "steps": plan.steps.len(),
                    "total_estimated_duration": plan.total_estimated_duration,
                })),
        );

        Ok(plan)
    }
}
