//! Plan records
//!
//! Keeps every plan ever generated, in creation order. A project may own many
//! plans; which one is active is recorded on the project, not here.

use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;

use crate::conductor::scheduler;
use sdk::errors::EngineError;
use sdk::requirements::Requirements;
use sdk::types::{ExecutionPlan, ExecutionStep, PlanStatus, StepStatus, StepType};

/// Partial update for a plan. Absent fields are left alone.
///
/// `status` only accepts `Approved`; execution moves the plan further.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanUpdate {
    pub status: Option<PlanStatus>,
    pub requirements: Option<Requirements>,
}

/// A step appended to a draft plan by hand
#[derive(Debug, Clone, Deserialize)]
pub struct NewStep {
    /// Generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub step_type: StepType,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub estimated_duration: u32,
    #[serde(default = "default_required")]
    pub required: bool,
    pub order: u32,
}

fn default_required() -> bool {
    true
}

#[derive(Debug, Default)]
pub struct PlanStore {
    plans: HashMap<String, ExecutionPlan>,
    sequence: Vec<String>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, plan: ExecutionPlan) {
        if !self.plans.contains_key(&plan.id) {
            self.sequence.push(plan.id.clone());
        }
        self.plans.insert(plan.id.clone(), plan);
    }

    pub fn get(&self, plan_id: &str) -> Result<&ExecutionPlan, EngineError> {
        self.plans
            .get(plan_id)
            .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))
    }

    pub fn get_mut(&mut self, plan_id: &str) -> Result<&mut ExecutionPlan, EngineError> {
        self.plans
            .get_mut(plan_id)
            .ok_or_else(|| EngineError::PlanNotFound(plan_id.to_string()))
    }

    /// Plans generated for a project, oldest first
    pub fn for_project(&self, project_id: &str) -> Vec<&ExecutionPlan> {
        self.sequence
            .iter()
            .filter_map(|id| self.plans.get(id))
            .filter(|p| p.project_id == project_id)
            .collect()
    }

    /// Drop every plan belonging to a project; returns how many were removed.
    pub fn remove_for_project(&mut self, project_id: &str) -> usize {
        let before = self.plans.len();
        self.plans.retain(|_, p| p.project_id != project_id);
        let plans = &self.plans;
        self.sequence.retain(|id| plans.contains_key(id));
        before - self.plans.len()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn clear(&mut self) {
        self.plans.clear();
        self.sequence.clear();
    }

    /// draft -> approved
    pub fn approve(&mut self, plan_id: &str) -> Result<&ExecutionPlan, EngineError> {
        let plan = self.get_mut(plan_id)?;
        plan.transition(PlanStatus::Approved)?;
        Ok(plan)
    }

    /// Apply a partial update. Nothing changes unless the whole update is legal.
    pub fn update(
        &mut self,
        plan_id: &str,
        update: PlanUpdate,
    ) -> Result<&ExecutionPlan, EngineError> {
        let plan = self.get_mut(plan_id)?;

        if update.requirements.is_some() && plan.status != PlanStatus::Draft {
            return Err(EngineError::InvalidInput(format!(
                "requirements of a {} plan cannot change",
                plan.status
            )));
        }
        // Execution statuses belong to the run; callers may only approve.
        if let Some(next) = update.status {
            if next != PlanStatus::Approved || !plan.status.can_transition_to(next) {
                return Err(EngineError::transition("plan", plan.status, next));
            }
        }

        if let Some(requirements) = update.requirements {
            plan.requirements = requirements;
        }
        match update.status {
            Some(next) => {
                plan.transition(next)?;
            }
            None => plan.updated_at = Utc::now(),
        }
        Ok(plan)
    }

    /// Append a step to a draft plan and recompute the total duration.
    pub fn add_step(
        &mut self,
        plan_id: &str,
        new_step: NewStep,
    ) -> Result<&ExecutionPlan, EngineError> {
        let plan = self.get_mut(plan_id)?;
        if plan.status != PlanStatus::Draft {
            return Err(EngineError::InvalidInput(format!(
                "steps cannot be added to a {} plan",
                plan.status
            )));
        }

        let name = new_step.name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidInput("step name is required".to_string()));
        }

        let id = new_step
            .id
            .unwrap_or_else(|| format!("custom-{}", uuid::Uuid::new_v4()));
        let step = ExecutionStep {
            template_id: "custom".to_string(),
            id,
            name: name.to_string(),
            description: new_step.description,
            step_type: new_step.step_type,
            dependencies: new_step.dependencies,
            estimated_duration: new_step.estimated_duration,
            required: new_step.required,
            order: new_step.order,
            status: StepStatus::Pending,
            error: None,
            metadata: Default::default(),
            started_at: None,
            completed_at: None,
        };

        plan.steps.push(step);
        if let Err(e) = scheduler::validate_order(plan) {
            plan.steps.pop();
            return Err(e);
        }

        plan.recompute_duration();
        plan.updated_at = Utc::now();
        Ok(plan)
    }
}
