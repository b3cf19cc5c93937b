//! Dependency scheduling over an `ExecutionPlan`
//!
//! Pure functions; the orchestrator holds the lock and applies the results.

use std::collections::{HashMap, HashSet};

use sdk::errors::EngineError;
use sdk::types::{ExecutionPlan, PlanStatus, StepStatus};

/// Pending steps whose dependencies are all completed, ascending by `order`.
pub fn ready_steps(plan: &ExecutionPlan) -> Vec<String> {
    let status: HashMap<&str, StepStatus> =
        plan.steps.iter().map(|s| (s.id.as_str(), s.status)).collect();

    let mut ready: Vec<_> = plan
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Pending)
        .filter(|s| {
            s.dependencies
                .iter()
                .all(|d| status.get(d.as_str()) == Some(&StepStatus::Completed))
        })
        .collect();
    ready.sort_by_key(|s| s.order);
    ready.into_iter().map(|s| s.id.clone()).collect()
}

/// Pending steps that can never run, paired with the dependency that blocks
/// them (a failed or skipped step, or one missing from the plan).
pub fn blocked_steps(plan: &ExecutionPlan) -> Vec<(String, String)> {
    let status: HashMap<&str, StepStatus> =
        plan.steps.iter().map(|s| (s.id.as_str(), s.status)).collect();

    let mut blocked: Vec<_> = plan
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Pending)
        .filter_map(|s| {
            s.dependencies
                .iter()
                .find(|d| {
                    matches!(
                        status.get(d.as_str()),
                        None | Some(StepStatus::Failed) | Some(StepStatus::Skipped)
                    )
                })
                .map(|d| (s.order, s.id.clone(), d.clone()))
        })
        .collect();
    blocked.sort_by_key(|(order, _, _)| *order);
    blocked.into_iter().map(|(_, id, dep)| (id, dep)).collect()
}

/// Mark every blocked step skipped, cascading down the dependency graph.
/// Returns the skipped step ids in the order they were skipped.
pub fn skip_blocked(plan: &mut ExecutionPlan) -> Vec<String> {
    let mut skipped = Vec::new();
    loop {
        let blocked = blocked_steps(plan);
        if blocked.is_empty() {
            return skipped;
        }
        for (step_id, blocker) in blocked {
            if let Some(step) = plan.step_mut(&step_id) {
                if step
                    .skip(format!("dependency '{}' did not complete", blocker))
                    .is_ok()
                {
                    skipped.push(step_id);
                }
            }
        }
    }
}

/// Terminal plan status implied by the current step states.
pub fn outcome(plan: &ExecutionPlan) -> PlanStatus {
    if plan.required_steps_completed() {
        PlanStatus::Completed
    } else {
        PlanStatus::Failed
    }
}

/// Check that step ids and orders are unique and every dependency exists
/// with a lower order, which makes ascending order a topological order.
pub fn validate_order(plan: &ExecutionPlan) -> Result<(), EngineError> {
    let mut ids = HashSet::new();
    let mut orders = HashSet::new();
    for step in &plan.steps {
        if !ids.insert(step.id.as_str()) {
            return Err(EngineError::InvalidInput(format!(
                "duplicate step id '{}'",
                step.id
            )));
        }
        if !orders.insert(step.order) {
            return Err(EngineError::InvalidInput(format!(
                "duplicate step order {}",
                step.order
            )));
        }
    }

    let order_of: HashMap<&str, u32> = plan.steps.iter().map(|s| (s.id.as_str(), s.order)).collect();
    for step in &plan.steps {
        for dep in &step.dependencies {
            match order_of.get(dep.as_str()) {
                None => return Err(EngineError::StepNotFound(dep.clone())),
                Some(&o) if o >= step.order => {
                    return Err(EngineError::InvalidInput(format!(
                        "step '{}' must be ordered after its dependency '{}'",
                        step.id, dep
                    )))
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}
