//! Conductor Validator
//!
//! Scores a plan for completeness: every category of work a project type
//! needs must have a completed step, required steps must be done, and failed
//! steps cost points. Deterministic.

use async_trait::async_trait;
use std::sync::Arc;

use crate::telemetry::{Outcome, TelemetryEvent, TelemetrySink};
use sdk::agent::{names, Agent, ValidationAgent};
use sdk::reports::ValidationReport;
use sdk::types::{ExecutionPlan, ProjectType, StepStatus, StepType};

const MISSING_CATEGORY_PENALTY: u32 = 15;
const INCOMPLETE_REQUIRED_WEIGHT: f64 = 40.0;
const FAILED_STEP_PENALTY: u32 = 5;

/// Step categories a finished project of this type must contain
pub fn required_categories(project_type: ProjectType) -> &'static [StepType] {
    match project_type {
        ProjectType::Website => &[
            StepType::Setup,
            StepType::Infrastructure,
            StepType::Development,
            StepType::Testing,
            StepType::Deployment,
        ],
        ProjectType::Automation => &[
            StepType::Analysis,
            StepType::Development,
            StepType::Integration,
            StepType::Testing,
            StepType::Deployment,
        ],
    }
}

fn recommendation_for(category: StepType) -> &'static str {
    match category {
        StepType::Setup => "Complete repository and tooling setup before delivery",
        StepType::Planning => "Write down the workflow design",
        StepType::Development => "Finish the implementation work",
        StepType::Testing => "Add and run an automated test suite",
        StepType::Deployment => "Deploy to the production environment",
        StepType::Integration => "Connect and verify the external services",
        StepType::Infrastructure => "Provision the hosting infrastructure",
        StepType::Analysis => "Document the analyzed requirements",
    }
}

#[derive(Default)]
pub struct Validator {
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl Validator {
    pub fn new(telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            telemetry: Some(telemetry),
        }
    }

    pub fn assess(&self, plan: &ExecutionPlan, project_id: &str) -> ValidationReport {
        let mut penalty: u32 = 0;
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        for &category in required_categories(plan.project_type) {
            let done = plan
                .steps
                .iter()
                .any(|s| s.step_type == category && s.status == StepStatus::Completed);
            if !done {
                penalty += MISSING_CATEGORY_PENALTY;
                issues.push(format!("no completed {} step", category));
                recommendations.push(recommendation_for(category).to_string());
            }
        }

        let required_total = plan.steps.iter().filter(|s| s.required).count();
        let required_completed = plan
            .steps
            .iter()
            .filter(|s| s.required && s.status == StepStatus::Completed)
            .count();
        if required_total > 0 && required_completed < required_total {
            let ratio = required_completed as f64 / required_total as f64;
            penalty += ((1.0 - ratio) * INCOMPLETE_REQUIRED_WEIGHT).round() as u32;
            issues.push(format!(
                "{} of {} required steps completed",
                required_completed, required_total
            ));
            recommendations.push("Re-run or replace the incomplete required steps".to_string());
        }

        for step in plan.steps.iter().filter(|s| s.status == StepStatus::Failed) {
            penalty += FAILED_STEP_PENALTY;
            issues.push(format!(
                "step '{}' failed: {}",
                step.name,
                step.error.as_deref().unwrap_or("unknown error")
            ));
        }

        let score = 100u32.saturating_sub(penalty) as u8;
        ValidationReport {
            plan_id: plan.id.clone(),
            project_id: project_id.to_string(),
            score,
            passed: ValidationReport::is_passing(score),
            issues,
            recommendations,
            required_completed,
            required_total,
        }
    }
}

impl Agent for Validator {
    fn name(&self) -> &str {
        names::VALIDATOR
    }

    fn description(&self) -> &str {
        "Checks finished plans for completeness per project type"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn as_validator(&self) -> Option<&dyn ValidationAgent> {
        Some(self)
    }
}

#[async_trait]
impl ValidationAgent for Validator {
    async fn validate_project(&self, plan: &ExecutionPlan, project_id: &str) -> ValidationReport {
        let report = self.assess(plan, project_id);
        if let Some(telemetry) = &self.telemetry {
            let outcome = if report.passed {
                Outcome::Success
            } else {
                Outcome::Failure
            };
            telemetry.record(
                TelemetryEvent::new(names::VALIDATOR, "project_validated", outcome)
                    .project(project_id)
                    .context(plan.id.clone())
                    .metadata(serde_json::json!({ "score": report.score })),
            );
        }
        report
    }
}
