//! End-to-end scenarios through the orchestrator's public API

use std::collections::HashSet;
use std::sync::Arc;

use sdk::errors::{EngineError, ErrorExt, ErrorKind};
use sdk::requirements::Requirements;
use sdk::types::{ExecutionPlan, PlanStatus, ProjectStatus, StepStatus};
use shipwright_engine::conductor::{
    FailSteps, FixedSignals, Planner, Questioner, Reviewer, SimulatedExecutor, SystemHealth,
    SystemStatus, TemplateStore, Validator,
};
use shipwright_engine::config::{Config, OrchestratorConfig};
use shipwright_engine::message_bus::MessageBus;
use shipwright_engine::telemetry::{MemorySink, TelemetrySink};
use shipwright_engine::Orchestrator;

async fn default_orchestrator() -> Orchestrator {
    Orchestrator::with_default_agents(&Config::default(), Arc::new(MemorySink::default())).await
}

/// Orchestrator with deterministic agents: listed templates fail, reviews
/// always pass.
async fn orchestrator_failing(templates: &[&str]) -> Orchestrator {
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(MemorySink::default());
    let orch = Orchestrator::new(
        OrchestratorConfig::default(),
        telemetry.clone(),
        Arc::new(MessageBus::new()),
    );
    orch.register_agent(Arc::new(Planner::new(
        Arc::new(TemplateStore::builtin()),
        telemetry.clone(),
    )))
    .await
    .unwrap();
    orch.register_agent(Arc::new(SimulatedExecutor::with_outcome(
        Config::default().executor,
        Arc::new(FailSteps::new(templates.iter().copied())),
        telemetry.clone(),
    )))
    .await
    .unwrap();
    orch.register_agent(Arc::new(Reviewer::new(
        Arc::new(FixedSignals::uniform(1.0)),
        telemetry.clone(),
    )))
    .await
    .unwrap();
    orch.register_agent(Arc::new(Validator::new(telemetry.clone())))
        .await
        .unwrap();
    orch.register_agent(Arc::new(Questioner::new(telemetry)))
        .await
        .unwrap();
    orch
}

fn template_ids(plan: &ExecutionPlan) -> Vec<&str> {
    plan.ordered_steps()
        .into_iter()
        .map(|s| s.template_id.as_str())
        .collect()
}

/// Template ids a step depends on, directly or through other steps
fn transitive_deps(plan: &ExecutionPlan, template_id: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut frontier = vec![plan
        .step_by_template(template_id)
        .expect("step in plan")
        .id
        .clone()];
    while let Some(id) = frontier.pop() {
        if let Some(step) = plan.step(&id) {
            for dep in &step.dependencies {
                if let Some(dep_step) = plan.step(dep) {
                    if seen.insert(dep_step.template_id.clone()) {
                        frontier.push(dep.clone());
                    }
                }
            }
        }
    }
    seen
}

#[tokio::test]
async fn test_website_plan_shape() {
    let orch = default_orchestrator().await;
    let project = orch.create_project("Storefront", "website", "").await.unwrap();
    let plan = orch.generate_execution_plan(&project.id).await.unwrap();

    let first = plan.ordered_steps()[0];
    assert_eq!(first.template_id, "setup_repo");
    assert!(first.dependencies.is_empty());
    assert_eq!(first.order, 1);

    let frontend_deps = transitive_deps(&plan, "create_frontend");
    assert!(frontend_deps.contains("setup_database"));
    assert!(frontend_deps.contains("setup_repo"));

    // Optional steps are excluded without their requirement
    assert!(plan.step_by_template("setup_cms").is_none());
    assert!(plan.step_by_template("setup_analytics").is_none());
    assert_eq!(plan.status, PlanStatus::Draft);
    assert_eq!(plan.project_id, project.id);
}

#[tokio::test]
async fn test_automation_monitoring_requirement() {
    let orch = default_orchestrator().await;

    let without = orch
        .create_project_with_requirements(
            "Sync",
            "automation",
            "",
            Requirements::new().with("monitoring", false),
        )
        .await
        .unwrap();
    let plan = orch.generate_execution_plan(&without.id).await.unwrap();
    assert!(!template_ids(&plan).contains(&"setup_monitoring"));

    let with = orch
        .create_project_with_requirements(
            "Sync",
            "automation",
            "",
            Requirements::new().with("monitoring", true),
        )
        .await
        .unwrap();
    let plan = orch.generate_execution_plan(&with.id).await.unwrap();
    assert!(template_ids(&plan).contains(&"setup_monitoring"));
    assert_eq!(plan.steps.len(), 8);
}

#[tokio::test]
async fn test_failed_required_step_fails_plan_and_project() {
    let orch = orchestrator_failing(&["create_backend"]).await;
    let project = orch.create_project("Blog", "website", "").await.unwrap();
    orch.start_project(&project.id).await.unwrap();
    orch.generate_execution_plan(&project.id).await.unwrap();

    let report = orch.execute_project_plan(&project.id).await.unwrap();
    assert_eq!(report.plan_status, PlanStatus::Failed);
    assert_eq!(report.project_status, ProjectStatus::Failed);

    let backend = report.plan.step_by_template("create_backend").unwrap();
    assert_eq!(backend.status, StepStatus::Failed);
    assert!(backend
        .error
        .as_deref()
        .unwrap()
        .contains("failed for 'Build backend'"));

    // Everything downstream of the failure is skipped, upstream completed
    for downstream in ["create_frontend", "write_tests", "deploy_site"] {
        let step = report.plan.step_by_template(downstream).unwrap();
        assert_eq!(step.status, StepStatus::Skipped, "{}", downstream);
        assert!(report.skipped.contains(&step.id));
    }
    for upstream in ["setup_repo", "setup_database"] {
        assert_eq!(
            report.plan.step_by_template(upstream).unwrap().status,
            StepStatus::Completed
        );
    }

    let stored = orch.get_project(&project.id).await.unwrap();
    assert_eq!(stored.status, ProjectStatus::Failed);
}

#[tokio::test]
async fn test_unknown_project_type_creates_nothing() {
    let orch = default_orchestrator().await;
    let err = orch
        .create_project("App", "mobile", "")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownProjectType(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let health = orch.get_system_health().await;
    assert_eq!(health.projects, 0);
    assert_eq!(health.plans, 0);
}

#[tokio::test]
async fn test_no_agents_means_no_plan() {
    let orch = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(MemorySink::default()),
        Arc::new(MessageBus::new()),
    );
    let project = orch.create_project("Site", "website", "").await.unwrap();

    let err = orch.generate_execution_plan(&project.id).await.unwrap_err();
    assert!(matches!(err, EngineError::AgentUnavailable(ref name) if name.contains("planner")));
    assert_eq!(err.status_code(), 503);
    assert_eq!(orch.get_system_health().await.plans, 0);
}

#[tokio::test]
async fn test_successful_run_completes_everything() {
    let orch = orchestrator_failing(&[]).await;
    let project = orch
        .create_project_with_requirements(
            "Shop",
            "website",
            "",
            Requirements::new().with("cms", true).with("analytics", true),
        )
        .await
        .unwrap();
    orch.start_project(&project.id).await.unwrap();
    orch.generate_execution_plan(&project.id).await.unwrap();

    let report = orch.execute_project_plan(&project.id).await.unwrap();
    assert_eq!(report.project_status, ProjectStatus::Completed);
    assert_eq!(report.plan_status, PlanStatus::Completed);
    assert_eq!(report.step_results.len(), 8);
    assert_eq!(report.reviews.len(), 8);
    assert!(report.skipped.is_empty());
    assert!(report
        .plan
        .steps
        .iter()
        .all(|s| s.status == StepStatus::Completed && s.metadata.contains_key("review_score")));

    let validation = report.validation.expect("validator registered");
    assert!(validation.passed);
    assert_eq!(validation.score, 100);
}

#[tokio::test]
async fn test_failed_review_fails_step() {
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(MemorySink::default());
    let orch = Orchestrator::new(
        OrchestratorConfig::default(),
        telemetry.clone(),
        Arc::new(MessageBus::new()),
    );
    for agent in shipwright_engine::conductor::default_agents(&Config::default(), telemetry.clone())
    {
        orch.register_agent(agent).await.unwrap();
    }
    // Replaces the random reviewer with one that scores everything zero
    let replaced = orch
        .register_agent(Arc::new(Reviewer::new(
            Arc::new(FixedSignals::uniform(0.0)),
            telemetry,
        )))
        .await
        .unwrap();
    assert!(replaced);

    let project = orch.create_project("Sync", "automation", "").await.unwrap();
    orch.start_project(&project.id).await.unwrap();
    orch.generate_execution_plan(&project.id).await.unwrap();

    let report = orch.execute_project_plan(&project.id).await.unwrap();
    assert_eq!(report.project_status, ProjectStatus::Failed);

    // Two-check step types bottom out at exactly the pass mark
    let analysis = report.plan.step_by_template("analyze_requirements").unwrap();
    assert_eq!(analysis.status, StepStatus::Completed);
    assert_eq!(analysis.metadata["review_score"], 80);

    let implement = report.plan.step_by_template("implement_automation").unwrap();
    assert_eq!(implement.status, StepStatus::Failed);
    assert!(implement
        .error
        .as_deref()
        .unwrap()
        .starts_with("review failed with score 70"));
    assert_eq!(report.reviews.iter().filter(|r| !r.passed).count(), 1);
}

#[tokio::test]
async fn test_question_session_feeds_plan() {
    let orch = default_orchestrator().await;
    let project = orch.create_project("Shop", "website", "").await.unwrap();

    let mut session = orch.start_question_session(&project.id).await.unwrap();
    assert!(!session.is_ready());
    session.answer("website_cms", true).unwrap();
    session.answer("website_analytics", false).unwrap();
    session.answer("website_complexity", "high").unwrap();
    session.complete().unwrap();

    let updated = orch.apply_question_session(&project.id, &session).await.unwrap();
    assert!(updated.requirements.is_enabled("cms"));
    assert!(!updated.requirements.is_enabled("analytics"));

    let plan = orch.generate_execution_plan(&project.id).await.unwrap();
    assert!(plan.step_by_template("setup_cms").is_some());
    assert!(plan.step_by_template("setup_analytics").is_none());
    // High complexity scales every estimate by 1.5
    assert_eq!(plan.step_by_template("setup_repo").unwrap().estimated_duration, 45);
}

#[tokio::test]
async fn test_incomplete_session_rejected() {
    let orch = default_orchestrator().await;
    let project = orch.create_project("Shop", "website", "").await.unwrap();
    let session = orch.start_question_session(&project.id).await.unwrap();

    assert!(matches!(
        orch.apply_question_session(&project.id, &session).await,
        Err(EngineError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_health_is_stable_without_mutation() {
    let orch = default_orchestrator().await;
    let first = orch.create_project("Shop", "website", "").await.unwrap();
    orch.create_project("Sync", "automation", "").await.unwrap();
    orch.generate_execution_plan(&first.id).await.unwrap();
    orch.generate_execution_plan(&first.id).await.unwrap();

    let a = orch.get_system_health().await;
    let b = orch.get_system_health().await;
    assert_eq!(a, b);
    assert_eq!(
        a,
        SystemHealth {
            status: SystemStatus::Healthy,
            agents: 5,
            projects: 2,
            plans: 2,
        }
    );
}
