//! Integration tests for plan execution: parallel scheduling, stopping,
//! shutdown, panicking workers and the observable side channels (message
//! bus and project logs).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

use sdk::agent::{names, Agent, ExecutionAgent};
use sdk::errors::EngineError;
use sdk::reports::StepResult;
use sdk::requirements::Requirements;
use sdk::types::{ExecutionStep, PlanStatus, ProjectStatus, StepStatus};
use shipwright_engine::conductor::{FixedSignals, Planner, Reviewer, TemplateStore, Validator};
use shipwright_engine::config::{Config, OrchestratorConfig};
use shipwright_engine::message_bus::{Event, EventType, MessageBus};
use shipwright_engine::telemetry::{MemorySink, Outcome, TelemetrySink};
use shipwright_engine::Orchestrator;

/// Executor that tracks how many steps run at once
#[derive(Default)]
struct ConcurrencyTracker {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Agent for ConcurrencyTracker {
    fn name(&self) -> &str {
        names::EXECUTOR
    }

    fn description(&self) -> &str {
        "records peak concurrency"
    }

    fn version(&self) -> &str {
        "test"
    }

    fn as_executor(&self) -> Option<&dyn ExecutionAgent> {
        Some(self)
    }
}

#[async_trait]
impl ExecutionAgent for ConcurrencyTracker {
    async fn execute_step(&self, step: &ExecutionStep, _project_id: &str) -> StepResult {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        StepResult::succeeded(step.id.clone(), vec![], 20)
    }
}

/// Executor that parks on one template until released
struct GatedExecutor {
    gate: &'static str,
    reached: Mutex<Option<oneshot::Sender<()>>>,
    release: Arc<Notify>,
}

impl Agent for GatedExecutor {
    fn name(&self) -> &str {
        names::EXECUTOR
    }

    fn description(&self) -> &str {
        "blocks on one step"
    }

    fn version(&self) -> &str {
        "test"
    }

    fn as_executor(&self) -> Option<&dyn ExecutionAgent> {
        Some(self)
    }
}

#[async_trait]
impl ExecutionAgent for GatedExecutor {
    async fn execute_step(&self, step: &ExecutionStep, _project_id: &str) -> StepResult {
        if step.template_id == self.gate {
            let reached = self.reached.lock().unwrap().take();
            if let Some(tx) = reached {
                tx.send(()).ok();
            }
            self.release.notified().await;
        }
        StepResult::succeeded(step.id.clone(), vec![], 0)
    }
}

/// Executor that panics on one template
struct PanickingExecutor {
    victim: &'static str,
}

impl Agent for PanickingExecutor {
    fn name(&self) -> &str {
        names::EXECUTOR
    }

    fn description(&self) -> &str {
        "panics on one step"
    }

    fn version(&self) -> &str {
        "test"
    }

    fn as_executor(&self) -> Option<&dyn ExecutionAgent> {
        Some(self)
    }
}

#[async_trait]
impl ExecutionAgent for PanickingExecutor {
    async fn execute_step(&self, step: &ExecutionStep, _project_id: &str) -> StepResult {
        if step.template_id == self.victim {
            panic!("worker crashed on {}", step.id);
        }
        StepResult::succeeded(step.id.clone(), vec![], 0)
    }
}

struct Harness {
    orch: Arc<Orchestrator>,
    telemetry: Arc<MemorySink>,
}

async fn harness(parallel: usize, executor: Arc<dyn Agent>) -> Harness {
    let telemetry = Arc::new(MemorySink::default());
    let sink: Arc<dyn TelemetrySink> = telemetry.clone();
    let config = OrchestratorConfig {
        max_parallel_steps: parallel,
        ..OrchestratorConfig::default()
    };
    let orch = Orchestrator::new(config, sink.clone(), Arc::new(MessageBus::new()));
    orch.register_agent(Arc::new(Planner::new(
        Arc::new(TemplateStore::builtin()),
        sink.clone(),
    )))
    .await
    .unwrap();
    orch.register_agent(executor).await.unwrap();
    orch.register_agent(Arc::new(Reviewer::new(
        Arc::new(FixedSignals::uniform(1.0)),
        sink.clone(),
    )))
    .await
    .unwrap();
    orch.register_agent(Arc::new(Validator::new(sink))).await.unwrap();
    Harness {
        orch: Arc::new(orch),
        telemetry,
    }
}

/// Create, start and plan a website project with both optional steps
async fn planned_website(orch: &Orchestrator) -> String {
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
    project.id
}

#[tokio::test]
async fn test_sequential_by_default() {
    let tracker = Arc::new(ConcurrencyTracker::default());
    let h = harness(1, tracker.clone()).await;
    let id = planned_website(&h.orch).await;

    let report = h.orch.execute_project_plan(&id).await.unwrap();
    assert_eq!(report.project_status, ProjectStatus::Completed);
    assert_eq!(tracker.peak.load(Ordering::SeqCst), 1);

    // Strictly sequential execution follows step order
    let finished: Vec<u32> = report
        .step_results
        .iter()
        .map(|r| report.plan.step(&r.step_id).unwrap().order)
        .collect();
    let mut sorted = finished.clone();
    sorted.sort_unstable();
    assert_eq!(finished, sorted);
}

#[tokio::test]
async fn test_parallel_respects_limit_and_dependencies() {
    let tracker = Arc::new(ConcurrencyTracker::default());
    let h = harness(3, tracker.clone()).await;
    let id = planned_website(&h.orch).await;

    let bus = h.orch.bus();
    let mut events = bus.subscribe(EventType::All).await;

    let report = h.orch.execute_project_plan(&id).await.unwrap();
    assert_eq!(report.project_status, ProjectStatus::Completed);

    // setup_cms runs beside create_backend, setup_analytics beside write_tests
    let peak = tracker.peak.load(Ordering::SeqCst);
    assert!((2..=3).contains(&peak), "peak concurrency {}", peak);

    let mut finished: HashMap<String, usize> = HashMap::new();
    let mut started: HashMap<String, usize> = HashMap::new();
    let mut seq = 0;
    while let Ok(event) = events.try_recv() {
        seq += 1;
        match event {
            Event::StepStarted { step_id, .. } => {
                started.insert(step_id, seq);
            }
            Event::StepFinished { step_id, .. } => {
                finished.insert(step_id, seq);
            }
            _ => {}
        }
    }
    assert_eq!(started.len(), report.plan.steps.len());
    for step in &report.plan.steps {
        for dep in &step.dependencies {
            assert!(
                finished[dep] < started[&step.id],
                "{} started before {} finished",
                step.id,
                dep
            );
        }
    }
}

#[tokio::test]
async fn test_stop_halts_scheduling() {
    let (tx, reached) = oneshot::channel();
    let release = Arc::new(Notify::new());
    let executor = Arc::new(GatedExecutor {
        gate: "setup_database",
        reached: Mutex::new(Some(tx)),
        release: release.clone(),
    });
    let h = harness(1, executor).await;
    let id = planned_website(&h.orch).await;

    let orch = h.orch.clone();
    let run_id = id.clone();
    let run = tokio::spawn(async move { orch.execute_project_plan(&run_id).await });

    reached.await.unwrap();
    assert_eq!(
        h.orch.get_project(&id).await.unwrap().status,
        ProjectStatus::Executing
    );
    // Executing projects cannot be edited or deleted
    assert!(matches!(
        h.orch.delete_project(&id).await,
        Err(EngineError::InvalidTransition { .. })
    ));

    h.orch.stop_project(&id).await.unwrap();
    release.notify_one();

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.project_status, ProjectStatus::Stopped);
    assert_eq!(report.plan_status, PlanStatus::Failed);

    // The in-flight step finishes, nothing after it starts
    let plan = &report.plan;
    assert_eq!(
        plan.step_by_template("setup_database").unwrap().status,
        StepStatus::Completed
    );
    assert_eq!(
        plan.step_by_template("create_backend").unwrap().status,
        StepStatus::Pending
    );

    // A stopped project can be replanned and restarted
    h.orch.generate_execution_plan(&id).await.unwrap();
    h.orch.start_project(&id).await.unwrap();
    release.notify_one();
    let rerun = h.orch.execute_project_plan(&id).await.unwrap();
    assert_eq!(rerun.project_status, ProjectStatus::Completed);
    assert_ne!(rerun.plan_id, report.plan_id);
}

#[tokio::test]
async fn test_shutdown_during_execution() {
    let (tx, reached) = oneshot::channel();
    let release = Arc::new(Notify::new());
    let executor = Arc::new(GatedExecutor {
        gate: "setup_repo",
        reached: Mutex::new(Some(tx)),
        release: release.clone(),
    });
    let h = harness(1, executor).await;
    let id = planned_website(&h.orch).await;

    let orch = h.orch.clone();
    let run_id = id.clone();
    let run = tokio::spawn(async move { orch.execute_project_plan(&run_id).await });

    reached.await.unwrap();
    h.orch.shutdown().await;
    release.notify_one();

    assert!(matches!(run.await.unwrap(), Err(EngineError::ShutDown)));

    let health = h.orch.get_system_health().await;
    assert_eq!(health.projects, 0);
    assert_eq!(health.agents, 0);
    assert!(matches!(
        h.orch.create_project("late", "website", "").await,
        Err(EngineError::ShutDown)
    ));
    assert!(matches!(
        h.orch.generate_execution_plan(&id).await,
        Err(EngineError::ShutDown)
    ));

    // Idempotent
    h.orch.shutdown().await;
    assert!(h.orch.is_shut_down());
}

#[tokio::test]
async fn test_panicking_worker_fails_only_its_step() {
    let h = harness(1, Arc::new(PanickingExecutor { victim: "write_tests" })).await;
    let id = planned_website(&h.orch).await;

    let report = h.orch.execute_project_plan(&id).await.unwrap();
    assert_eq!(report.project_status, ProjectStatus::Failed);

    let plan = &report.plan;
    let crashed = plan.step_by_template("write_tests").unwrap();
    assert_eq!(crashed.status, StepStatus::Failed);
    assert!(crashed.error.as_deref().unwrap().contains("aborted"));
    assert_eq!(
        plan.step_by_template("deploy_site").unwrap().status,
        StepStatus::Skipped
    );
    // Siblings outside the failed branch still ran
    assert_eq!(
        plan.step_by_template("setup_analytics").unwrap().status,
        StepStatus::Completed
    );

    // The orchestrator is still usable
    assert!(h.orch.create_project("next", "automation", "").await.is_ok());
}

#[tokio::test]
async fn test_execute_twice_rejected() {
    let h = harness(1, Arc::new(ConcurrencyTracker::default())).await;
    let id = planned_website(&h.orch).await;

    h.orch.execute_project_plan(&id).await.unwrap();
    assert!(matches!(
        h.orch.execute_project_plan(&id).await,
        Err(EngineError::InvalidTransition { .. })
    ));
    // Completed projects are terminal
    assert!(h.orch.start_project(&id).await.is_err());
    assert!(h.orch.generate_execution_plan(&id).await.is_err());
}

#[tokio::test]
async fn test_missing_executor_is_unavailable() {
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(MemorySink::default());
    let orch = Orchestrator::new(
        OrchestratorConfig::default(),
        telemetry.clone(),
        Arc::new(MessageBus::new()),
    );
    orch.register_agent(Arc::new(Planner::new(
        Arc::new(TemplateStore::builtin()),
        telemetry,
    )))
    .await
    .unwrap();
    let project = orch.create_project("Site", "website", "").await.unwrap();
    orch.start_project(&project.id).await.unwrap();
    orch.generate_execution_plan(&project.id).await.unwrap();

    let err = orch.execute_project_plan(&project.id).await.unwrap_err();
    assert!(matches!(err, EngineError::AgentUnavailable(ref name) if name == "executor"));
    // Nothing moved
    assert_eq!(
        orch.get_project(&project.id).await.unwrap().status,
        ProjectStatus::Active
    );
}

#[tokio::test]
async fn test_project_logs() {
    let h = harness(1, Arc::new(ConcurrencyTracker::default())).await;
    let id = planned_website(&h.orch).await;
    h.orch.execute_project_plan(&id).await.unwrap();

    let all = h.orch.get_project_logs(&id, Some(1000)).await.unwrap();
    assert!(all.iter().all(|e| e.project_id.as_deref() == Some(id.as_str())));
    assert_eq!(all[0].action, "project_created");
    assert!(all.iter().any(|e| e.action == "plan_created"));
    assert!(all.iter().any(|e| e.action == "step_reviewed"));
    assert_eq!(
        all.iter().filter(|e| e.action == "step_completed").count(),
        8
    );

    let last = all.last().unwrap();
    assert_eq!(last.action, "project_validated");
    assert_eq!(last.outcome, Outcome::Success);

    let recent = h.orch.get_project_logs(&id, Some(3)).await.unwrap();
    assert_eq!(recent.len(), 3);
    assert_eq!(recent.last(), all.last());

    // Default limit comes from config
    let default = h.orch.get_project_logs(&id, None).await.unwrap();
    assert_eq!(default.len(), all.len().min(50));

    assert!(matches!(
        h.orch.get_project_logs("missing", None).await,
        Err(EngineError::ProjectNotFound(_))
    ));
    assert!(!h.telemetry.is_empty());
}

#[tokio::test]
async fn test_lifecycle_events_published() {
    let h = harness(1, Arc::new(ConcurrencyTracker::default())).await;
    let mut status_events = h.orch.bus().subscribe(EventType::ProjectStatusChanged).await;

    let id = planned_website(&h.orch).await;
    h.orch.execute_project_plan(&id).await.unwrap();

    let mut transitions = Vec::new();
    while let Ok(Event::ProjectStatusChanged { from, to, .. }) = status_events.try_recv() {
        transitions.push((from, to));
    }
    assert_eq!(
        transitions,
        vec![
            (ProjectStatus::Planning, ProjectStatus::Active),
            (ProjectStatus::Active, ProjectStatus::Executing),
            (ProjectStatus::Executing, ProjectStatus::Completed),
        ]
    );
}

#[tokio::test]
async fn test_default_config_orchestrator_runs() {
    let orch =
        Orchestrator::with_default_agents(&Config::default(), Arc::new(MemorySink::default()))
            .await;
    let project = orch.create_project("Sync", "automation", "").await.unwrap();
    orch.start_project(&project.id).await.unwrap();
    orch.generate_execution_plan(&project.id).await.unwrap();

    // Random signals never dip below the pass mark with the default floor
    let report = orch.execute_project_plan(&project.id).await.unwrap();
    assert_eq!(report.project_status, ProjectStatus::Completed);
    assert!(report.reviews.iter().all(|r| r.passed));
}
