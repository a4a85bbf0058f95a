//! End-to-end tests for the orchestrator.
//!
//! Covers:
//! - Dependency-ordered execution of a decomposed goal
//! - One task at a time per role
//! - Fallback decomposition
//! - Rapid-change detection through the monitor loop
//! - Shutdown while a task is running
//! - Workflow halting and persistence across restarts
//! - Queued events surviving a monitor stop
//! - Command timeouts and the dispatch decision history

use async_trait::async_trait;
use hurricane_core::{
    AgentRole, DecisionKind, FileEvent, FileEventKind, GoalRequest, GoalStatus, HurricaneConfig, NotificationKind,
    StateStore, Task, TaskBoard, TaskStatus, WorkflowStatus, WorkflowStep,
};
use hurricane_models::MockModel;
use hurricane_orchestrator::{
    CommandStrategy, ExecutionError, ExecutionStrategy, OrchestrationError, Orchestrator, StrategyRegistry,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{Semaphore, mpsc};

const WAIT: Duration = Duration::from_secs(5);

/// Strategy that holds every run until the test releases it.
struct GatedStrategy {
    started: mpsc::UnboundedSender<String>,
    gate: Semaphore,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl GatedStrategy {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (started, rx) = mpsc::unbounded_channel();
        let strategy = Self {
            started,
            gate: Semaphore::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        (Arc::new(strategy), rx)
    }

    fn release(&self, runs: usize) {
        self.gate.add_permits(runs);
    }
}

#[async_trait]
impl ExecutionStrategy for GatedStrategy {
    async fn execute(&self, task: &Task) -> Result<Value, ExecutionError> {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        let _ = self.started.send(task.id.clone());

        let permit = self.gate.acquire().await.map_err(|e| ExecutionError::Failed(e.to_string()))?;
        permit.forget();
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({ "done": task.title }))
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// Strategy whose every run fails.
struct FailingStrategy;

#[async_trait]
impl ExecutionStrategy for FailingStrategy {
    async fn execute(&self, _task: &Task) -> Result<Value, ExecutionError> {
        Err(ExecutionError::Failed("tests did not compile".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Strategy that fails its first run and completes every later one.
#[derive(Default)]
struct FailFirstStrategy {
    calls: AtomicUsize,
}

#[async_trait]
impl ExecutionStrategy for FailFirstStrategy {
    async fn execute(&self, task: &Task) -> Result<Value, ExecutionError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(ExecutionError::Failed("build broke".to_string()));
        }
        Ok(json!({ "done": task.title }))
    }

    fn name(&self) -> &str {
        "fail-first"
    }
}

fn test_config() -> HurricaneConfig {
    let mut config = HurricaneConfig::default();
    config.scheduler.tick_ms = 20;
    config
}

async fn open(
    root: &Path,
    model: Arc<MockModel>,
    strategies: StrategyRegistry,
    state_dir: &Path,
) -> Orchestrator {
    Orchestrator::with_parts(root, test_config(), model, strategies, StateStore::open(state_dir))
        .await
        .unwrap()
}

async fn wait_for_board(orchestrator: &Orchestrator, condition: impl Fn(&TaskBoard) -> bool) {
    tokio::time::timeout(WAIT, async {
        while !orchestrator.scheduler().read(&condition).await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("board condition not reached in time");
}

async fn assert_invariants(orchestrator: &Orchestrator) {
    let checked = orchestrator.scheduler().read(TaskBoard::check_invariants).await;
    assert_eq!(checked, Ok(()));
}

#[tokio::test]
async fn test_chain_completes_in_dependency_order() {
    let root = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let breakdown = r#"```json
[
  {"id": 1, "title": "Design schema", "role": "coder", "autonomous": true},
  {"id": 2, "title": "Implement endpoints", "role": "coder", "dependencies": [1], "autonomous": true},
  {"id": 3, "title": "Write endpoint tests", "role": "tester", "dependencies": [2], "autonomous": true}
]
```"#;
    let model = Arc::new(MockModel::with_responses("mock", [breakdown]));
    let strategies =
        StrategyRegistry::with_defaults(model.clone(), root.path(), Duration::from_secs(5));
    let orchestrator = open(root.path(), model.clone(), strategies, state.path()).await;

    let goal_id = orchestrator
        .submit_goal(GoalRequest::new("User API", "CRUD endpoints for users", "Endpoints pass tests"))
        .await
        .unwrap();

    let goal = goal_id.clone();
    wait_for_board(&orchestrator, move |board| {
        board.goal(&goal).is_some_and(|g| g.status == GoalStatus::Completed)
    })
    .await;

    let tasks = orchestrator.get_tasks_for_goal(&goal_id).await;
    assert_eq!(tasks.len(), 3);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
    for pair in tasks.windows(2) {
        let (first, second) = (&pair[0], &pair[1]);
        assert_eq!(second.dependencies, vec![first.id.clone()]);
        assert!(first.completed_at.unwrap() <= second.started_at.unwrap());
    }
    assert_eq!(tasks[0].output.as_ref().unwrap()["task_type"], "coder");

    let goal = orchestrator.get_goal(&goal_id).await.unwrap();
    assert!((goal.progress - 100.0).abs() < f64::EPSILON);
    // One decomposition call plus one per task
    assert_eq!(model.call_count(), 4);
    assert_invariants(&orchestrator).await;
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_same_role_tasks_run_one_at_a_time() {
    let root = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let (gated, mut started) = GatedStrategy::new();
    let mut strategies = StrategyRegistry::new();
    strategies.register(AgentRole::Coder, gated.clone());
    let orchestrator = open(root.path(), Arc::new(MockModel::new("mock")), strategies, state.path()).await;

    let first = Task::new("Parse config", "", AgentRole::Coder).autonomous(true);
    let second = Task::new("Validate config", "", AgentRole::Coder).autonomous(true);
    let (first, second) =
        tokio::join!(orchestrator.create_task(first), orchestrator.create_task(second));
    let ids = [first.unwrap(), second.unwrap()];

    let running = tokio::time::timeout(WAIT, started.recv()).await.unwrap().unwrap();
    let waiting = ids.iter().find(|id| **id != running).unwrap().clone();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(orchestrator.get_task(&waiting).await.unwrap().status, TaskStatus::Planned);
    assert_eq!(orchestrator.get_task(&running).await.unwrap().status, TaskStatus::InProgress);
    assert_invariants(&orchestrator).await;

    gated.release(1);
    let next = tokio::time::timeout(WAIT, started.recv()).await.unwrap().unwrap();
    assert_eq!(next, waiting);
    assert_eq!(orchestrator.get_task(&running).await.unwrap().status, TaskStatus::Completed);

    gated.release(1);
    wait_for_board(&orchestrator, |board| {
        board.tasks().values().all(|t| t.status == TaskStatus::Completed)
    })
    .await;

    assert_eq!(gated.peak.load(Ordering::SeqCst), 1);
    let status = orchestrator.status().await;
    let coder = status.workers.iter().find(|w| w.role == AgentRole::Coder).unwrap();
    assert_eq!(coder.metrics.tasks_completed, 2);
    assert!(coder.current_task.is_none());
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unparseable_breakdown_yields_fallback_task() {
    let root = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let model = Arc::new(MockModel::with_responses("mock", ["Sure! Here is what I would do first..."]));
    let orchestrator = open(root.path(), model, StrategyRegistry::new(), state.path()).await;

    let goal_id = orchestrator
        .submit_goal(GoalRequest::new("Ship docs", "Write the user guide", "Guide published"))
        .await
        .unwrap();

    let tasks = orchestrator.get_tasks_for_goal(&goal_id).await;
    assert_eq!(tasks.len(), 1);
    let fallback = &tasks[0];
    assert!(!fallback.autonomous);
    assert_eq!(fallback.status, TaskStatus::Planned);
    assert_eq!(fallback.context.get("fallback"), Some(&Value::Bool(true)));
    assert_eq!(fallback.title, "Work on: Ship docs");

    let suggested = orchestrator.get_next_ready_task().await.unwrap();
    assert_eq!(suggested.id, fallback.id);
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_goal_is_rejected() {
    let root = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let model = Arc::new(MockModel::new("mock"));
    let orchestrator = open(root.path(), model.clone(), StrategyRegistry::new(), state.path()).await;

    let result = orchestrator.submit_goal(GoalRequest::new("  ", "description", "outcome")).await;
    assert!(result.is_err());
    assert!(orchestrator.get_active_goals().await.is_empty());
    assert_eq!(model.call_count(), 0);
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rapid_changes_reported_once() {
    let root = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let orchestrator =
        open(root.path(), Arc::new(MockModel::new("mock")), StrategyRegistry::new(), state.path()).await;
    orchestrator.start_monitoring().await.unwrap();
    // Starting twice is harmless
    orchestrator.start_monitoring().await.unwrap();

    for _ in 0..6 {
        assert!(orchestrator.emit_file_event(FileEvent::new(FileEventKind::Modified, "src/main.rs")).await);
    }
    assert!(!orchestrator.emit_file_event(FileEvent::new(FileEventKind::Modified, ".git/index")).await);

    let rapid = tokio::time::timeout(WAIT, async {
        loop {
            let rapid: Vec<_> = orchestrator
                .get_unacknowledged_notifications()
                .await
                .into_iter()
                .filter(|n| n.kind == NotificationKind::RapidChanges)
                .collect();
            if !rapid.is_empty() {
                return rapid;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(rapid.len(), 1);
    assert!(rapid[0].message.contains("src/main.rs"));

    assert!(orchestrator.acknowledge_notification(&rapid[0].id).await);
    assert!(orchestrator.acknowledge_notification(&rapid[0].id).await);
    assert!(!orchestrator.acknowledge_notification("missing").await);

    orchestrator.stop_monitoring().await.unwrap();
    orchestrator.stop_monitoring().await.unwrap();
    assert!(!orchestrator.emit_file_event(FileEvent::new(FileEventKind::Modified, "a.py")).await);
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_lets_running_task_finish() {
    let root = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let (gated, mut started) = GatedStrategy::new();
    let mut strategies = StrategyRegistry::new();
    strategies.register(AgentRole::Coder, gated.clone());
    let orchestrator = open(root.path(), Arc::new(MockModel::new("mock")), strategies, state.path()).await;
    orchestrator.start_monitoring().await.unwrap();

    let task_id = orchestrator
        .create_task(Task::new("Long refactor", "", AgentRole::Coder).autonomous(true))
        .await
        .unwrap();
    tokio::time::timeout(WAIT, started.recv()).await.unwrap().unwrap();

    let release = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        gated.release(1);
    };
    let (stopped, ()) = tokio::join!(orchestrator.shutdown(), release);
    stopped.unwrap();

    assert!(!orchestrator.is_monitoring().await);
    assert!(orchestrator.scheduler().is_closed());
    assert!(matches!(
        orchestrator.execute_task(&task_id).await,
        Err(OrchestrationError::SchedulerStopped)
    ));

    let persisted = StateStore::open(state.path()).load_board();
    let task = persisted.task(&task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.output, Some(json!({ "done": "Long refactor" })));
}

#[tokio::test]
async fn test_workflow_halts_after_failure() {
    let root = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let (gated, _started) = GatedStrategy::new();
    gated.release(10);
    let mut strategies = StrategyRegistry::new();
    strategies.register(AgentRole::Coder, gated);
    strategies.register(AgentRole::Tester, Arc::new(FailingStrategy));
    let orchestrator = open(root.path(), Arc::new(MockModel::new("mock")), strategies, state.path()).await;

    let steps = vec![
        WorkflowStep::new("Implement parser", AgentRole::Coder),
        WorkflowStep::new("Test parser", AgentRole::Tester).after(&[0]),
        WorkflowStep::new("Document parser", AgentRole::Coder).after(&[1]),
    ];
    let workflow_id = orchestrator.create_workflow("parser", steps).await.unwrap();
    let report = orchestrator.execute_workflow(&workflow_id).await.unwrap();

    assert_eq!(report.status, WorkflowStatus::Failed);
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.cancelled.len(), 1);

    let workflow = orchestrator.get_workflow(&workflow_id).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Failed);

    let failures: Vec<_> = orchestrator
        .get_unacknowledged_notifications()
        .await
        .into_iter()
        .filter(|n| n.kind == NotificationKind::TaskFailed)
        .collect();
    assert_eq!(failures.len(), 1);
    assert_invariants(&orchestrator).await;
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_state_survives_restart() {
    let root = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let model = Arc::new(MockModel::with_responses("mock", ["not json"]));
    let orchestrator = open(root.path(), model, StrategyRegistry::new(), state.path()).await;
    let goal_id = orchestrator
        .submit_goal(GoalRequest::new("Cache layer", "Add a read-through cache", "Latency halves"))
        .await
        .unwrap();
    let manual = orchestrator
        .create_task(Task::new("Benchmark cache", "", AgentRole::Tester))
        .await
        .unwrap();
    orchestrator.cancel_task(&manual).await.unwrap();
    orchestrator.shutdown().await.unwrap();

    let reopened =
        open(root.path(), Arc::new(MockModel::new("mock")), StrategyRegistry::new(), state.path()).await;
    let goal = reopened.get_goal(&goal_id).await.unwrap();
    assert_eq!(goal.status, GoalStatus::Active);
    assert_eq!(reopened.get_tasks_for_goal(&goal_id).await.len(), 1);
    assert_eq!(reopened.get_task(&manual).await.unwrap().status, TaskStatus::Cancelled);

    let status = reopened.status().await;
    assert_eq!(status.goals["active"], 1);
    assert_eq!(status.tasks["cancelled"], 1);
    assert!(!status.monitoring);
    reopened.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_workflow_failure_cancels_independent_steps() {
    let root = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let strategy = Arc::new(FailFirstStrategy::default());
    let mut strategies = StrategyRegistry::new();
    strategies.register(AgentRole::Coder, strategy.clone());
    let orchestrator = open(root.path(), Arc::new(MockModel::new("mock")), strategies, state.path()).await;

    let steps = vec![
        WorkflowStep::new("Port lexer", AgentRole::Coder),
        WorkflowStep::new("Port printer", AgentRole::Coder),
    ];
    let workflow_id = orchestrator.create_workflow("port", steps).await.unwrap();
    let report = orchestrator.execute_workflow(&workflow_id).await.unwrap();

    assert_eq!(report.status, WorkflowStatus::Failed);
    assert!(report.completed.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.cancelled.len(), 1);
    assert_eq!(strategy.calls.load(Ordering::SeqCst), 1);

    let skipped = orchestrator.get_task(&report.cancelled[0]).await.unwrap();
    assert_eq!(skipped.status, TaskStatus::Cancelled);
    assert!(skipped.started_at.is_none());
    assert_invariants(&orchestrator).await;
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_processes_queued_events() {
    let root = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let orchestrator =
        open(root.path(), Arc::new(MockModel::new("mock")), StrategyRegistry::new(), state.path()).await;
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    orchestrator
        .register_event_callback(
            FileEventKind::Created,
            Box::new(move |_: &FileEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await;
    orchestrator.start_monitoring().await.unwrap();

    for i in 0..6 {
        let event = FileEvent::new(FileEventKind::Created, format!("notes/{}.txt", i));
        assert!(orchestrator.emit_file_event(event).await);
    }
    orchestrator.stop_monitoring().await.unwrap();

    assert_eq!(created.load(Ordering::SeqCst), 6);
    assert_eq!(orchestrator.recent_events(1).await.len(), 6);
    orchestrator.shutdown().await.unwrap();

    let (events, _) = StateStore::open(state.path()).load_logs(100, 100);
    assert_eq!(events.len(), 6);
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_timeout_blocks_task() {
    let root = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let mut strategies = StrategyRegistry::new();
    strategies.register(
        AgentRole::Deployer,
        Arc::new(CommandStrategy::new(root.path(), Duration::from_millis(200))),
    );
    let orchestrator = open(root.path(), Arc::new(MockModel::new("mock")), strategies, state.path()).await;

    let task = Task::new("Slow deploy", "", AgentRole::Deployer).with_context("command", json!(["sleep", "5"]));
    let task_id = orchestrator.create_task(task).await.unwrap();
    let outcome = tokio::time::timeout(WAIT, orchestrator.execute_task(&task_id)).await.unwrap().unwrap();

    assert_eq!(outcome.status, TaskStatus::Blocked);
    assert!(outcome.error.unwrap().contains("timed out after 200ms"));
    let status = orchestrator.status().await;
    let deployer = status.workers.iter().find(|w| w.role == AgentRole::Deployer).unwrap();
    assert!(deployer.current_task.is_none());

    // Blocked work can be requeued
    orchestrator.requeue_task(&task_id).await.unwrap();
    assert_eq!(orchestrator.get_task(&task_id).await.unwrap().status, TaskStatus::Planned);
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dispatch_decisions_are_recorded() {
    let root = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let (gated, _started) = GatedStrategy::new();
    gated.release(10);
    let mut strategies = StrategyRegistry::new();
    strategies.register(AgentRole::Coder, gated);
    let orchestrator = open(root.path(), Arc::new(MockModel::new("mock")), strategies, state.path()).await;

    let autonomous = orchestrator
        .create_task(Task::new("Format sources", "", AgentRole::Coder).autonomous(true))
        .await
        .unwrap();
    let id = autonomous.clone();
    wait_for_board(&orchestrator, move |board| {
        board.task(&id).is_some_and(|t| t.status == TaskStatus::Completed)
    })
    .await;
    let manual = orchestrator
        .create_task(Task::new("Bump version", "", AgentRole::Coder))
        .await
        .unwrap();
    orchestrator.execute_task(&manual).await.unwrap();

    let decisions = orchestrator.get_decisions(10).await;
    let recorded: Vec<_> = decisions.iter().map(|d| (d.task_id.clone(), d.kind)).collect();
    assert_eq!(
        recorded,
        vec![
            (autonomous, DecisionKind::AutonomousExecution),
            (manual, DecisionKind::RequestedExecution),
        ]
    );
    assert_eq!(decisions[0].context["strategy"], "gated");
    orchestrator.shutdown().await.unwrap();

    let persisted = StateStore::open(state.path()).load_decisions(10);
    assert_eq!(persisted.len(), 2);
}
