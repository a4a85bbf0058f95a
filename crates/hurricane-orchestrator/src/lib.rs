//! Hurricane orchestrator.
//!
//! Ties the core crate together: goals are decomposed by the planner, tasks
//! run through the scheduler's control loop on per-role strategies, and the
//! monitor loop turns file activity into notifications.
//!
//! # Example
//!
//! ```rust,no_run
//! use hurricane_core::{GoalRequest, HurricaneConfig, Priority};
//! use hurricane_orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> hurricane_orchestrator::Result<()> {
//!     let orchestrator = Orchestrator::open(".", HurricaneConfig::default()).await?;
//!     let request = GoalRequest::new("Add login", "Password login for the API", "Users can log in")
//!         .with_priority(Priority::High);
//!     let goal_id = orchestrator.submit_goal(request).await?;
//!     println!("submitted {goal_id}");
//!     orchestrator.shutdown().await
//! }
//! ```

pub mod error;
pub mod monitor;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod strategy;
pub mod workflow;

use hurricane_abstraction::{Model, ModelParameters};
use hurricane_core::{
    AgentRole, CoreError, Decision, EventCallback, FileEvent, FileEventKind, Goal, GoalRequest, GoalStatus, HurricaneConfig, Notification,
    NotificationEngine, Planner, StateStore, Task, Workflow, WorkflowStep, WorkerMetrics,
    suggest_next,
};
use hurricane_models::{ModelConfig, ModelFactory, ModelType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub use error::{OrchestrationError, Result};
pub use monitor::MonitorHandle;
pub use queue::ReadyQueue;
pub use registry::StrategyRegistry;
pub use scheduler::{Scheduler, SchedulerHandle, TaskOutcome};
pub use strategy::{CommandStrategy, ExecutionError, ExecutionStrategy, ModelStrategy, RoutedStrategy};
pub use workflow::WorkflowReport;

/// One worker's state in a [`StatusSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    /// Worker role.
    pub role: AgentRole,
    /// Display name.
    pub name: String,
    /// Whether the worker accepts tasks.
    pub active: bool,
    /// Task currently held.
    pub current_task: Option<String>,
    /// Run statistics.
    pub metrics: WorkerMetrics,
}

/// Point-in-time summary of the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Goal count per status.
    pub goals: BTreeMap<String, usize>,
    /// Task count per status.
    pub tasks: BTreeMap<String, usize>,
    /// Worker states, in role order.
    pub workers: Vec<WorkerStatus>,
    /// Notifications awaiting acknowledgement.
    pub unacknowledged_notifications: usize,
    /// Whether the monitor loop is running.
    pub monitoring: bool,
}

/// Public entry point for goals, tasks, workflows and monitoring.
pub struct Orchestrator {
    root: PathBuf,
    config: HurricaneConfig,
    planner: Planner,
    scheduler: SchedulerHandle,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
    engine: Arc<Mutex<NotificationEngine>>,
    store: Arc<StateStore>,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("root", &self.root)
            .field("planner", &self.planner)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Opens the project at `root`: builds the configured model, loads the
    /// persisted state and starts the scheduler.
    ///
    /// # Errors
    /// Returns an error if the model provider is unknown or the model client
    /// cannot be created.
    pub async fn open(root: impl AsRef<Path>, config: HurricaneConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let model_type = ModelType::from_str(&config.model.provider).map_err(|()| {
            hurricane_abstraction::ModelError::UnsupportedModelProvider(config.model.provider.clone())
        })?;
        let model = ModelFactory::create(
            ModelConfig::new(model_type, config.model.model.clone())
                .with_base_url(config.model.host.clone())
                .with_timeout(config.model.timeout_secs),
        )?;
        let store = StateStore::open(config.storage.resolve(&root));
        let strategies = StrategyRegistry::with_defaults(
            Arc::clone(&model),
            &root,
            std::time::Duration::from_secs(config.scheduler.command_timeout_secs),
        );
        Self::with_parts(root, config, model, strategies, store).await
    }

    /// Assembles an orchestrator from explicit parts.
    ///
    /// # Arguments
    /// * `root` - Project root watched by the monitor
    /// * `config` - Settings
    /// * `model` - Model used for goal decomposition
    /// * `strategies` - Execution strategy per role
    /// * `store` - Persistence for board and logs
    pub async fn with_parts(
        root: impl Into<PathBuf>,
        config: HurricaneConfig,
        model: Arc<dyn Model>,
        strategies: StrategyRegistry,
        store: StateStore,
    ) -> Result<Self> {
        let root = root.into();
        let store = Arc::new(store);
        let board = store.load_board();
        let (events, notifications) =
            store.load_logs(config.monitor.event_log_cap, config.monitor.notification_log_cap);
        let engine = Arc::new(Mutex::new(NotificationEngine::with_logs(
            config.monitor.clone(),
            events,
            notifications,
        )));

        let parameters = ModelParameters {
            temperature: Some(config.model.temperature),
            max_tokens: Some(config.model.max_tokens),
            stop_sequences: None,
        };
        let planner = Planner::with_parameters(model, parameters);
        let (scheduler, scheduler_task) = Scheduler::spawn(
            board,
            Arc::clone(&store),
            strategies,
            Arc::clone(&engine),
            config.scheduler.clone(),
        );
        info!(root = %root.display(), "Orchestrator ready");

        Ok(Self {
            root,
            config,
            planner,
            scheduler,
            scheduler_task: Mutex::new(Some(scheduler_task)),
            engine,
            store,
            monitor: Mutex::new(None),
        })
    }

    /// Project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle to the scheduler loop.
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    // ---- goals -------------------------------------------------------------

    /// Persists a goal, decomposes it and attaches the resulting tasks.
    ///
    /// Decomposition failures never lose the goal: it gets a single
    /// catch-all task that needs review.
    ///
    /// # Errors
    /// Returns `InvalidGoal` for an empty title or description.
    pub async fn submit_goal(&self, request: GoalRequest) -> Result<String> {
        request.validate().map_err(CoreError::from)?;
        let goal = request.into_goal();
        let goal_id = self.scheduler.insert_goal(goal.clone()).await?;

        let breakdown = self.planner.plan(&goal).await;
        let fallback = breakdown.fallback;
        let task_ids = self.scheduler.attach_tasks(breakdown.tasks).await?;
        info!(goal_id = %goal_id, tasks = task_ids.len(), fallback, "Goal submitted");

        if let Some(next) = self.get_next_ready_task().await {
            info!(task_id = %next.id, title = %next.title, role = %next.role, "Suggested next task");
        }
        Ok(goal_id)
    }

    /// Active goals, highest priority first.
    pub async fn get_active_goals(&self) -> Vec<Goal> {
        self.scheduler.read(|board| board.active_goals().into_iter().cloned().collect()).await
    }

    /// Looks up a goal.
    pub async fn get_goal(&self, goal_id: &str) -> Option<Goal> {
        self.scheduler.read(|board| board.goal(goal_id).cloned()).await
    }

    /// Tasks owned by a goal, in creation order.
    pub async fn get_tasks_for_goal(&self, goal_id: &str) -> Vec<Task> {
        self.scheduler
            .read(|board| board.tasks_for_goal(goal_id).into_iter().cloned().collect())
            .await
    }

    /// Abandons a goal; unstarted tasks are cancelled.
    pub async fn abandon_goal(&self, goal_id: &str) -> Result<Vec<String>> {
        self.scheduler.abandon_goal(goal_id).await
    }

    // ---- tasks -------------------------------------------------------------

    /// Looks up a task.
    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        self.scheduler.read(|board| board.task(task_id).cloned()).await
    }

    /// Best ready task for a human to pick up next; nothing is changed.
    pub async fn get_next_ready_task(&self) -> Option<Task> {
        self.proactive_suggestions(1).await.into_iter().next()
    }

    /// Up to `limit` ready tasks in dispatch order.
    pub async fn proactive_suggestions(&self, limit: usize) -> Vec<Task> {
        self.scheduler
            .read(|board| suggest_next(board, limit).into_iter().cloned().collect())
            .await
    }

    /// Creates a task outside goal decomposition.
    pub async fn create_task(&self, task: Task) -> Result<String> {
        self.scheduler.create_task(task).await
    }

    /// Runs a task, bypassing the autonomous gate, and waits for its outcome.
    pub async fn execute_task(&self, task_id: &str) -> Result<TaskOutcome> {
        self.scheduler.execute_task(task_id).await
    }

    /// Cancels a task that has not started.
    pub async fn cancel_task(&self, task_id: &str) -> Result<()> {
        self.scheduler.cancel_task(task_id).await
    }

    /// Moves a blocked task back to `planned`.
    pub async fn requeue_task(&self, task_id: &str) -> Result<()> {
        self.scheduler.requeue_task(task_id).await
    }

    /// Creates a fresh copy of a finished task.
    pub async fn rerun_task(&self, task_id: &str) -> Result<String> {
        self.scheduler.rerun_task(task_id).await
    }

    // ---- workflows ---------------------------------------------------------

    /// Validates and stores a workflow.
    pub async fn create_workflow(&self, name: &str, steps: Vec<WorkflowStep>) -> Result<String> {
        self.scheduler.create_workflow(Workflow::new(name, steps)).await
    }

    /// Runs a pending workflow to completion or first failure.
    pub async fn execute_workflow(&self, workflow_id: &str) -> Result<WorkflowReport> {
        self.scheduler.execute_workflow(workflow_id).await
    }

    /// Looks up a workflow.
    pub async fn get_workflow(&self, workflow_id: &str) -> Option<Workflow> {
        self.scheduler.read(|board| board.workflow(workflow_id).cloned()).await
    }

    // ---- notifications -----------------------------------------------------

    /// Acknowledges a notification; false only for an unknown id.
    pub async fn acknowledge_notification(&self, notification_id: &str) -> bool {
        let mut engine = self.engine.lock().await;
        let found = engine.acknowledge(notification_id);
        if found {
            if let Err(e) = self.store.save_logs(engine.events(), engine.notifications()) {
                error!(error = %e, "Failed to persist notifications");
            }
        }
        found
    }

    /// Unacknowledged notifications, most important first.
    pub async fn get_unacknowledged_notifications(&self) -> Vec<Notification> {
        self.engine.lock().await.unacknowledged()
    }

    /// The `limit` most recent dispatch decisions, oldest first.
    pub async fn get_decisions(&self, limit: usize) -> Vec<Decision> {
        self.scheduler.decisions(limit).await
    }

    // ---- monitoring --------------------------------------------------------

    /// Starts the file monitor. Starting twice only logs a warning.
    ///
    /// # Errors
    /// Returns an error if the root is missing or the watcher cannot start.
    pub async fn start_monitoring(&self) -> Result<()> {
        let mut slot = self.monitor.lock().await;
        if slot.is_some() {
            warn!("Monitoring already running");
            return Ok(());
        }
        *slot = Some(MonitorHandle::start(
            self.root.clone(),
            self.config.monitor.clone(),
            Arc::clone(&self.engine),
            Arc::clone(&self.store),
            self.scheduler.clone(),
        )?);
        Ok(())
    }

    /// Stops the file monitor and flushes its logs. Stopping twice only logs a warning.
    pub async fn stop_monitoring(&self) -> Result<()> {
        let handle = self.monitor.lock().await.take();
        match handle {
            Some(handle) => handle.stop().await,
            None => {
                warn!("Monitoring already stopped");
                Ok(())
            }
        }
    }

    /// Logged file events from the last `hours` hours, oldest first.
    pub async fn recent_events(&self, hours: u32) -> Vec<FileEvent> {
        self.engine.lock().await.recent_events(hours, chrono::Utc::now())
    }

    /// Runs `callback` for every future event of `kind` the monitor processes.
    pub async fn register_event_callback(&self, kind: FileEventKind, callback: EventCallback) {
        self.engine.lock().await.register_event_callback(kind, callback);
    }

    /// Whether the monitor loop is running.
    pub async fn is_monitoring(&self) -> bool {
        self.monitor.lock().await.is_some()
    }

    /// Feeds an event to the running monitor as if the watcher had seen it.
    ///
    /// Returns false when monitoring is stopped or the path is ignored.
    pub async fn emit_file_event(&self, event: FileEvent) -> bool {
        self.monitor.lock().await.as_ref().is_some_and(|m| m.source().emit(event))
    }

    // ---- status ------------------------------------------------------------

    /// Counts and worker states at one instant.
    pub async fn status(&self) -> StatusSnapshot {
        let (goals, tasks, workers) = self
            .scheduler
            .read(|board| {
                let mut goals = BTreeMap::new();
                for status in [GoalStatus::Active, GoalStatus::Completed, GoalStatus::Abandoned] {
                    goals.insert(status.to_string(), 0);
                }
                for goal in board.goals().values() {
                    *goals.entry(goal.status.to_string()).or_insert(0) += 1;
                }
                let tasks: BTreeMap<String, usize> = board
                    .status_counts()
                    .into_iter()
                    .map(|(status, count)| (status.to_string(), count))
                    .collect();
                let workers = board
                    .workers()
                    .values()
                    .map(|w| WorkerStatus {
                        role: w.role,
                        name: w.name.clone(),
                        active: w.active,
                        current_task: w.current_task.clone(),
                        metrics: w.metrics.clone(),
                    })
                    .collect();
                (goals, tasks, workers)
            })
            .await;
        let unacknowledged_notifications = self.engine.lock().await.unacknowledged().len();
        StatusSnapshot {
            goals,
            tasks,
            workers,
            unacknowledged_notifications,
            monitoring: self.is_monitoring().await,
        }
    }

    // ---- lifecycle ---------------------------------------------------------

    /// Stops monitoring, lets in-flight tasks finish and flushes all state.
    pub async fn shutdown(&self) -> Result<()> {
        if self.is_monitoring().await {
            self.stop_monitoring().await?;
        }
        match self.scheduler.shutdown().await {
            Ok(()) | Err(OrchestrationError::SchedulerStopped) => {}
            Err(e) => return Err(e),
        }
        if let Some(join) = self.scheduler_task.lock().await.take() {
            if let Err(e) = join.await {
                error!(error = %e, "Scheduler task ended abnormally");
            }
        }

        let engine = self.engine.lock().await;
        self.store
            .save_logs(engine.events(), engine.notifications())
            .map_err(|e| OrchestrationError::Core(CoreError::Storage(e)))?;
        info!("Orchestrator shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mock_config() -> HurricaneConfig {
        let mut config = HurricaneConfig::default();
        config.model.provider = "mock".to_string();
        config
    }

    #[tokio::test]
    async fn test_open_with_mock_provider() {
        let root = TempDir::new().unwrap();
        let orchestrator = Orchestrator::open(root.path(), mock_config()).await.unwrap();
        assert_eq!(orchestrator.root(), root.path());

        let status = orchestrator.status().await;
        assert_eq!(status.workers.len(), AgentRole::ALL.len());
        assert!(status.workers.iter().all(|w| w.active && w.current_task.is_none()));
        assert_eq!(status.goals["active"], 0);
        assert!(status.tasks.is_empty());

        orchestrator.shutdown().await.unwrap();
        // Shutting down twice is harmless
        orchestrator.shutdown().await.unwrap();
        assert!(root.path().join(".hurricane").exists());
    }

    #[tokio::test]
    async fn test_open_rejects_unknown_provider() {
        let root = TempDir::new().unwrap();
        let mut config = mock_config();
        config.model.provider = "gpt-cloud".to_string();
        let err = Orchestrator::open(root.path(), config).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::Model(hurricane_abstraction::ModelError::UnsupportedModelProvider(_))
        ));
    }
}
