//! Scheduler control loop.
//!
//! A single tokio task owns every write to the [`TaskBoard`]. Callers talk to
//! it through a [`SchedulerHandle`]; each command carries a oneshot reply.
//! Task execution runs in a `JoinSet`, one unit per in-flight task, and only
//! touches the board again when the unit finishes.
//!
//! Every pass of the loop halts broken workflow runs, dispatches ready tasks,
//! answers waiters whose task settled, and flushes the board when something
//! changed. Each dispatch appends a [`Decision`] to the history log.

use futures::FutureExt;
use hurricane_core::{
    AgentRole, CoreError, Decision, DecisionKind, Goal, NotificationEngine, RollingLog, SchedulerSettings, StateStore, Task, TaskBoard,
    TaskStatus, Workflow, WorkflowStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{OrchestrationError, Result};
use crate::queue::ReadyQueue;
use crate::registry::StrategyRegistry;
use crate::strategy::{ExecutionError, ExecutionStrategy};
use crate::workflow::{self, WorkflowReport, WorkflowRun};

const COMMAND_BUFFER: usize = 256;

/// Terminal result of an execute request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Task id.
    pub task_id: String,
    /// Status the run ended in.
    pub status: TaskStatus,
    /// Output of a completed run.
    pub output: Option<Value>,
    /// Recorded error of a failed, blocked or cancelled run.
    pub error: Option<String>,
}

impl TaskOutcome {
    fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            status: task.status,
            output: task.output.clone(),
            error: task.error().map(ToString::to_string),
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    InsertGoal { goal: Goal, reply: Reply<String> },
    AttachTasks { tasks: Vec<Task>, reply: Reply<Vec<String>> },
    CreateTask { task: Task, reply: Reply<String> },
    Execute { task_id: String, reply: Reply<TaskOutcome> },
    Cancel { task_id: String, reply: Reply<()> },
    Requeue { task_id: String, reply: Reply<()> },
    Rerun { task_id: String, reply: Reply<String> },
    AbandonGoal { goal_id: String, reply: Reply<Vec<String>> },
    SetWorkerActive { role: AgentRole, active: bool, reply: Reply<()> },
    CreateWorkflow { workflow: Workflow, reply: Reply<String> },
    ExecuteWorkflow { workflow_id: String, reply: Reply<WorkflowReport> },
    Flush { reply: Reply<()> },
    Shutdown { reply: oneshot::Sender<()> },
}

/// Cloneable handle to the scheduler loop.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    board: Arc<RwLock<TaskBoard>>,
    decisions: Arc<RwLock<RollingLog<Decision>>>,
}

impl SchedulerHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands.send(build(reply)).await?;
        response.await?
    }

    /// Runs `f` against a consistent view of the board.
    pub async fn read<R>(&self, f: impl FnOnce(&TaskBoard) -> R) -> R {
        let board = self.board.read().await;
        f(&board)
    }

    /// Clones the current board.
    pub async fn snapshot(&self) -> TaskBoard {
        self.board.read().await.clone()
    }

    /// The `limit` most recent dispatch decisions, oldest first.
    pub async fn decisions(&self, limit: usize) -> Vec<Decision> {
        self.decisions.read().await.recent(limit).cloned().collect()
    }

    /// Whether the loop has exited.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Inserts a goal and persists it before replying.
    pub async fn insert_goal(&self, goal: Goal) -> Result<String> {
        self.request(|reply| Command::InsertGoal { goal, reply }).await
    }

    /// Inserts tasks in order; dependencies must point at earlier tasks or the board.
    pub async fn attach_tasks(&self, tasks: Vec<Task>) -> Result<Vec<String>> {
        self.request(|reply| Command::AttachTasks { tasks, reply }).await
    }

    /// Inserts a task created through the API. It is manual unless autonomous.
    pub async fn create_task(&self, task: Task) -> Result<String> {
        self.request(|reply| Command::CreateTask { task, reply }).await
    }

    /// Requests execution of a task and waits for the outcome.
    ///
    /// # Errors
    /// Returns `DependencyUnmet` when a dependency ended without completing,
    /// `InvalidTransition` for a terminal task and `SchedulerStopped` when
    /// the scheduler shuts down first.
    pub async fn execute_task(&self, task_id: &str) -> Result<TaskOutcome> {
        let task_id = task_id.to_string();
        self.request(|reply| Command::Execute { task_id, reply }).await
    }

    /// Cancels a task that has not started.
    pub async fn cancel_task(&self, task_id: &str) -> Result<()> {
        let task_id = task_id.to_string();
        self.request(|reply| Command::Cancel { task_id, reply }).await
    }

    /// Moves a blocked task back to `planned`.
    pub async fn requeue_task(&self, task_id: &str) -> Result<()> {
        let task_id = task_id.to_string();
        self.request(|reply| Command::Requeue { task_id, reply }).await
    }

    /// Creates a planned copy of a terminal task.
    pub async fn rerun_task(&self, task_id: &str) -> Result<String> {
        let task_id = task_id.to_string();
        self.request(|reply| Command::Rerun { task_id, reply }).await
    }

    /// Abandons a goal and cancels its unstarted tasks.
    pub async fn abandon_goal(&self, goal_id: &str) -> Result<Vec<String>> {
        let goal_id = goal_id.to_string();
        self.request(|reply| Command::AbandonGoal { goal_id, reply }).await
    }

    /// Activates or deactivates a role's worker.
    pub async fn set_worker_active(&self, role: AgentRole, active: bool) -> Result<()> {
        self.request(|reply| Command::SetWorkerActive { role, active, reply }).await
    }

    /// Validates and stores a workflow.
    pub async fn create_workflow(&self, workflow: Workflow) -> Result<String> {
        self.request(|reply| Command::CreateWorkflow { workflow, reply }).await
    }

    /// Runs a pending workflow and waits for its report.
    pub async fn execute_workflow(&self, workflow_id: &str) -> Result<WorkflowReport> {
        let workflow_id = workflow_id.to_string();
        self.request(|reply| Command::ExecuteWorkflow { workflow_id, reply }).await
    }

    /// Persists the board and logs now.
    pub async fn flush(&self) -> Result<()> {
        self.request(|reply| Command::Flush { reply }).await
    }

    /// Stops dispatching, waits for in-flight tasks and flushes.
    ///
    /// # Errors
    /// Returns `SchedulerStopped` if the loop already exited.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.commands.send(Command::Shutdown { reply }).await?;
        done.await?;
        Ok(())
    }
}

struct UnitResult {
    task_id: String,
    result: std::result::Result<Value, ExecutionError>,
    elapsed_ms: u64,
}

enum Settled {
    Outcome(TaskOutcome),
    Missing,
    DeadDependency(String),
}

impl Settled {
    fn answer(&self, task_id: &str) -> Result<TaskOutcome> {
        match self {
            Self::Outcome(outcome) => Ok(outcome.clone()),
            Self::Missing => Err(CoreError::TaskNotFound(task_id.to_string()).into()),
            Self::DeadDependency(dependency) => Err(CoreError::DependencyUnmet {
                task_id: task_id.to_string(),
                dependency: dependency.clone(),
            }
            .into()),
        }
    }
}

/// The control loop state.
pub struct Scheduler {
    board: Arc<RwLock<TaskBoard>>,
    store: Arc<StateStore>,
    registry: StrategyRegistry,
    engine: Arc<Mutex<NotificationEngine>>,
    settings: SchedulerSettings,
    commands: mpsc::Receiver<Command>,
    units: JoinSet<UnitResult>,
    manual: HashSet<String>,
    waiters: HashMap<String, Vec<Reply<TaskOutcome>>>,
    runs: Vec<(WorkflowRun, Reply<WorkflowReport>)>,
    decisions: Arc<RwLock<RollingLog<Decision>>>,
    dirty: bool,
    logs_dirty: bool,
    decisions_dirty: bool,
    stopping: bool,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .field("in_flight", &self.units.len())
            .field("manual", &self.manual.len())
            .field("stopping", &self.stopping)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Spawns the control loop.
    ///
    /// # Arguments
    /// * `board` - Initial state, usually loaded and recovered from the store
    /// * `store` - Where the board, logs and decision history are persisted
    /// * `registry` - Execution strategy per role
    /// * `engine` - Notification engine that records task failures
    /// * `settings` - Dispatch and timeout settings
    pub fn spawn(
        board: TaskBoard,
        store: Arc<StateStore>,
        registry: StrategyRegistry,
        engine: Arc<Mutex<NotificationEngine>>,
        settings: SchedulerSettings,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let board = Arc::new(RwLock::new(board));
        let decisions = Arc::new(RwLock::new(store.load_decisions(settings.decision_log_cap)));
        let scheduler = Self {
            board: Arc::clone(&board),
            store,
            registry,
            engine,
            settings,
            commands: rx,
            units: JoinSet::new(),
            manual: HashSet::new(),
            waiters: HashMap::new(),
            runs: Vec::new(),
            decisions: Arc::clone(&decisions),
            dirty: false,
            logs_dirty: false,
            decisions_dirty: false,
            stopping: false,
        };
        let join = tokio::spawn(scheduler.run());
        (SchedulerHandle { commands: tx, board, decisions }, join)
    }

    async fn run(mut self) {
        info!(
            autonomous_dispatch = self.settings.autonomous_dispatch,
            strategies = self.registry.len(),
            "Scheduler started"
        );
        let mut tick = tokio::time::interval(self.settings.tick());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_replies = Vec::new();

        loop {
            tokio::select! {
                command = self.commands.recv(), if !self.stopping => match command {
                    Some(Command::Shutdown { reply }) => {
                        shutdown_replies.push(reply);
                        self.begin_shutdown().await;
                    }
                    Some(command) => self.handle(command).await,
                    None => self.begin_shutdown().await,
                },
                Some(joined) = self.units.join_next(), if !self.units.is_empty() => {
                    self.on_unit_finished(joined).await;
                }
                _ = tick.tick() => {}
            }

            self.halt_broken_runs().await;
            if !self.stopping {
                self.dispatch().await;
            }
            self.settle().await;
            if self.stopping && self.units.is_empty() {
                break;
            }
            self.flush_if_dirty().await;
        }

        for (run, reply) in self.runs.drain(..) {
            debug!(workflow_id = %run.workflow_id, "Workflow interrupted by shutdown");
            let _ = reply.send(Err(OrchestrationError::SchedulerStopped));
        }
        for (_, replies) in self.waiters.drain() {
            for reply in replies {
                let _ = reply.send(Err(OrchestrationError::SchedulerStopped));
            }
        }
        self.dirty = true;
        self.flush_if_dirty().await;
        info!("Scheduler stopped");
        for reply in shutdown_replies {
            let _ = reply.send(());
        }
    }

    async fn begin_shutdown(&mut self) {
        if self.stopping {
            return;
        }
        self.stopping = true;
        info!(in_flight = self.units.len(), "Scheduler shutting down");

        // Requests that never started are answered now; in-flight ones finish
        let board = self.board.read().await;
        let idle: Vec<String> = self
            .waiters
            .keys()
            .filter(|id| board.task(id).is_none_or(|t| !t.status.is_active()))
            .cloned()
            .collect();
        drop(board);
        for id in idle {
            for reply in self.waiters.remove(&id).unwrap_or_default() {
                let _ = reply.send(Err(OrchestrationError::SchedulerStopped));
            }
        }
        self.manual.clear();
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::InsertGoal { goal, reply } => {
                let id = self.board.write().await.insert_goal(goal);
                self.dirty = true;
                self.flush_if_dirty().await;
                let _ = reply.send(Ok(id));
            }
            Command::AttachTasks { tasks, reply } => {
                let result = self.attach(tasks).await;
                let _ = reply.send(result);
            }
            Command::CreateTask { mut task, reply } => {
                if !task.autonomous {
                    task.manual = true;
                }
                let result = self.attach(vec![task]).await.map(|mut ids| ids.remove(0));
                let _ = reply.send(result);
            }
            Command::Execute { task_id, reply } => self.request_execution(task_id, reply).await,
            Command::Cancel { task_id, reply } => {
                let result = self.board.write().await.cancel(&task_id).map_err(Into::into);
                if result.is_ok() {
                    self.manual.remove(&task_id);
                    self.dirty = true;
                    info!(task_id = %task_id, "Task cancelled");
                }
                let _ = reply.send(result);
            }
            Command::Requeue { task_id, reply } => {
                let result = self.board.write().await.requeue(&task_id).map_err(Into::into);
                self.dirty |= result.is_ok();
                let _ = reply.send(result);
            }
            Command::Rerun { task_id, reply } => {
                let result = self.board.write().await.rerun(&task_id).map_err(Into::into);
                self.dirty |= result.is_ok();
                let _ = reply.send(result);
            }
            Command::AbandonGoal { goal_id, reply } => {
                let result = self.board.write().await.abandon_goal(&goal_id).map_err(Into::into);
                if let Ok(cancelled) = &result {
                    for id in cancelled {
                        self.manual.remove(id);
                    }
                    self.dirty = true;
                }
                let _ = reply.send(result);
            }
            Command::SetWorkerActive { role, active, reply } => {
                self.board.write().await.set_worker_active(role, active);
                self.dirty = true;
                info!(role = %role, active, "Worker activity changed");
                let _ = reply.send(Ok(()));
            }
            Command::CreateWorkflow { workflow, reply } => {
                let result = match workflow::validate(&workflow.name, &workflow.steps) {
                    Ok(()) => {
                        info!(
                            workflow_id = %workflow.id,
                            name = %workflow.name,
                            steps = workflow.steps.len(),
                            "Workflow created"
                        );
                        self.dirty = true;
                        Ok(self.board.write().await.insert_workflow(workflow))
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::ExecuteWorkflow { workflow_id, reply } => {
                match self.start_workflow(&workflow_id).await {
                    Ok(run) => self.runs.push((run, reply)),
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::Flush { reply } => {
                self.dirty = true;
                let _ = reply.send(self.flush().await);
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn attach(&mut self, tasks: Vec<Task>) -> Result<Vec<String>> {
        let mut board = self.board.write().await;
        let mut ids = Vec::with_capacity(tasks.len());
        let mut unsupported = Vec::new();
        for task in tasks {
            let id = board.insert_task(task)?;
            self.dirty = true;
            if let Some(task) = board.task(&id).filter(|t| t.status == TaskStatus::Failed) {
                unsupported.push(task.clone());
            }
            ids.push(id);
        }
        drop(board);
        for task in unsupported {
            self.record_failure(&task).await;
        }
        Ok(ids)
    }

    async fn request_execution(&mut self, task_id: String, reply: Reply<TaskOutcome>) {
        let mut board = self.board.write().await;
        let Some(status) = board.task(&task_id).map(|t| t.status) else {
            let _ = reply.send(Err(CoreError::TaskNotFound(task_id).into()));
            return;
        };
        match status {
            TaskStatus::Blocked => {
                if let Err(e) = board.requeue(&task_id) {
                    let _ = reply.send(Err(e.into()));
                    return;
                }
                self.dirty = true;
            }
            TaskStatus::Planned | TaskStatus::Assigned | TaskStatus::InProgress => {}
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                let _ = reply.send(Err(CoreError::InvalidTransition {
                    task_id,
                    from: status,
                    to: TaskStatus::Assigned,
                }
                .into()));
                return;
            }
        }

        if let Some(dependency) = board.task(&task_id).and_then(|t| board.dead_dependency(t)) {
            let _ = reply.send(Err(CoreError::DependencyUnmet {
                task_id: task_id.clone(),
                dependency: dependency.to_string(),
            }
            .into()));
            return;
        }
        drop(board);

        debug!(task_id = %task_id, "Execution requested");
        self.manual.insert(task_id.clone());
        self.waiters.entry(task_id).or_default().push(reply);
    }

    async fn start_workflow(&mut self, workflow_id: &str) -> Result<WorkflowRun> {
        let mut board = self.board.write().await;
        let workflow = board
            .workflow(workflow_id)
            .cloned()
            .ok_or_else(|| OrchestrationError::WorkflowNotFound(workflow_id.to_string()))?;
        if workflow.status != WorkflowStatus::Pending {
            return Err(OrchestrationError::InvalidWorkflow(format!(
                "workflow {} is {:?}; only pending workflows can run",
                workflow_id, workflow.status
            )));
        }

        let tasks = workflow::instantiate(&workflow)?;
        let mut ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            ids.push(board.insert_task(task)?);
        }
        board.update_workflow(workflow_id, WorkflowStatus::Running, Some(ids.clone()));
        drop(board);

        self.dirty = true;
        self.manual.extend(ids.iter().cloned());
        info!(workflow_id = %workflow_id, tasks = ids.len(), "Workflow started");
        Ok(WorkflowRun::new(workflow_id.to_string(), ids))
    }

    async fn dispatch(&mut self) {
        let autonomous = self.settings.autonomous_dispatch;
        let mut board = self.board.write().await;
        let mut queue: ReadyQueue = board
            .tasks()
            .values()
            .filter(|t| t.status == TaskStatus::Planned)
            .filter(|t| self.manual.contains(&t.id) || (autonomous && t.autonomous && !t.manual))
            .filter(|t| board.dependencies_met(t))
            .collect();
        if queue.is_empty() {
            return;
        }

        let mut unsupported = Vec::new();
        let mut decisions = Vec::new();
        while let Some(task_id) = queue.pop() {
            let Some(role) = board.task(&task_id).map(|t| t.role) else {
                continue;
            };
            let Some(strategy) = self.registry.get(role) else {
                let reason = format!("No execution strategy registered for role {}", role);
                warn!(task_id = %task_id, role = %role, "Unsupported task");
                if let Err(e) = board.fail(&task_id, &reason, 0) {
                    error!(task_id = %task_id, error = %e, "Failed to mark task unsupported");
                } else if let Some(task) = board.task(&task_id) {
                    unsupported.push(task.clone());
                }
                self.manual.remove(&task_id);
                self.dirty = true;
                continue;
            };

            // Busy or inactive workers leave the task queued for a later pass
            if !board.worker(role).is_some_and(|w| w.active && !w.is_busy()) {
                continue;
            }
            if let Err(e) = board.assign(&task_id) {
                debug!(task_id = %task_id, error = %e, "Dispatch deferred");
                continue;
            }
            if let Err(e) = board.start(&task_id) {
                error!(task_id = %task_id, error = %e, "Failed to start task");
                let _ = board.block(&task_id, &e.to_string(), 0);
                self.dirty = true;
                continue;
            }
            let Some(task) = board.task(&task_id).cloned() else {
                continue;
            };

            let kind = if self.manual.remove(&task_id) {
                DecisionKind::RequestedExecution
            } else {
                DecisionKind::AutonomousExecution
            };
            info!(
                task_id = %task_id,
                role = %role,
                priority = %task.priority,
                strategy = strategy.name(),
                decision = %kind,
                "Task dispatched"
            );
            decisions.push(Decision::dispatch(kind, &task, strategy.name()));
            self.dirty = true;
            self.units.spawn(run_unit(strategy, task, self.settings.task_timeout()));
        }
        drop(board);

        if !decisions.is_empty() {
            let mut log = self.decisions.write().await;
            for decision in decisions {
                log.push(decision);
            }
            self.decisions_dirty = true;
        }
        for task in unsupported {
            self.record_failure(&task).await;
        }
    }

    async fn on_unit_finished(&mut self, joined: std::result::Result<UnitResult, JoinError>) {
        let unit = match joined {
            Ok(unit) => unit,
            Err(e) => {
                error!(error = %e, "Execution unit was aborted");
                return;
            }
        };
        let UnitResult { task_id, result, elapsed_ms } = unit;

        let mut board = self.board.write().await;
        let recorded = match result {
            Ok(output) => board.complete(&task_id, output, elapsed_ms).map(|()| TaskStatus::Completed),
            Err(ExecutionError::Transient(reason)) => {
                warn!(task_id = %task_id, reason = %reason, "Task blocked");
                board.block(&task_id, &reason, elapsed_ms).map(|()| TaskStatus::Blocked)
            }
            Err(ExecutionError::Failed(reason)) => {
                warn!(task_id = %task_id, reason = %reason, "Task failed");
                board.fail(&task_id, &reason, elapsed_ms).map(|()| TaskStatus::Failed)
            }
        };
        self.dirty = true;

        let failed = match recorded {
            Ok(status) => {
                info!(task_id = %task_id, status = %status, elapsed_ms, "Task finished");
                board.task(&task_id).filter(|t| t.status == TaskStatus::Failed).cloned()
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Failed to record task result");
                None
            }
        };
        drop(board);

        if let Some(task) = failed {
            self.record_failure(&task).await;
        }
    }

    async fn record_failure(&mut self, task: &Task) {
        self.engine.lock().await.notify_task_failure(task);
        self.logs_dirty = true;
    }

    /// Cancels the unstarted tasks of every run with a failed or blocked step.
    /// Runs before each dispatch pass so a halted step never starts.
    async fn halt_broken_runs(&mut self) {
        if self.runs.is_empty() {
            return;
        }
        let mut board = self.board.write().await;
        for (run, _) in &mut self.runs {
            for id in run.halt_targets(&board) {
                match board.cancel(&id) {
                    Ok(()) => debug!(task_id = %id, workflow_id = %run.workflow_id, "Workflow task cancelled"),
                    Err(e) => warn!(task_id = %id, error = %e, "Failed to cancel workflow task"),
                }
                self.manual.remove(&id);
                self.dirty = true;
            }
        }
    }

    async fn settle(&mut self) {
        self.halt_broken_runs().await;
        let mut board = self.board.write().await;

        let (finished, running): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.runs).into_iter().partition(|(run, _)| run.is_finished(&board));
        self.runs = running;
        for (run, reply) in finished {
            let report = run.report(&board);
            board.update_workflow(&run.workflow_id, report.status, None);
            self.dirty = true;
            info!(
                workflow_id = %run.workflow_id,
                status = ?report.status,
                completed = report.completed.len(),
                failed = report.failed.len(),
                cancelled = report.cancelled.len(),
                "Workflow finished"
            );
            let _ = reply.send(Ok(report));
        }

        let mut settled = Vec::new();
        for id in self.waiters.keys() {
            let state = match board.task(id) {
                None => Some(Settled::Missing),
                Some(task) if task.status.is_terminal() || task.status == TaskStatus::Blocked => {
                    Some(Settled::Outcome(TaskOutcome::from_task(task)))
                }
                Some(task) if task.status == TaskStatus::Planned => board
                    .dead_dependency(task)
                    .map(|dep| Settled::DeadDependency(dep.to_string())),
                Some(_) => None,
            };
            if let Some(state) = state {
                settled.push((id.clone(), state));
            }
        }
        drop(board);

        for (id, state) in settled {
            self.manual.remove(&id);
            for reply in self.waiters.remove(&id).unwrap_or_default() {
                let _ = reply.send(state.answer(&id));
            }
        }
    }

    async fn flush(&mut self) -> Result<()> {
        let board = self.board.read().await;
        let saved = self.store.save_board(&board);
        drop(board);
        let logs = if self.logs_dirty {
            let engine = self.engine.lock().await;
            self.store.save_logs(engine.events(), engine.notifications())
        } else {
            Ok(())
        };
        let decisions = if self.decisions_dirty {
            self.store.save_decisions(&*self.decisions.read().await)
        } else {
            Ok(())
        };
        self.dirty = false;
        self.logs_dirty = false;
        self.decisions_dirty = false;
        saved.and(logs).and(decisions).map_err(|e| CoreError::Storage(e).into())
    }

    async fn flush_if_dirty(&mut self) {
        if !self.dirty && !self.logs_dirty && !self.decisions_dirty {
            return;
        }
        if let Err(e) = self.flush().await {
            error!(error = %e, "Failed to persist state");
        }
    }
}

async fn run_unit(strategy: Arc<dyn ExecutionStrategy>, task: Task, timeout: Duration) -> UnitResult {
    let started = Instant::now();
    let execution = AssertUnwindSafe(strategy.execute(&task)).catch_unwind();
    let result = match tokio::time::timeout(timeout, execution).await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => {
            Err(ExecutionError::Failed(format!("Execution panicked: {}", panic_message(panic.as_ref()))))
        }
        Err(_) => Err(ExecutionError::Transient(format!(
            "Execution timed out after {}s",
            timeout.as_secs()
        ))),
    };
    UnitResult {
        task_id: task.id,
        result,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
