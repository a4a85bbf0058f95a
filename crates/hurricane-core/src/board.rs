//! In-memory task board.
//!
//! The board holds goals, tasks, workers and workflows and enforces the task
//! state machine. It is owned by the scheduler's control loop; every method
//! that changes a task's status also recomputes the owning goal's progress.

use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::models::{
    AgentRole, Goal, GoalStatus, Task, TaskStatus, Worker, Workflow, WorkflowStatus,
};

/// Single source of truth for orchestration state.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskBoard {
    goals: BTreeMap<String, Goal>,
    tasks: BTreeMap<String, Task>,
    workers: BTreeMap<AgentRole, Worker>,
    workflows: BTreeMap<String, Workflow>,
    next_sequence: u64,
}

impl Default for TaskBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBoard {
    /// Creates an empty board with one idle worker per role.
    pub fn new() -> Self {
        let workers = AgentRole::ALL.into_iter().map(|role| (role, Worker::new(role))).collect();
        Self {
            goals: BTreeMap::new(),
            tasks: BTreeMap::new(),
            workers,
            workflows: BTreeMap::new(),
            next_sequence: 1,
        }
    }

    /// Rebuilds a board from persisted collections.
    ///
    /// Missing workers are created; the sequence counter continues after the
    /// highest persisted task sequence.
    pub fn from_parts(
        goals: BTreeMap<String, Goal>,
        tasks: BTreeMap<String, Task>,
        workers: impl IntoIterator<Item = Worker>,
        workflows: BTreeMap<String, Workflow>,
    ) -> Self {
        let mut board = Self::new();
        for worker in workers {
            board.workers.insert(worker.role, worker);
        }
        board.next_sequence = tasks.values().map(|t| t.sequence).max().unwrap_or(0) + 1;
        board.goals = goals;
        board.tasks = tasks;
        board.workflows = workflows;
        board
    }

    // ---- goals -------------------------------------------------------------

    /// Inserts a goal and returns its id.
    pub fn insert_goal(&mut self, goal: Goal) -> String {
        let id = goal.id.clone();
        debug!(goal_id = %id, title = %goal.title, "Goal inserted");
        self.goals.insert(id.clone(), goal);
        id
    }

    /// Looks up a goal.
    pub fn goal(&self, id: &str) -> Option<&Goal> {
        self.goals.get(id)
    }

    /// All goals keyed by id.
    pub fn goals(&self) -> &BTreeMap<String, Goal> {
        &self.goals
    }

    /// Active goals, highest priority first, then oldest first.
    pub fn active_goals(&self) -> Vec<&Goal> {
        let mut goals: Vec<&Goal> =
            self.goals.values().filter(|g| g.status == GoalStatus::Active).collect();
        goals.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        goals
    }

    /// Tasks owned by a goal, in goal order.
    pub fn tasks_for_goal(&self, goal_id: &str) -> Vec<&Task> {
        self.goals
            .get(goal_id)
            .map(|g| g.task_ids.iter().filter_map(|id| self.tasks.get(id)).collect())
            .unwrap_or_default()
    }

    /// Marks a goal abandoned and cancels its tasks that have not started.
    ///
    /// Tasks already in flight are left to finish. Returns the cancelled ids.
    pub fn abandon_goal(&mut self, goal_id: &str) -> Result<Vec<String>> {
        let goal =
            self.goals.get_mut(goal_id).ok_or_else(|| CoreError::GoalNotFound(goal_id.to_string()))?;
        goal.status = GoalStatus::Abandoned;
        goal.updated_at = Utc::now();
        let task_ids = goal.task_ids.clone();

        let mut cancelled = Vec::new();
        for id in task_ids {
            let cancellable = self
                .tasks
                .get(&id)
                .is_some_and(|t| t.status.can_transition_to(TaskStatus::Cancelled));
            if cancellable {
                self.transition(&id, TaskStatus::Cancelled)?;
                cancelled.push(id);
            }
        }
        info!(goal_id = %goal_id, cancelled = cancelled.len(), "Goal abandoned");
        Ok(cancelled)
    }

    fn recompute_goal(&mut self, goal_id: &str) {
        let Some(goal) = self.goals.get(goal_id) else {
            return;
        };
        let total = goal.task_ids.len();
        let completed = goal
            .task_ids
            .iter()
            .filter(|id| self.tasks.get(*id).is_some_and(|t| t.status == TaskStatus::Completed))
            .count();
        if let Some(goal) = self.goals.get_mut(goal_id) {
            let was_active = goal.status == GoalStatus::Active;
            goal.apply_progress(completed, total);
            if was_active && goal.status == GoalStatus::Completed {
                info!(goal_id = %goal_id, title = %goal.title, "Goal completed");
            }
        }
    }

    // ---- tasks -------------------------------------------------------------

    /// Inserts a task, links it to its goal and returns its id.
    ///
    /// Every dependency must already be on the board. A task whose role does
    /// not advertise its required capabilities is inserted as `failed`.
    pub fn insert_task(&mut self, mut task: Task) -> Result<String> {
        if let Some(missing) = task.dependencies.iter().find(|d| !self.tasks.contains_key(*d)) {
            return Err(CoreError::TaskNotFound(missing.clone()));
        }
        if let Some(goal_id) = &task.goal_id {
            if !self.goals.contains_key(goal_id) {
                return Err(CoreError::GoalNotFound(goal_id.clone()));
            }
        }

        task.sequence = self.next_sequence;
        self.next_sequence += 1;

        if !task.role.supports_all(&task.required_capabilities) {
            let reason = format!(
                "Role {} does not advertise required capabilities {:?}",
                task.role, task.required_capabilities
            );
            warn!(task_id = %task.id, %reason, "Unsupported task");
            task.status = TaskStatus::Failed;
            task.completed_at = Some(Utc::now());
            task.record_error(reason);
        }

        let id = task.id.clone();
        let goal_id = task.goal_id.clone();
        self.tasks.insert(id.clone(), task);

        if let Some(goal_id) = goal_id {
            if let Some(goal) = self.goals.get_mut(&goal_id) {
                goal.task_ids.push(id.clone());
            }
            self.recompute_goal(&goal_id);
        }
        Ok(id)
    }

    /// Looks up a task.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// All tasks keyed by id.
    pub fn tasks(&self) -> &BTreeMap<String, Task> {
        &self.tasks
    }

    fn task_ref(&self, id: &str) -> Result<&Task> {
        self.tasks.get(id).ok_or_else(|| CoreError::TaskNotFound(id.to_string()))
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut Task> {
        self.tasks.get_mut(id).ok_or_else(|| CoreError::TaskNotFound(id.to_string()))
    }

    /// First dependency of `task` that is not completed.
    pub fn unmet_dependency<'a>(&self, task: &'a Task) -> Option<&'a str> {
        task.dependencies
            .iter()
            .find(|d| self.tasks.get(*d).is_none_or(|dep| dep.status != TaskStatus::Completed))
            .map(String::as_str)
    }

    /// Whether every dependency of `task` is completed.
    pub fn dependencies_met(&self, task: &Task) -> bool {
        self.unmet_dependency(task).is_none()
    }

    /// First dependency of `task` that ended without completing.
    ///
    /// Such a task can never become ready.
    pub fn dead_dependency<'a>(&self, task: &'a Task) -> Option<&'a str> {
        task.dependencies
            .iter()
            .find(|d| {
                self.tasks
                    .get(*d)
                    .is_none_or(|dep| dep.status.is_terminal() && dep.status != TaskStatus::Completed)
            })
            .map(String::as_str)
    }

    /// Planned tasks whose dependencies are all completed, in no particular order.
    pub fn ready_tasks(&self) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Planned && self.dependencies_met(t))
            .collect()
    }

    /// Applies a status transition.
    ///
    /// Validates the state machine, refuses `assigned`/`in_progress` while a
    /// dependency is incomplete and recomputes the owning goal's progress.
    /// Returns the previous status.
    pub fn transition(&mut self, id: &str, to: TaskStatus) -> Result<TaskStatus> {
        let task = self.task_ref(id)?;
        let from = task.status;
        if !from.can_transition_to(to) {
            return Err(CoreError::InvalidTransition { task_id: id.to_string(), from, to });
        }
        if to.is_active() {
            if let Some(dep) = self.unmet_dependency(task) {
                return Err(CoreError::DependencyUnmet {
                    task_id: id.to_string(),
                    dependency: dep.to_string(),
                });
            }
        }

        let now = Utc::now();
        let task = self.task_mut(id)?;
        task.status = to;
        task.updated_at = now;
        match to {
            TaskStatus::InProgress => task.started_at = Some(now),
            TaskStatus::Completed
            | TaskStatus::Failed
            | TaskStatus::Cancelled
            | TaskStatus::Blocked => task.completed_at = Some(now),
            TaskStatus::Planned => task.completed_at = None,
            TaskStatus::Assigned => {}
        }
        debug!(task_id = %id, from = %from, to = %to, "Task transitioned");

        if let Some(goal_id) = task.goal_id.clone() {
            self.recompute_goal(&goal_id);
        }
        Ok(from)
    }

    // ---- workers -----------------------------------------------------------

    /// Looks up the worker bound to `role`.
    pub fn worker(&self, role: AgentRole) -> Option<&Worker> {
        self.workers.get(&role)
    }

    /// All workers keyed by role.
    pub fn workers(&self) -> &BTreeMap<AgentRole, Worker> {
        &self.workers
    }

    /// Activates or deactivates a worker.
    pub fn set_worker_active(&mut self, role: AgentRole, active: bool) {
        if let Some(worker) = self.workers.get_mut(&role) {
            worker.active = active;
        }
    }

    /// Reserves the task's worker and moves the task to `assigned`.
    ///
    /// Both changes happen together or not at all.
    pub fn assign(&mut self, task_id: &str) -> Result<AgentRole> {
        let role = self.task_ref(task_id)?.role;
        let worker = self
            .workers
            .get(&role)
            .ok_or_else(|| CoreError::UnsupportedTask(format!("No worker for role {}", role)))?;
        if let Some(current) = &worker.current_task {
            return Err(CoreError::WorkerBusy { role, current: current.clone() });
        }
        if !worker.active {
            return Err(CoreError::UnsupportedTask(format!("Worker {} is inactive", role)));
        }

        self.transition(task_id, TaskStatus::Assigned)?;
        if let Some(worker) = self.workers.get_mut(&role) {
            worker.current_task = Some(task_id.to_string());
        }
        Ok(role)
    }

    /// Moves an assigned task to `in_progress`.
    pub fn start(&mut self, task_id: &str) -> Result<()> {
        self.transition(task_id, TaskStatus::InProgress).map(|_| ())
    }

    /// Records a successful run and frees the worker.
    pub fn complete(&mut self, task_id: &str, output: Value, elapsed_ms: u64) -> Result<()> {
        self.transition(task_id, TaskStatus::Completed)?;
        let task = self.task_mut(task_id)?;
        task.output = Some(output);
        task.context.remove("error");
        let role = task.role;
        self.release(role, task_id, true, elapsed_ms);
        Ok(())
    }

    /// Records a failed run and frees the worker.
    pub fn fail(&mut self, task_id: &str, reason: &str, elapsed_ms: u64) -> Result<()> {
        self.finish_with_error(task_id, TaskStatus::Failed, reason, elapsed_ms)
    }

    /// Records a transient failure and frees the worker; the task can be requeued.
    pub fn block(&mut self, task_id: &str, reason: &str, elapsed_ms: u64) -> Result<()> {
        self.finish_with_error(task_id, TaskStatus::Blocked, reason, elapsed_ms)
    }

    fn finish_with_error(
        &mut self,
        task_id: &str,
        status: TaskStatus,
        reason: &str,
        elapsed_ms: u64,
    ) -> Result<()> {
        let was_active = self.task_ref(task_id)?.status.is_active();
        self.transition(task_id, status)?;
        let task = self.task_mut(task_id)?;
        task.record_error(reason);
        let role = task.role;
        if was_active {
            self.release(role, task_id, false, elapsed_ms);
        }
        Ok(())
    }

    fn release(&mut self, role: AgentRole, task_id: &str, success: bool, elapsed_ms: u64) {
        if let Some(worker) = self.workers.get_mut(&role) {
            if worker.current_task.as_deref() == Some(task_id) {
                worker.current_task = None;
            }
            worker.metrics.record(success, elapsed_ms);
        }
    }

    /// Cancels a task that has not started.
    pub fn cancel(&mut self, task_id: &str) -> Result<()> {
        self.transition(task_id, TaskStatus::Cancelled).map(|_| ())
    }

    /// Moves a blocked task back to `planned`, keeping its last error as `last_error`.
    pub fn requeue(&mut self, task_id: &str) -> Result<()> {
        self.transition(task_id, TaskStatus::Planned)?;
        let task = self.task_mut(task_id)?;
        if let Some(error) = task.context.remove("error") {
            task.context.insert("last_error".to_string(), error);
        }
        Ok(())
    }

    /// Creates a planned copy of a terminal task and returns the new id.
    ///
    /// The copy takes the original's place in its goal, and waiting
    /// dependents are re-pointed at it.
    pub fn rerun(&mut self, task_id: &str) -> Result<String> {
        let original = self.task_ref(task_id)?;
        if !original.status.is_terminal() {
            return Err(CoreError::InvalidTransition {
                task_id: task_id.to_string(),
                from: original.status,
                to: TaskStatus::Planned,
            });
        }
        let mut copy = original.rerun_copy();
        copy.sequence = self.next_sequence;
        self.next_sequence += 1;
        let new_id = copy.id.clone();
        let goal_id = copy.goal_id.clone();
        self.tasks.insert(new_id.clone(), copy);

        for task in self.tasks.values_mut() {
            if task.status.is_terminal() || task.status.is_active() {
                continue;
            }
            for dep in &mut task.dependencies {
                if dep.as_str() == task_id {
                    dep.clone_from(&new_id);
                }
            }
        }

        if let Some(goal_id) = goal_id {
            if let Some(goal) = self.goals.get_mut(&goal_id) {
                for id in &mut goal.task_ids {
                    if id.as_str() == task_id {
                        id.clone_from(&new_id);
                    }
                }
                if goal.status == GoalStatus::Completed {
                    goal.status = GoalStatus::Active;
                    goal.completed_at = None;
                }
            }
            self.recompute_goal(&goal_id);
        }
        info!(task_id = %task_id, rerun_id = %new_id, "Task rerun created");
        Ok(new_id)
    }

    /// Repairs state left behind by an unclean stop.
    ///
    /// Tasks that were assigned or in progress become `blocked` and every
    /// worker is freed. Returns the ids of recovered tasks.
    pub fn recover(&mut self) -> Vec<String> {
        let interrupted: Vec<String> =
            self.tasks.values().filter(|t| t.status.is_active()).map(|t| t.id.clone()).collect();
        for id in &interrupted {
            if let Err(e) = self.transition(id, TaskStatus::Blocked) {
                warn!(task_id = %id, error = %e, "Failed to recover task");
                continue;
            }
            if let Some(task) = self.tasks.get_mut(id) {
                task.record_error("interrupted by restart");
            }
        }
        for worker in self.workers.values_mut() {
            worker.current_task = None;
        }
        let goal_ids: Vec<String> = self.goals.keys().cloned().collect();
        for goal_id in goal_ids {
            self.recompute_goal(&goal_id);
        }
        if !interrupted.is_empty() {
            warn!(count = interrupted.len(), "Interrupted tasks marked blocked");
        }
        interrupted
    }

    // ---- workflows ---------------------------------------------------------

    /// Inserts a workflow and returns its id.
    pub fn insert_workflow(&mut self, workflow: Workflow) -> String {
        let id = workflow.id.clone();
        self.workflows.insert(id.clone(), workflow);
        id
    }

    /// Looks up a workflow.
    pub fn workflow(&self, id: &str) -> Option<&Workflow> {
        self.workflows.get(id)
    }

    /// All workflows keyed by id.
    pub fn workflows(&self) -> &BTreeMap<String, Workflow> {
        &self.workflows
    }

    /// Updates a workflow's status and, when given, its task ids.
    pub fn update_workflow(
        &mut self,
        id: &str,
        status: WorkflowStatus,
        task_ids: Option<Vec<String>>,
    ) -> Option<&Workflow> {
        let workflow = self.workflows.get_mut(id)?;
        workflow.status = status;
        if let Some(task_ids) = task_ids {
            workflow.task_ids = task_ids;
        }
        Some(workflow)
    }

    // ---- reporting ---------------------------------------------------------

    /// Number of tasks per status.
    pub fn status_counts(&self) -> HashMap<TaskStatus, usize> {
        let mut counts = HashMap::new();
        for task in self.tasks.values() {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        counts
    }

    /// Checks the board's structural invariants.
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        for role in self.workers.keys() {
            let held = self.tasks.values().filter(|t| t.role == *role && t.status.is_active()).count();
            if held > 1 {
                return Err(format!("worker {} holds {} active tasks", role, held));
            }
        }
        for task in self.tasks.values().filter(|t| t.status.is_active()) {
            if let Some(dep) = self.unmet_dependency(task) {
                return Err(format!("task {} is {} with unmet dependency {}", task.id, task.status, dep));
            }
        }
        for goal in self.goals.values() {
            let total = goal.task_ids.len();
            let completed = goal
                .task_ids
                .iter()
                .filter(|id| self.tasks.get(*id).is_some_and(|t| t.status == TaskStatus::Completed))
                .count();
            let expected = if total == 0 { 0.0 } else { completed as f64 / total as f64 * 100.0 };
            if (goal.progress - expected).abs() > 1e-9 {
                return Err(format!("goal {} progress {} != {}", goal.id, goal.progress, expected));
            }
        }
        Ok(())
    }
}
