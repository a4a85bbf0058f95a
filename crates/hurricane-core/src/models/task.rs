//! Task data structures.
//!
//! A task is one unit of work assigned to exactly one worker role. Tasks are
//! created by the planner, by workflows or by direct API calls; their status
//! is only ever changed by the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use super::agent::AgentRole;
use super::priority::Priority;

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, waiting for dependencies and a free worker.
    #[default]
    Planned,
    /// A worker has been reserved.
    Assigned,
    /// The execution unit is running.
    InProgress,
    /// Stopped on a transient or unexpected error; can be requeued.
    Blocked,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Withdrawn before it started.
    Cancelled,
}

impl TaskStatus {
    /// Terminal states are immutable; re-runs create a new task.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// States in which the task occupies a worker.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Assigned | Self::InProgress)
    }

    /// Checks whether a transition from this status to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        match (self, target) {
            (Self::Planned, Self::Assigned | Self::Failed | Self::Cancelled)
            | (Self::Assigned, Self::InProgress | Self::Blocked | Self::Failed)
            | (Self::InProgress, Self::Completed | Self::Failed | Self::Blocked)
            | (Self::Blocked, Self::Planned | Self::Cancelled) => true,
            (
                Self::Planned
                | Self::Assigned
                | Self::InProgress
                | Self::Blocked
                | Self::Completed
                | Self::Failed
                | Self::Cancelled,
                _,
            ) => false,
        }
    }

    /// Returns the snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: String,
    /// Short title.
    pub title: String,
    /// What needs to be done.
    pub description: String,
    /// Owning goal, if the task came from goal decomposition.
    #[serde(default)]
    pub goal_id: Option<String>,
    /// Role of the worker that executes this task.
    pub role: AgentRole,
    /// Current status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Dispatch priority.
    #[serde(default)]
    pub priority: Priority,
    /// Estimated effort in minutes.
    #[serde(default)]
    pub estimated_minutes: u32,
    /// Ids of tasks that must be completed first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Capabilities the executing role must advertise.
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    /// How to tell the task is done.
    #[serde(default)]
    pub success_criteria: Vec<String>,
    /// May run without human confirmation.
    #[serde(default)]
    pub autonomous: bool,
    /// Only dispatched by an explicit execute request or a workflow.
    #[serde(default)]
    pub manual: bool,
    /// Free-form context; errors are recorded under `error`.
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Output of a successful run.
    #[serde(default)]
    pub output: Option<Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// When execution started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal or blocked state.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Creation order, assigned by the task board.
    #[serde(default)]
    pub sequence: u64,
}

impl Task {
    /// Creates a planned task with a fresh id.
    pub fn new(title: impl Into<String>, description: impl Into<String>, role: AgentRole) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            goal_id: None,
            role,
            status: TaskStatus::Planned,
            priority: Priority::Medium,
            estimated_minutes: 30,
            dependencies: Vec::new(),
            required_capabilities: Vec::new(),
            success_criteria: Vec::new(),
            autonomous: false,
            manual: false,
            context: Map::new(),
            output: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            sequence: 0,
        }
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the dependency list.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Marks the task as safe to run unattended.
    #[must_use]
    pub fn autonomous(mut self, autonomous: bool) -> Self {
        self.autonomous = autonomous;
        self
    }

    /// Marks the task as manual-dispatch only.
    #[must_use]
    pub fn manual(mut self, manual: bool) -> Self {
        self.manual = manual;
        self
    }

    /// Links the task to a goal.
    #[must_use]
    pub fn for_goal(mut self, goal_id: impl Into<String>) -> Self {
        self.goal_id = Some(goal_id.into());
        self
    }

    /// Inserts a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Records a human-readable error reason.
    pub fn record_error(&mut self, reason: impl Into<String>) {
        self.context.insert("error".to_string(), Value::String(reason.into()));
    }

    /// Returns the recorded error reason, if any.
    pub fn error(&self) -> Option<&str> {
        self.context.get("error").and_then(Value::as_str)
    }

    /// Copy of this task with a fresh id, status `planned` and run data cleared.
    pub fn rerun_copy(&self) -> Self {
        let now = Utc::now();
        let mut copy = self.clone();
        copy.id = Uuid::new_v4().to_string();
        copy.status = TaskStatus::Planned;
        copy.output = None;
        copy.context.remove("error");
        copy.context.insert("rerun_of".to_string(), Value::String(self.id.clone()));
        copy.created_at = now;
        copy.updated_at = now;
        copy.started_at = None;
        copy.completed_at = None;
        copy
    }
}
