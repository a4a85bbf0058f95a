//! Workflow definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::agent::AgentRole;
use super::priority::Priority;

/// Status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created, not yet executed.
    #[default]
    Pending,
    /// Tasks created and dispatching.
    Running,
    /// Every task completed.
    Completed,
    /// A task failed or blocked; remaining tasks were cancelled.
    Failed,
}

/// One task definition inside a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Task title.
    pub title: String,
    /// Task description.
    #[serde(default)]
    pub description: String,
    /// Role that executes the step.
    pub role: AgentRole,
    /// Priority of the created task.
    #[serde(default)]
    pub priority: Priority,
    /// 0-based positions of steps this step depends on.
    #[serde(default)]
    pub dependencies: Vec<usize>,
    /// Context copied into the created task.
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl WorkflowStep {
    /// Creates a step with no dependencies.
    pub fn new(title: impl Into<String>, role: AgentRole) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            role,
            priority: Priority::Medium,
            dependencies: Vec::new(),
            context: Map::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the workflow-local dependencies.
    #[must_use]
    pub fn after(mut self, dependencies: &[usize]) -> Self {
        self.dependencies = dependencies.to_vec();
        self
    }

    /// Inserts a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// A named, pre-structured group of tasks executed as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Ordered step definitions.
    pub steps: Vec<WorkflowStep>,
    /// Current status.
    #[serde(default)]
    pub status: WorkflowStatus,
    /// Ids of the tasks created on execution, by step position.
    #[serde(default)]
    pub task_ids: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Creates a pending workflow with a fresh id.
    pub fn new(name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            steps,
            status: WorkflowStatus::Pending,
            task_ids: Vec::new(),
            created_at: Utc::now(),
        }
    }
}
