//! Error types for Hurricane Core.

use crate::config::ConfigError;
use crate::models::{AgentRole, TaskStatus};
use crate::monitoring::MonitorError;
use crate::planning::PlanningError;
use crate::storage::StorageError;
use thiserror::Error;

/// Core error type for Hurricane operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Planning errors
    #[error("Planning error: {0}")]
    Planning(#[from] PlanningError),

    /// Monitoring errors
    #[error("Monitoring error: {0}")]
    Monitor(#[from] MonitorError),

    /// No task with this id
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// No goal with this id
    #[error("Goal not found: {0}")]
    GoalNotFound(String),

    /// State machine rejected a transition
    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        /// Task id.
        task_id: String,
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },

    /// A dependency is not completed
    #[error("Task {task_id} has unmet dependency {dependency}")]
    DependencyUnmet {
        /// Task id.
        task_id: String,
        /// First unmet dependency.
        dependency: String,
    },

    /// The role's worker already holds a task
    #[error("Worker {role} is busy with task {current}")]
    WorkerBusy {
        /// Worker role.
        role: AgentRole,
        /// Task the worker holds.
        current: String,
    },

    /// No worker can execute the task
    #[error("Unsupported task: {0}")]
    UnsupportedTask(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
