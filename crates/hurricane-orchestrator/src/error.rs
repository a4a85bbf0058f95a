// Error types for orchestration

use hurricane_abstraction::ModelError;
use hurricane_core::CoreError;
use thiserror::Error;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Board, storage, planning or monitoring error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The text-generation service could not be set up
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// The scheduler loop is no longer accepting commands
    #[error("Scheduler is stopped")]
    SchedulerStopped,

    /// No workflow with this id
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Workflow definition or state does not allow the request
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// Task execution could not be carried out
    #[error("Execution error: {0}")]
    Execution(String),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for OrchestrationError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::SchedulerStopped
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for OrchestrationError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::SchedulerStopped
    }
}
