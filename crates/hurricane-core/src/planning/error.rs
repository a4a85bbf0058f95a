//! Errors produced while decomposing goals.

use hurricane_abstraction::ModelError;
use thiserror::Error;

/// Planning error.
#[derive(Debug, Error)]
pub enum PlanningError {
    /// Goal input rejected before anything was persisted.
    #[error("Invalid goal: {0}")]
    InvalidGoal(String),

    /// The text-generation service failed.
    #[error("Generation failed: {0}")]
    Generation(#[from] ModelError),

    /// The response could not be parsed into the task schema.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Dependencies in the response form a cycle.
    #[error("Dependency cycle between planned tasks: {0}")]
    DependencyCycle(String),
}

/// Result type for planning operations.
pub type Result<T> = std::result::Result<T, PlanningError>;
