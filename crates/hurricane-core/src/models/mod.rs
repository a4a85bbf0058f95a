//! Core data model.

pub mod agent;
pub mod decision;
pub mod event;
pub mod goal;
pub mod log;
pub mod priority;
pub mod task;
pub mod workflow;

pub use agent::{AgentRole, SHARED_TOOLS, Worker, WorkerMetrics};
pub use decision::{Decision, DecisionKind};
pub use event::{FileEvent, FileEventKind, Notification, NotificationKind, Severity};
pub use goal::{Goal, GoalStatus};
pub use log::RollingLog;
pub use priority::Priority;
pub use task::{Task, TaskStatus};
pub use workflow::{Workflow, WorkflowStatus, WorkflowStep};
