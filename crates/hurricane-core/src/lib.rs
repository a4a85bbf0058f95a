//! Hurricane Core - state, planning and monitoring for the task orchestrator.
//!
//! This crate provides:
//! - The data model (goals, tasks, workers, workflows, events, notifications)
//! - The [`TaskBoard`] that enforces the task state machine
//! - Whole-collection JSON persistence
//! - Goal decomposition through a text-generation model
//! - File watching and notification rules
//!
//! # Example
//!
//! ```rust,no_run
//! use hurricane_core::{HurricaneConfig, StateStore};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HurricaneConfig::load(Path::new("hurricane.toml"))?;
//!     let store = StateStore::open(config.storage.resolve(Path::new(".")));
//!     let board = store.load_board();
//!     println!("{} tasks", board.tasks().len());
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod config;
pub mod error;
pub mod models;
pub mod monitoring;
pub mod planning;
pub mod storage;

pub use board::TaskBoard;
pub use config::{
    ConfigError, HurricaneConfig, ModelSettings, MonitorSettings, SchedulerSettings,
    StorageSettings,
};
pub use error::{CoreError, Result};
pub use models::{
    AgentRole, Decision, DecisionKind, FileEvent, FileEventKind, Goal, GoalStatus, Notification, NotificationKind,
    Priority, RollingLog, SHARED_TOOLS, Severity, Task, TaskStatus, Worker, WorkerMetrics,
    Workflow, WorkflowStatus, WorkflowStep,
};
pub use monitoring::{EventCallback, EventSource, IgnoreSet, MonitorError, NotificationEngine};
pub use planning::{Breakdown, GoalRequest, Planner, PlanningError, suggest_next};
pub use storage::{JsonFileStore, MemoryStore, StateStore, StorageError, Store};
