//! Persistence for orchestration state.
//!
//! Every collection is read and written as a whole through the [`Store`]
//! trait, so the JSON files can be swapped for an embedded database without
//! touching the scheduler or planner.

mod error;
mod state;
mod store;

pub use error::{StorageError, StorageResult};
pub use state::{
    AgentCollection, GoalCollection, StateStore, TaskCollection, WorkflowCollection,
    load_or_default,
};
pub use store::{JsonFileStore, MemoryStore, Store};
