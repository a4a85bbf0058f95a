//! Durable state: goals, tasks, agents, workflows, logs and decisions.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::error::{StorageError, StorageResult};
use super::store::{JsonFileStore, MemoryStore, Store};
use crate::board::TaskBoard;
use crate::models::{Decision, FileEvent, Goal, Notification, RollingLog, Task, Worker, Workflow};

/// Goals keyed by id.
pub type GoalCollection = BTreeMap<String, Goal>;
/// Tasks keyed by id.
pub type TaskCollection = BTreeMap<String, Task>;
/// Workers keyed by role name.
pub type AgentCollection = BTreeMap<String, Worker>;
/// Workflows keyed by id.
pub type WorkflowCollection = BTreeMap<String, Workflow>;

/// One store per collection.
#[derive(Clone)]
pub struct StateStore {
    /// Goal collection.
    pub goals: Arc<dyn Store<GoalCollection>>,
    /// Task collection.
    pub tasks: Arc<dyn Store<TaskCollection>>,
    /// Agent registry.
    pub agents: Arc<dyn Store<AgentCollection>>,
    /// Workflow collection.
    pub workflows: Arc<dyn Store<WorkflowCollection>>,
    /// File event log.
    pub events: Arc<dyn Store<RollingLog<FileEvent>>>,
    /// Notification log.
    pub notifications: Arc<dyn Store<RollingLog<Notification>>>,
    /// Dispatch decision history.
    pub decisions: Arc<dyn Store<RollingLog<Decision>>>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("goals", &self.goals.name())
            .field("tasks", &self.tasks.name())
            .field("agents", &self.agents.name())
            .finish_non_exhaustive()
    }
}

/// Loads a collection, degrading to its default on any failure.
pub fn load_or_default<T: Default>(store: &dyn Store<T>) -> T {
    match store.load() {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(e) => {
            warn!(collection = %store.name(), error = %e, "Unreadable collection, starting empty");
            T::default()
        }
    }
}

impl StateStore {
    /// JSON-file stores under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        info!(state_dir = %dir.display(), "Opening state store");
        Self {
            goals: Arc::new(JsonFileStore::new(dir, "goals")),
            tasks: Arc::new(JsonFileStore::new(dir, "tasks")),
            agents: Arc::new(JsonFileStore::new(dir, "agents")),
            workflows: Arc::new(JsonFileStore::new(dir, "workflows")),
            events: Arc::new(JsonFileStore::new(dir, "file_events")),
            notifications: Arc::new(JsonFileStore::new(dir, "notifications")),
            decisions: Arc::new(JsonFileStore::new(dir, "decisions")),
        }
    }

    /// In-memory stores.
    pub fn in_memory() -> Self {
        Self {
            goals: Arc::new(MemoryStore::new("goals")),
            tasks: Arc::new(MemoryStore::new("tasks")),
            agents: Arc::new(MemoryStore::new("agents")),
            workflows: Arc::new(MemoryStore::new("workflows")),
            events: Arc::new(MemoryStore::new("file_events")),
            notifications: Arc::new(MemoryStore::new("notifications")),
            decisions: Arc::new(MemoryStore::new("decisions")),
        }
    }

    /// Loads the board, recovering from an unclean stop.
    pub fn load_board(&self) -> TaskBoard {
        let goals = load_or_default(self.goals.as_ref());
        let tasks = load_or_default(self.tasks.as_ref());
        let agents = load_or_default(self.agents.as_ref());
        let workflows = load_or_default(self.workflows.as_ref());
        let mut board = TaskBoard::from_parts(goals, tasks, agents.into_values(), workflows);
        board.recover();
        board
    }

    /// Saves every board collection.
    ///
    /// A failing collection does not stop the others from being written; the
    /// first error is returned.
    pub fn save_board(&self, board: &TaskBoard) -> StorageResult<()> {
        let agents: AgentCollection =
            board.workers().values().map(|w| (w.role.to_string(), w.clone())).collect();
        let results = [
            self.goals.save(board.goals()),
            self.tasks.save(board.tasks()),
            self.agents.save(&agents),
            self.workflows.save(board.workflows()),
        ];
        first_error(results)
    }

    /// Loads the event and notification logs with the given caps.
    pub fn load_logs(
        &self,
        event_cap: usize,
        notification_cap: usize,
    ) -> (RollingLog<FileEvent>, RollingLog<Notification>) {
        let mut events: RollingLog<FileEvent> = load_or_default(self.events.as_ref());
        events.set_capacity(event_cap);
        let mut notifications: RollingLog<Notification> =
            load_or_default(self.notifications.as_ref());
        notifications.set_capacity(notification_cap);
        (events, notifications)
    }

    /// Saves the event and notification logs.
    pub fn save_logs(
        &self,
        events: &RollingLog<FileEvent>,
        notifications: &RollingLog<Notification>,
    ) -> StorageResult<()> {
        first_error([self.events.save(events), self.notifications.save(notifications)])
    }

    /// Loads the decision history, keeping at most `cap` entries.
    pub fn load_decisions(&self, cap: usize) -> RollingLog<Decision> {
        let mut decisions: RollingLog<Decision> = load_or_default(self.decisions.as_ref());
        decisions.set_capacity(cap);
        decisions
    }

    /// Saves the decision history.
    pub fn save_decisions(&self, decisions: &RollingLog<Decision>) -> StorageResult<()> {
        self.decisions.save(decisions)
    }
}

fn first_error<const N: usize>(results: [StorageResult<()>; N]) -> StorageResult<()> {
    let mut first: Option<StorageError> = None;
    for result in results {
        if let Err(e) = result {
            error!(error = %e, "Failed to persist collection");
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}
