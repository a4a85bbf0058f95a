//! Workflow validation, instantiation and progress tracking.

use hurricane_core::{Task, TaskBoard, TaskStatus, Workflow, WorkflowStatus, WorkflowStep};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OrchestrationError, Result};

/// Outcome of a workflow execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowReport {
    /// Workflow id.
    pub workflow_id: String,
    /// Final status.
    pub status: WorkflowStatus,
    /// Completed task ids.
    pub completed: Vec<String>,
    /// Failed task ids.
    pub failed: Vec<String>,
    /// Blocked task ids; these can be requeued.
    pub blocked: Vec<String>,
    /// Task ids cancelled after a failure.
    pub cancelled: Vec<String>,
}

fn step_graph(steps: &[WorkflowStep]) -> DiGraph<usize, ()> {
    let mut graph = DiGraph::new();
    let nodes: Vec<_> = (0..steps.len()).map(|i| graph.add_node(i)).collect();
    for (i, step) in steps.iter().enumerate() {
        for &dep in &step.dependencies {
            if dep < steps.len() {
                graph.add_edge(nodes[dep], nodes[i], ());
            }
        }
    }
    graph
}

/// Checks a workflow definition.
///
/// # Errors
/// Returns `InvalidWorkflow` for an empty name, no steps, a dependency on an
/// unknown position or on the step itself, or a dependency cycle.
pub fn validate(name: &str, steps: &[WorkflowStep]) -> Result<()> {
    if name.trim().is_empty() {
        return Err(OrchestrationError::InvalidWorkflow("name must not be empty".to_string()));
    }
    if steps.is_empty() {
        return Err(OrchestrationError::InvalidWorkflow("at least one step is required".to_string()));
    }
    for (i, step) in steps.iter().enumerate() {
        if step.title.trim().is_empty() {
            return Err(OrchestrationError::InvalidWorkflow(format!("step {} has no title", i)));
        }
        for &dep in &step.dependencies {
            if dep == i {
                return Err(OrchestrationError::InvalidWorkflow(format!("step {} depends on itself", i)));
            }
            if dep >= steps.len() {
                return Err(OrchestrationError::InvalidWorkflow(format!(
                    "step {} depends on unknown step {}",
                    i, dep
                )));
            }
        }
    }
    if petgraph::algo::is_cyclic_directed(&step_graph(steps)) {
        return Err(OrchestrationError::InvalidWorkflow("step dependencies form a cycle".to_string()));
    }
    Ok(())
}

/// Creates the workflow's tasks in dependency order.
///
/// Tasks are `planned` and `manual`, carry `context.workflow_id`, and their
/// dependencies point at the new task ids.
pub fn instantiate(workflow: &Workflow) -> Result<Vec<Task>> {
    let graph = step_graph(&workflow.steps);
    let order = toposort(&graph, None).map_err(|_| {
        OrchestrationError::InvalidWorkflow("step dependencies form a cycle".to_string())
    })?;

    let mut tasks: Vec<Task> = workflow
        .steps
        .iter()
        .map(|step| {
            let mut task = Task::new(step.title.clone(), step.description.clone(), step.role)
                .with_priority(step.priority)
                .manual(true);
            task.context.clone_from(&step.context);
            task.context.insert("workflow_id".to_string(), Value::String(workflow.id.clone()));
            task
        })
        .collect();
    let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
    for (task, step) in tasks.iter_mut().zip(&workflow.steps) {
        task.dependencies = step.dependencies.iter().map(|&dep| ids[dep].clone()).collect();
    }

    let mut slots: Vec<Option<Task>> = tasks.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|node| slots[graph[node]].take()).collect())
}

/// Tracks a running workflow inside the scheduler loop.
#[derive(Debug, Clone)]
pub(crate) struct WorkflowRun {
    pub(crate) workflow_id: String,
    pub(crate) task_ids: Vec<String>,
    pub(crate) halted: bool,
}

impl WorkflowRun {
    pub(crate) fn new(workflow_id: String, task_ids: Vec<String>) -> Self {
        Self { workflow_id, task_ids, halted: false }
    }

    fn statuses<'a>(&'a self, board: &'a TaskBoard) -> impl Iterator<Item = (&'a String, Option<TaskStatus>)> {
        self.task_ids.iter().map(|id| (id, board.task(id).map(|t| t.status)))
    }

    /// On the first failed or blocked task, halts the run and returns the
    /// not-yet-started tasks to cancel.
    pub(crate) fn halt_targets(&mut self, board: &TaskBoard) -> Vec<String> {
        if self.halted {
            return Vec::new();
        }
        let broken = self
            .statuses(board)
            .any(|(_, s)| matches!(s, Some(TaskStatus::Failed | TaskStatus::Blocked) | None));
        if !broken {
            return Vec::new();
        }
        self.halted = true;
        self.statuses(board)
            .filter(|(_, s)| *s == Some(TaskStatus::Planned))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Whether nothing in the run can still change on its own.
    pub(crate) fn is_finished(&self, board: &TaskBoard) -> bool {
        self.statuses(board).all(|(_, s)| match s {
            Some(status) if status.is_terminal() => true,
            Some(status) if status.is_active() || status == TaskStatus::Planned => false,
            _ => self.halted,
        })
    }

    pub(crate) fn report(&self, board: &TaskBoard) -> WorkflowReport {
        let mut report = WorkflowReport {
            workflow_id: self.workflow_id.clone(),
            status: WorkflowStatus::Completed,
            completed: Vec::new(),
            failed: Vec::new(),
            blocked: Vec::new(),
            cancelled: Vec::new(),
        };
        for (id, status) in self.statuses(board) {
            match status {
                Some(TaskStatus::Completed) => report.completed.push(id.clone()),
                Some(TaskStatus::Blocked) => report.blocked.push(id.clone()),
                Some(TaskStatus::Cancelled) => report.cancelled.push(id.clone()),
                _ => report.failed.push(id.clone()),
            }
        }
        if report.completed.len() != self.task_ids.len() {
            report.status = WorkflowStatus::Failed;
        }
        report
    }
}
