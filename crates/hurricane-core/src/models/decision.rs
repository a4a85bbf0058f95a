//! Dispatch decision history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use super::task::Task;

/// Why the scheduler started a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Picked up by autonomous dispatch.
    AutonomousExecution,
    /// Started for an execute request or a workflow.
    RequestedExecution,
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AutonomousExecution => "autonomous_execution",
            Self::RequestedExecution => "requested_execution",
        })
    }
}

/// One recorded dispatch decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Unique identifier.
    pub id: String,
    /// When the decision was taken.
    pub timestamp: DateTime<Utc>,
    /// What triggered the dispatch.
    pub kind: DecisionKind,
    /// Dispatched task.
    pub task_id: String,
    /// Title of the task at dispatch time.
    pub task_title: String,
    /// Human-readable reasoning.
    pub reasoning: String,
    /// Goal, role, capabilities and estimate of the task.
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl Decision {
    /// Records the dispatch of `task`.
    pub fn dispatch(kind: DecisionKind, task: &Task, strategy: &str) -> Self {
        let reasoning = match kind {
            DecisionKind::AutonomousExecution => {
                "Task is autonomous, its dependencies are complete and its worker is free"
            }
            DecisionKind::RequestedExecution => "Execution was requested and the worker is free",
        };
        let mut context = Map::new();
        context.insert("goal_id".to_string(), task.goal_id.clone().map_or(Value::Null, Value::String));
        context.insert("role".to_string(), Value::String(task.role.to_string()));
        context.insert("strategy".to_string(), Value::String(strategy.to_string()));
        context.insert(
            "required_capabilities".to_string(),
            Value::from(task.required_capabilities.clone()),
        );
        context.insert("estimated_minutes".to_string(), Value::from(task.estimated_minutes));
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            task_id: task.id.clone(),
            task_title: task.title.clone(),
            reasoning: reasoning.to_string(),
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentRole;

    #[test]
    fn test_dispatch_decision_context() {
        let task = Task::new("Add cache", "", AgentRole::Coder).for_goal("g1");
        let decision = Decision::dispatch(DecisionKind::AutonomousExecution, &task, "routed");
        assert_eq!(decision.task_id, task.id);
        assert_eq!(decision.context["goal_id"], "g1");
        assert_eq!(decision.context["role"], "coder");
        assert_eq!(decision.context["strategy"], "routed");

        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["kind"], "autonomous_execution");
    }
}
