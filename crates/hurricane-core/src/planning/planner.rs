//! Goal decomposition.

use chrono::{DateTime, Utc};
use hurricane_abstraction::{Model, ModelParameters};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::{PlanningError, Result};
use super::parser::{build_tasks, extract_tasks};
use crate::models::{AgentRole, Goal, Priority, Task};

/// System instruction describing the breakdown schema.
pub const PLANNER_SYSTEM_PROMPT: &str = r#"You are Hurricane's planning engine. You break software goals into concrete, executable tasks.

Respond with ONLY a JSON array. Each element must be an object with these fields:
- "title": short imperative title (string, required)
- "description": what exactly must be done (string)
- "priority": one of "critical", "high", "medium", "low"
- "role": one of "coordinator", "coder", "tester", "documenter", "reviewer", "deployer", "monitor"
- "estimated_minutes": integer effort estimate
- "dependencies": titles or 1-based positions of tasks in this array that must finish first
- "required_capabilities": capability names the role must have (e.g. "code_generation", "test_generation")
- "success_criteria": list of checks that prove the task is done
- "autonomous": true if the task is safe to run without a human confirming it first

Do not wrap the array in prose."#;

/// Input for a new goal.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalRequest {
    /// Short title; must not be blank.
    pub title: String,
    /// Description; must not be blank.
    pub description: String,
    /// What success looks like.
    pub target_outcome: String,
    /// Goal priority.
    pub priority: Priority,
    /// Optional deadline.
    pub deadline: Option<DateTime<Utc>>,
}

impl GoalRequest {
    /// Creates a medium-priority request without a deadline.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        target_outcome: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            target_outcome: target_outcome.into(),
            priority: Priority::Medium,
            deadline: None,
        }
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Rejects blank titles and descriptions.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(PlanningError::InvalidGoal("title must not be empty".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(PlanningError::InvalidGoal("description must not be empty".to_string()));
        }
        Ok(())
    }

    /// Builds the goal record.
    pub fn into_goal(self) -> Goal {
        Goal::new(
            self.title.trim(),
            self.description.trim(),
            self.target_outcome.trim(),
            self.priority,
            self.deadline,
        )
    }
}

/// Result of decomposing a goal.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakdown {
    /// Tasks in dependency order.
    pub tasks: Vec<Task>,
    /// True when generation failed and the single catch-all task was used.
    pub fallback: bool,
}

/// Decomposes goals into tasks using a text-generation model.
pub struct Planner {
    model: Arc<dyn Model>,
    parameters: ModelParameters,
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("model", &self.model.model_id())
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl Planner {
    /// Creates a planner with default generation parameters.
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model, parameters: ModelParameters::default() }
    }

    /// Creates a planner with custom generation parameters.
    pub fn with_parameters(model: Arc<dyn Model>, parameters: ModelParameters) -> Self {
        Self { model, parameters }
    }

    /// Asks the model for a breakdown and parses it.
    ///
    /// # Errors
    /// Returns `Generation` when the model call fails and `MalformedResponse`
    /// or `DependencyCycle` when the response cannot be used.
    pub async fn decompose(&self, goal: &Goal) -> Result<Vec<Task>> {
        let prompt = Self::create_prompt(goal);
        debug!(goal_id = %goal.id, model = %self.model.model_id(), "Requesting task breakdown");

        let response = self
            .model
            .generate_text(&prompt, Some(PLANNER_SYSTEM_PROMPT), Some(self.parameters.clone()))
            .await?;

        let raw = extract_tasks(&response.content)?;
        build_tasks(goal, &raw)
    }

    /// Decomposes a goal, falling back to one catch-all task on any failure.
    ///
    /// The result always holds at least one task.
    pub async fn plan(&self, goal: &Goal) -> Breakdown {
        match self.decompose(goal).await {
            Ok(tasks) => {
                info!(goal_id = %goal.id, tasks = tasks.len(), "Goal decomposed");
                Breakdown { tasks, fallback: false }
            }
            Err(e) => {
                warn!(goal_id = %goal.id, error = %e, "Decomposition failed, using fallback task");
                Breakdown { tasks: vec![Self::fallback_task(goal, &e)], fallback: true }
            }
        }
    }

    /// The catch-all task used when decomposition fails; it always needs review.
    pub fn fallback_task(goal: &Goal, error: &PlanningError) -> Task {
        let mut task = Task::new(
            format!("Work on: {}", goal.title),
            goal.description.clone(),
            AgentRole::Coordinator,
        )
        .for_goal(&goal.id)
        .with_priority(goal.priority)
        .autonomous(false)
        .with_context("fallback", Value::Bool(true))
        .with_context("planning_error", Value::String(error.to_string()));
        task.estimated_minutes = 60;
        task.required_capabilities = vec!["ollama".to_string()];
        task.success_criteria =
            if goal.target_outcome.is_empty() { Vec::new() } else { vec![goal.target_outcome.clone()] };
        task
    }

    fn create_prompt(goal: &Goal) -> String {
        let deadline = goal
            .deadline
            .map_or_else(|| "none".to_string(), |d| d.format("%Y-%m-%d %H:%M UTC").to_string());
        format!(
            r#"Break the following goal into 3-8 concrete tasks.

GOAL: {title}
DESCRIPTION: {description}
TARGET OUTCOME: {outcome}
PRIORITY: {priority}
DEADLINE: {deadline}

Order tasks so that foundations come first. Mark a task autonomous only if it
can be completed safely without a human reviewing it first. Use dependencies
to express ordering; tasks without dependencies may run in parallel.

Respond with the JSON array now:"#,
            title = goal.title,
            description = goal.description,
            outcome = goal.target_outcome,
            priority = goal.priority,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hurricane_abstraction::ModelError;
    use hurricane_models::MockModel;

    fn goal() -> Goal {
        GoalRequest::new("Release v2", "Cut the v2 release", "v2 tagged")
            .with_priority(Priority::High)
            .into_goal()
    }

    #[test]
    fn test_validate() {
        assert!(GoalRequest::new("t", "d", "o").validate().is_ok());
        assert!(matches!(
            GoalRequest::new("  ", "d", "o").validate(),
            Err(PlanningError::InvalidGoal(_))
        ));
        assert!(GoalRequest::new("t", "", "o").validate().is_err());
    }

    #[tokio::test]
    async fn test_plan_parses_breakdown() {
        let model = Arc::new(MockModel::with_responses(
            "mock",
            [r#"[{"title": "Bump version", "role": "coder", "autonomous": true},
                 {"title": "Tag", "role": "deployer", "dependencies": [1]}]"#],
        ));
        let planner = Planner::new(model.clone());
        let goal = goal();
        let breakdown = planner.plan(&goal).await;

        assert!(!breakdown.fallback);
        assert_eq!(breakdown.tasks.len(), 2);
        assert_eq!(breakdown.tasks[1].dependencies, vec![breakdown.tasks[0].id.clone()]);
        assert!(model.prompts()[0].contains("GOAL: Release v2"));
    }

    #[tokio::test]
    async fn test_unparseable_response_falls_back() {
        let model = Arc::new(MockModel::with_responses("mock", ["Sure! Here are some ideas..."]));
        let planner = Planner::new(model);
        let goal = goal();
        let breakdown = planner.plan(&goal).await;

        assert!(breakdown.fallback);
        assert_eq!(breakdown.tasks.len(), 1);
        let task = &breakdown.tasks[0];
        assert_eq!(task.title, "Work on: Release v2");
        assert!(!task.autonomous);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.goal_id.as_deref(), Some(goal.id.as_str()));
        assert_eq!(task.success_criteria, vec!["v2 tagged".to_string()]);
        assert_eq!(task.context.get("fallback"), Some(&Value::Bool(true)));
        assert!(task.context.get("planning_error").and_then(Value::as_str).unwrap().contains("Malformed"));
    }

    #[tokio::test]
    async fn test_model_failure_falls_back() {
        let planner = Planner::new(Arc::new(MockModel::failing("mock", ModelError::Timeout(30))));
        let breakdown = planner.plan(&goal()).await;
        assert!(breakdown.fallback);
        assert!(breakdown.tasks[0].role.supports_all(&breakdown.tasks[0].required_capabilities));
    }

    #[tokio::test]
    async fn test_decompose_surfaces_error() {
        let planner = Planner::new(Arc::new(MockModel::with_responses("mock", ["[]"])));
        assert!(matches!(
            planner.decompose(&goal()).await,
            Err(PlanningError::MalformedResponse(_))
        ));
    }
}
