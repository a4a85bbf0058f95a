//! Pluggable per-role task execution.
//!
//! The scheduler only sees [`ExecutionStrategy`]; what a role actually does
//! with a task (ask the model, run a command, something else) lives here.

use async_trait::async_trait;
use hurricane_abstraction::{Model, ModelError, ModelParameters};
use hurricane_core::{AgentRole, Task};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Error returned by a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Retrying later may succeed; the task becomes `blocked`.
    #[error("{0}")]
    Transient(String),

    /// The task cannot succeed as specified; the task becomes `failed`.
    #[error("{0}")]
    Failed(String),
}

impl From<ModelError> for ExecutionError {
    fn from(error: ModelError) -> Self {
        if error.is_transient() {
            Self::Transient(error.to_string())
        } else {
            Self::Failed(error.to_string())
        }
    }
}

/// Executes one task and returns its output.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    /// Runs the task to completion.
    ///
    /// # Errors
    /// Returns `Transient` for retryable failures and `Failed` otherwise.
    async fn execute(&self, task: &Task) -> Result<Value, ExecutionError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Output key under which a role's model response is stored.
pub fn output_key(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Coordinator => "coordination_result",
        AgentRole::Coder => "code_response",
        AgentRole::Tester => "test_strategy",
        AgentRole::Documenter => "documentation",
        AgentRole::Reviewer => "review_result",
        AgentRole::Deployer => "deployment_result",
        AgentRole::Monitor => "monitoring_result",
    }
}

/// System instruction for a role's model calls.
pub fn role_system_prompt(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Coordinator => {
            "You are Hurricane's coordinator. Plan the work, call out risks and list the concrete next steps."
        }
        AgentRole::Coder => {
            "You are Hurricane's coder. Produce the code that satisfies the task, with brief notes on design choices."
        }
        AgentRole::Tester => {
            "You are Hurricane's tester. Describe the test strategy and write the test cases that prove the task is done."
        }
        AgentRole::Documenter => {
            "You are Hurricane's documenter. Write clear, accurate documentation for the described change."
        }
        AgentRole::Reviewer => {
            "You are Hurricane's reviewer. Review the described change for bugs, security problems and style issues."
        }
        AgentRole::Deployer => {
            "You are Hurricane's deployer. Give the exact deployment steps, verification checks and rollback plan."
        }
        AgentRole::Monitor => {
            "You are Hurricane's monitor. Describe what to watch, the thresholds that matter and how to respond."
        }
    }
}

/// Asks the text-generation model to carry out the task.
pub struct ModelStrategy {
    model: Arc<dyn Model>,
    parameters: ModelParameters,
}

impl std::fmt::Debug for ModelStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStrategy").field("model", &self.model.model_id()).finish_non_exhaustive()
    }
}

impl ModelStrategy {
    /// Creates a strategy with default generation parameters.
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model, parameters: ModelParameters::default() }
    }

    /// Overrides the generation parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: ModelParameters) -> Self {
        self.parameters = parameters;
        self
    }

    fn create_prompt(task: &Task) -> String {
        let criteria = if task.success_criteria.is_empty() {
            "- none given".to_string()
        } else {
            task.success_criteria.iter().map(|c| format!("- {}", c)).collect::<Vec<_>>().join("\n")
        };
        let context = if task.context.is_empty() {
            "{}".to_string()
        } else {
            serde_json::to_string_pretty(&task.context).unwrap_or_else(|_| "{}".to_string())
        };
        format!(
            r#"TASK: {title}

DESCRIPTION:
{description}

SUCCESS CRITERIA:
{criteria}

CONTEXT:
{context}"#,
            title = task.title,
            description = task.description,
        )
    }
}

#[async_trait]
impl ExecutionStrategy for ModelStrategy {
    async fn execute(&self, task: &Task) -> Result<Value, ExecutionError> {
        let prompt = Self::create_prompt(task);
        debug!(task_id = %task.id, role = %task.role, model = %self.model.model_id(), "Executing task with model");
        let response = self
            .model
            .generate_text(&prompt, Some(role_system_prompt(task.role)), Some(self.parameters.clone()))
            .await?;

        let mut output = serde_json::Map::new();
        output.insert(output_key(task.role).to_string(), Value::String(response.content));
        output.insert("task_type".to_string(), Value::String(task.role.to_string()));
        output.insert(
            "model".to_string(),
            Value::String(response.model_id.unwrap_or_else(|| self.model.model_id().to_string())),
        );
        Ok(Value::Object(output))
    }

    fn name(&self) -> &str {
        "model"
    }
}

/// Runs `context.command` as an external process in the project root.
///
/// The command is either an array `[program, arg, ...]` or a string that is
/// split on whitespace.
#[derive(Debug, Clone)]
pub struct CommandStrategy {
    root: PathBuf,
    timeout: Duration,
}

impl CommandStrategy {
    /// Creates a strategy running commands in `root`.
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { root: root.into(), timeout }
    }

    /// Parses `context.command` into program and arguments.
    pub fn command_line(task: &Task) -> Result<(String, Vec<String>), ExecutionError> {
        let parts: Vec<String> = match task.context.get("command") {
            Some(Value::String(line)) => line.split_whitespace().map(ToString::to_string).collect(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(ExecutionError::Failed(format!("Invalid command argument: {}", other))),
                })
                .collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(ExecutionError::Failed(format!("Invalid command: {}", other)));
            }
            None => return Err(ExecutionError::Failed("Task has no command".to_string())),
        };
        let mut parts = parts.into_iter();
        let program = parts.next().ok_or_else(|| ExecutionError::Failed("Empty command".to_string()))?;
        Ok((program, parts.collect()))
    }
}

#[async_trait]
impl ExecutionStrategy for CommandStrategy {
    async fn execute(&self, task: &Task) -> Result<Value, ExecutionError> {
        let (program, args) = Self::command_line(task)?;
        debug!(task_id = %task.id, program = %program, args = ?args, "Running command");

        let child = Command::new(&program)
            .args(&args)
            .current_dir(&self.root)
            .kill_on_drop(true)
            .output();
        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ExecutionError::Failed(format!("Failed to run '{}': {}", program, e)));
            }
            Err(_) => {
                warn!(task_id = %task.id, program = %program, "Command timed out");
                return Err(ExecutionError::Transient(format!(
                    "Command '{}' timed out after {}ms",
                    program,
                    self.timeout.as_millis()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code();
        if !output.status.success() {
            let detail = stderr.trim();
            return Err(ExecutionError::Failed(match exit_code {
                Some(code) if detail.is_empty() => format!("'{}' exited with code {}", program, code),
                Some(code) => format!("'{}' exited with code {}: {}", program, code, detail),
                None => format!("'{}' was terminated by a signal", program),
            }));
        }
        Ok(json!({ "stdout": stdout, "stderr": stderr, "exit_code": exit_code }))
    }

    fn name(&self) -> &str {
        "command"
    }
}

/// Runs tasks that carry a `command` as processes and everything else through the model.
#[derive(Debug)]
pub struct RoutedStrategy {
    model: ModelStrategy,
    command: CommandStrategy,
}

impl RoutedStrategy {
    /// Creates a routed strategy.
    pub fn new(model: ModelStrategy, command: CommandStrategy) -> Self {
        Self { model, command }
    }
}

#[async_trait]
impl ExecutionStrategy for RoutedStrategy {
    async fn execute(&self, task: &Task) -> Result<Value, ExecutionError> {
        if task.context.contains_key("command") {
            self.command.execute(task).await
        } else {
            self.model.execute(task).await
        }
    }

    fn name(&self) -> &str {
        "routed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hurricane_models::MockModel;

    fn command_task(command: Value) -> Task {
        Task::new("Run", "", AgentRole::Tester).with_context("command", command)
    }

    #[test]
    fn test_model_error_classification() {
        assert!(matches!(
            ExecutionError::from(ModelError::Timeout(30)),
            ExecutionError::Transient(_)
        ));
        assert!(matches!(
            ExecutionError::from(ModelError::RequestError("down".to_string())),
            ExecutionError::Transient(_)
        ));
        assert!(matches!(
            ExecutionError::from(ModelError::ModelResponseError("no model".to_string())),
            ExecutionError::Failed(_)
        ));
    }

    #[test]
    fn test_output_keys_are_distinct() {
        let keys: std::collections::HashSet<&str> =
            AgentRole::ALL.into_iter().map(output_key).collect();
        assert_eq!(keys.len(), AgentRole::ALL.len());
        assert_eq!(output_key(AgentRole::Coder), "code_response");
    }

    #[tokio::test]
    async fn test_model_strategy_output() {
        let model = Arc::new(MockModel::with_responses("mock", ["fn main() {}"]));
        let strategy = ModelStrategy::new(model.clone());
        let task = Task::new("Write main", "Entry point", AgentRole::Coder);

        let output = strategy.execute(&task).await.unwrap();
        assert_eq!(output["code_response"], "fn main() {}");
        assert_eq!(output["task_type"], "coder");
        assert_eq!(output["model"], "mock");

        let prompts = model.prompts();
        assert!(prompts[0].contains("TASK: Write main"));
        assert!(prompts[0].contains("Entry point"));
    }

    #[tokio::test]
    async fn test_model_strategy_transient_failure() {
        let model = Arc::new(MockModel::failing("mock", ModelError::Timeout(5)));
        let strategy = ModelStrategy::new(model);
        let task = Task::new("Review", "", AgentRole::Reviewer);
        let err = strategy.execute(&task).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Transient(_)));
    }

    #[test]
    fn test_command_line_parsing() {
        let (program, args) = CommandStrategy::command_line(&command_task(json!("cargo test --all"))).unwrap();
        assert_eq!(program, "cargo");
        assert_eq!(args, vec!["test", "--all"]);

        let (program, args) = CommandStrategy::command_line(&command_task(json!(["echo", "a b"]))).unwrap();
        assert_eq!(program, "echo");
        assert_eq!(args, vec!["a b"]);

        assert!(CommandStrategy::command_line(&command_task(json!(""))).is_err());
        assert!(CommandStrategy::command_line(&command_task(json!([1]))).is_err());
        assert!(CommandStrategy::command_line(&Task::new("x", "", AgentRole::Tester)).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_strategy_success_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = CommandStrategy::new(dir.path(), Duration::from_secs(10));

        let output = strategy.execute(&command_task(json!(["echo", "hello"]))).await.unwrap();
        assert_eq!(output["stdout"], "hello\n");
        assert_eq!(output["exit_code"], 0);

        let err = strategy.execute(&command_task(json!(["false"]))).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Failed(_)));

        let err = strategy
            .execute(&command_task(json!(["definitely-not-a-real-program-hurricane"])))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Failed(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = CommandStrategy::new(dir.path(), Duration::from_millis(100));
        let err = strategy.execute(&command_task(json!(["sleep", "5"]))).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Transient(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_routed_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(MockModel::new("mock"));
        let routed = RoutedStrategy::new(
            ModelStrategy::new(model.clone()),
            CommandStrategy::new(dir.path(), Duration::from_secs(10)),
        );

        let output = routed.execute(&command_task(json!("echo routed"))).await.unwrap();
        assert_eq!(output["stdout"], "routed\n");
        assert_eq!(model.call_count(), 0);

        let output = routed.execute(&Task::new("Think", "", AgentRole::Tester)).await.unwrap();
        assert!(output["test_strategy"].as_str().unwrap().starts_with("Mock response for:"));
        assert_eq!(model.call_count(), 1);
    }
}
