//! Worker roles and the workers bound to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Capabilities every worker has regardless of role.
pub const SHARED_TOOLS: &[&str] = &["ollama", "shell", "filesystem"];

/// Role a worker is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Plans and coordinates other work.
    Coordinator,
    /// Writes and fixes code.
    Coder,
    /// Writes and runs tests.
    Tester,
    /// Writes documentation.
    Documenter,
    /// Reviews code and architecture.
    Reviewer,
    /// Handles deployment and infrastructure.
    Deployer,
    /// Watches system health.
    Monitor,
}

impl AgentRole {
    /// All roles, in the order workers are created.
    pub const ALL: [AgentRole; 7] = [
        Self::Coordinator,
        Self::Coder,
        Self::Tester,
        Self::Documenter,
        Self::Reviewer,
        Self::Deployer,
        Self::Monitor,
    ];

    /// Capabilities advertised by this role.
    pub fn capabilities(self) -> &'static [&'static str] {
        match self {
            Self::Coordinator => &[
                "task_planning",
                "workflow_orchestration",
                "resource_allocation",
                "conflict_resolution",
                "progress_monitoring",
            ],
            Self::Coder => &[
                "code_generation",
                "debugging",
                "refactoring",
                "optimization",
                "architecture_design",
                "code_review",
            ],
            Self::Tester => &[
                "test_generation",
                "test_execution",
                "coverage_analysis",
                "performance_testing",
                "integration_testing",
                "bug_detection",
            ],
            Self::Documenter => &[
                "documentation_generation",
                "api_documentation",
                "readme_creation",
                "code_commenting",
                "tutorial_writing",
                "changelog_maintenance",
            ],
            Self::Reviewer => &[
                "code_review",
                "architecture_review",
                "security_audit",
                "performance_analysis",
                "best_practices_enforcement",
                "quality_gates",
            ],
            Self::Deployer => &[
                "deployment_automation",
                "ci_cd_setup",
                "infrastructure_management",
                "environment_configuration",
                "monitoring_setup",
                "rollback_management",
            ],
            Self::Monitor => &[
                "system_monitoring",
                "performance_tracking",
                "error_detection",
                "alert_management",
                "health_checks",
                "metrics_collection",
            ],
        }
    }

    /// Whether this role advertises `capability` (shared tools count).
    pub fn supports(self, capability: &str) -> bool {
        SHARED_TOOLS.contains(&capability) || self.capabilities().contains(&capability)
    }

    /// Whether this role advertises every capability in `required`.
    pub fn supports_all<S: AsRef<str>>(self, required: &[S]) -> bool {
        required.iter().all(|c| self.supports(c.as_ref()))
    }

    /// First role (in [`AgentRole::ALL`] order) that supports every capability.
    pub fn infer<S: AsRef<str>>(required: &[S]) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.supports_all(required))
    }

    /// Returns the snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::Coder => "coder",
            Self::Tester => "tester",
            Self::Documenter => "documenter",
            Self::Reviewer => "reviewer",
            Self::Deployer => "deployer",
            Self::Monitor => "monitor",
        }
    }

    /// Display name of the worker bound to this role.
    pub fn worker_name(self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        let capitalized = chars
            .next()
            .map(|c| c.to_uppercase().chain(chars).collect::<String>())
            .unwrap_or_default();
        format!("Hurricane {}", capitalized)
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coordinator" => Ok(Self::Coordinator),
            "coder" | "developer" => Ok(Self::Coder),
            "tester" => Ok(Self::Tester),
            "documenter" | "writer" => Ok(Self::Documenter),
            "reviewer" => Ok(Self::Reviewer),
            "deployer" => Ok(Self::Deployer),
            "monitor" => Ok(Self::Monitor),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cumulative execution metrics for a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    /// Tasks that reached `completed`.
    pub tasks_completed: u64,
    /// Tasks that ended `failed` or `blocked`.
    pub tasks_failed: u64,
    /// `tasks_completed / (tasks_completed + tasks_failed)`, 1.0 before any run.
    pub success_rate: f64,
    /// Running average of completed task durations.
    pub avg_completion_ms: f64,
}

impl Default for WorkerMetrics {
    fn default() -> Self {
        Self { tasks_completed: 0, tasks_failed: 0, success_rate: 1.0, avg_completion_ms: 0.0 }
    }
}

impl WorkerMetrics {
    /// Records the outcome of one run.
    pub fn record(&mut self, success: bool, elapsed_ms: u64) {
        if success {
            let n = self.tasks_completed as f64;
            self.avg_completion_ms = self.avg_completion_ms.mul_add(n, elapsed_ms as f64) / (n + 1.0);
            self.tasks_completed += 1;
        } else {
            self.tasks_failed += 1;
        }
        let total = self.tasks_completed + self.tasks_failed;
        self.success_rate = self.tasks_completed as f64 / total as f64;
    }
}

/// A single-concurrency executor bound to a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    /// Role this worker serves.
    pub role: AgentRole,
    /// Display name.
    pub name: String,
    /// Advertised capabilities.
    pub capabilities: Vec<String>,
    /// Task currently held; `None` means idle.
    pub current_task: Option<String>,
    /// Cumulative metrics.
    #[serde(default)]
    pub metrics: WorkerMetrics,
    /// Inactive workers are never dispatched to.
    pub active: bool,
    /// When the worker was first created.
    pub created_at: DateTime<Utc>,
}

impl Worker {
    /// Creates an idle, active worker for `role`.
    pub fn new(role: AgentRole) -> Self {
        Self {
            role,
            name: role.worker_name(),
            capabilities: role.capabilities().iter().map(ToString::to_string).collect(),
            current_task: None,
            metrics: WorkerMetrics::default(),
            active: true,
            created_at: Utc::now(),
        }
    }

    /// A worker is busy exactly while it holds a task.
    pub fn is_busy(&self) -> bool {
        self.current_task.is_some()
    }
}
