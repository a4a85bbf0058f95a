//! Goal data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use super::priority::Priority;

/// Status of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    /// Still being worked on.
    #[default]
    Active,
    /// Every task completed.
    Completed,
    /// Explicitly given up.
    Abandoned,
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        })
    }
}

/// A durable high-level objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Unique identifier.
    pub id: String,
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// What success looks like.
    pub target_outcome: String,
    /// Goal priority; the fallback task inherits it.
    #[serde(default)]
    pub priority: Priority,
    /// Optional deadline.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    /// Current status.
    #[serde(default)]
    pub status: GoalStatus,
    /// Percentage of owned tasks that are completed.
    #[serde(default)]
    pub progress: f64,
    /// Owned task ids, in creation order.
    #[serde(default)]
    pub task_ids: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// When the goal reached 100%.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Free-form context.
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl Goal {
    /// Creates an active goal with a fresh id.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        target_outcome: impl Into<String>,
        priority: Priority,
        deadline: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            target_outcome: target_outcome.into(),
            priority,
            deadline,
            status: GoalStatus::Active,
            progress: 0.0,
            task_ids: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            context: Map::new(),
        }
    }

    /// Sets progress from task counts and completes the goal at 100%.
    ///
    /// Abandoned goals keep their status but still report progress.
    pub fn apply_progress(&mut self, completed: usize, total: usize) {
        let progress = if total == 0 { 0.0 } else { completed as f64 / total as f64 * 100.0 };
        if (progress - self.progress).abs() > f64::EPSILON {
            self.progress = progress;
            self.updated_at = Utc::now();
        }
        if total > 0 && completed == total && self.status == GoalStatus::Active {
            self.status = GoalStatus::Completed;
            self.completed_at = Some(Utc::now());
            self.updated_at = Utc::now();
        }
    }
}
