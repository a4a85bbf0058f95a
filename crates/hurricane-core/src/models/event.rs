//! File events and notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Kind of file-system change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    /// A file or directory appeared.
    Created,
    /// Contents or metadata changed.
    Modified,
    /// A file or directory was removed.
    Deleted,
    /// A path was renamed; `previous_path` holds the old name.
    Renamed,
}

impl fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
        })
    }
}

/// Immutable record of one change under the watched root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEvent {
    /// Unique identifier.
    pub id: String,
    /// Kind of change.
    pub kind: FileEventKind,
    /// Path relative to the watched root.
    pub path: PathBuf,
    /// Old path for renames.
    #[serde(default)]
    pub previous_path: Option<PathBuf>,
    /// Size in bytes, when the file still exists.
    #[serde(default)]
    pub size: Option<u64>,
    /// When the change was observed.
    pub timestamp: DateTime<Utc>,
}

impl FileEvent {
    /// Creates an event stamped now.
    pub fn new(kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            path: path.into(),
            previous_path: None,
            size: None,
            timestamp: Utc::now(),
        }
    }

    /// Sets the observed size.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the previous path of a rename.
    #[must_use]
    pub fn with_previous(mut self, previous: impl Into<PathBuf>) -> Self {
        self.previous_path = Some(previous.into());
        self
    }

    /// Overrides the timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// File name component of the path.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Lowercase extension of the path.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.path)
    }
}

pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(str::to_lowercase)
}

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// Something broke.
    Error,
    /// Something went well.
    Success,
}

impl Severity {
    /// Priority score used to sort notifications.
    pub fn priority(self) -> u8 {
        match self {
            Self::Error => 5,
            Self::Warning => 3,
            Self::Info => 2,
            Self::Success => 1,
        }
    }
}

/// Which analysis produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// File exceeded the size threshold.
    LargeFile,
    /// Burst of modifications to one path.
    RapidChanges,
    /// New source file created.
    NewCodeFile,
    /// Dependency manifest touched.
    DependencyChanged,
    /// Many events in the last hour.
    HighActivity,
    /// Risky textual pattern found in a source file.
    RiskyPattern,
    /// Project hygiene files missing.
    MissingHygieneFiles,
    /// Many changed files since the last check.
    UncommittedChanges,
    /// A scheduled task failed.
    TaskFailed,
}

/// A generated, acknowledgeable alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier.
    pub id: String,
    /// Producing analysis.
    pub kind: NotificationKind,
    /// Severity.
    pub severity: Severity,
    /// Short title.
    pub title: String,
    /// Human-readable message.
    pub message: String,
    /// Sort score derived from severity.
    pub priority: u8,
    /// Suggested follow-up actions, in order.
    #[serde(default)]
    pub actions: Vec<String>,
    /// Extra data (paths, counts, pattern names).
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Flipped by `acknowledge`; the only mutation after creation.
    #[serde(default)]
    pub acknowledged: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Creates an unacknowledged notification.
    pub fn new(
        kind: NotificationKind,
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            severity,
            title: title.into(),
            message: message.into(),
            priority: severity.priority(),
            actions: Vec::new(),
            context: Map::new(),
            acknowledged: false,
            created_at: Utc::now(),
        }
    }

    /// Sets the suggested actions.
    #[must_use]
    pub fn with_actions(mut self, actions: &[&str]) -> Self {
        self.actions = actions.iter().map(ToString::to_string).collect();
        self
    }

    /// Inserts a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_priority() {
        let n = Notification::new(NotificationKind::LargeFile, Severity::Warning, "t", "m");
        assert_eq!(n.priority, 3);
        assert!(!n.acknowledged);
        assert_eq!(Severity::Error.priority(), 5);
        assert_eq!(Severity::Success.priority(), 1);
    }

    #[test]
    fn test_event_helpers() {
        let event = FileEvent::new(FileEventKind::Created, "src/Main.RS").with_size(10);
        assert_eq!(event.file_name(), Some("Main.RS"));
        assert_eq!(event.extension().as_deref(), Some("rs"));
        assert_eq!(event.size, Some(10));
    }
}
