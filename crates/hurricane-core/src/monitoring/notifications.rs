//! Classification of file events into notifications.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::MonitorSettings;
use crate::models::event::extension_of;
use crate::models::{
    FileEvent, FileEventKind, Notification, NotificationKind, RollingLog, Severity, Task,
};

/// Events inspected by the risky-pattern scan.
const PATTERN_SCAN_EVENTS: usize = 20;

/// A textual pattern worth flagging in source files.
#[derive(Debug, Clone)]
pub struct RiskyPattern {
    /// Stable name used for de-duplication.
    pub name: &'static str,
    /// Extensions the pattern applies to; empty means every code file.
    pub extensions: &'static [&'static str],
    /// Compiled expression.
    pub regex: Regex,
    /// Human-readable description.
    pub description: &'static str,
}

impl RiskyPattern {
    /// The built-in pattern set.
    pub fn defaults() -> Vec<Self> {
        let specs: [(&'static str, &'static [&'static str], &str, &'static str); 5] = [
            ("bare_except", &["py"], r"except\s*:", "Bare except clause swallows every error"),
            ("print_debug", &["py"], r"print\s*\(", "Debug print statement left in code"),
            ("console_debug", &["js", "ts"], r"console\.log\s*\(", "console.log left in code"),
            ("todo_marker", &[], r"\b(TODO|FIXME|XXX|HACK)\b", "Unresolved TODO/FIXME marker"),
            ("rust_unwrap", &["rs"], r"\.unwrap\(\)", "unwrap() can panic at runtime"),
        ];
        specs
            .into_iter()
            .filter_map(|(name, extensions, pattern, description)| {
                Regex::new(pattern).ok().map(|regex| Self { name, extensions, regex, description })
            })
            .collect()
    }

    fn applies_to(&self, extension: &str) -> bool {
        self.extensions.is_empty() || self.extensions.contains(&extension)
    }
}

/// Hook run for every logged event of one kind.
///
/// Callbacks run while the engine is locked and must not block.
pub type EventCallback = Box<dyn Fn(&FileEvent) + Send + Sync>;

#[derive(Default)]
struct Callbacks(HashMap<FileEventKind, Vec<EventCallback>>);

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.0.iter().map(|(kind, list)| (kind, list.len()))).finish()
    }
}

/// Turns file events and periodic scans into prioritized notifications.
#[derive(Debug)]
pub struct NotificationEngine {
    settings: MonitorSettings,
    callbacks: Callbacks,
    events: RollingLog<FileEvent>,
    notifications: RollingLog<Notification>,
    patterns: Vec<RiskyPattern>,
    modifications: HashMap<PathBuf, VecDeque<DateTime<Utc>>>,
    bursts_reported: HashSet<PathBuf>,
    patterns_reported: HashMap<PathBuf, HashSet<&'static str>>,
    last_missing: Option<Vec<String>>,
    changed_since_check: HashSet<PathBuf>,
}

impl NotificationEngine {
    /// Creates an engine with empty logs.
    pub fn new(settings: MonitorSettings) -> Self {
        let events = RollingLog::new(settings.event_log_cap);
        let notifications = RollingLog::new(settings.notification_log_cap);
        Self::with_logs(settings, events, notifications)
    }

    /// Creates an engine that continues persisted logs.
    pub fn with_logs(
        settings: MonitorSettings,
        mut events: RollingLog<FileEvent>,
        mut notifications: RollingLog<Notification>,
    ) -> Self {
        events.set_capacity(settings.event_log_cap);
        notifications.set_capacity(settings.notification_log_cap);
        Self {
            settings,
            callbacks: Callbacks::default(),
            events,
            notifications,
            patterns: RiskyPattern::defaults(),
            modifications: HashMap::new(),
            bursts_reported: HashSet::new(),
            patterns_reported: HashMap::new(),
            last_missing: None,
            changed_since_check: HashSet::new(),
        }
    }

    /// Event log, oldest first.
    pub fn events(&self) -> &RollingLog<FileEvent> {
        &self.events
    }

    /// Notification log, oldest first.
    pub fn notifications(&self) -> &RollingLog<Notification> {
        &self.notifications
    }

    /// Logged events newer than `hours` before `now`, oldest first.
    pub fn recent_events(&self, hours: u32, now: DateTime<Utc>) -> Vec<FileEvent> {
        let cutoff = now - ChronoDuration::hours(i64::from(hours));
        self.events.iter().filter(|e| e.timestamp > cutoff).cloned().collect()
    }

    /// Registers a callback for every future event of `kind`.
    pub fn register_event_callback(&mut self, kind: FileEventKind, callback: EventCallback) {
        let list = self.callbacks.0.entry(kind).or_default();
        list.push(callback);
        debug!(kind = %kind, callbacks = list.len(), "Event callback registered");
    }

    /// Appends a notification to the log and returns it.
    pub fn record(&mut self, notification: Notification) -> Notification {
        info!(
            kind = ?notification.kind,
            severity = ?notification.severity,
            title = %notification.title,
            "Notification"
        );
        self.notifications.push(notification.clone());
        notification
    }

    fn is_code_file(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.settings.code_extensions.iter().any(|c| c == &ext))
    }

    fn is_dependency_file(&self, event: &FileEvent) -> bool {
        event
            .file_name()
            .is_some_and(|name| self.settings.dependency_files.iter().any(|d| d == name))
    }

    /// Logs an event and returns the notifications it triggers.
    pub fn on_event(&mut self, event: FileEvent) -> Vec<Notification> {
        let mut out = Vec::new();
        let touched = matches!(event.kind, FileEventKind::Created | FileEventKind::Modified);

        if touched {
            self.changed_since_check.insert(event.path.clone());
            self.patterns_reported.remove(&event.path);
        }
        if event.kind == FileEventKind::Deleted {
            self.forget(&event.path);
        }

        if touched && event.size.is_some_and(|size| size > self.settings.large_file_bytes) {
            let size = event.size.unwrap_or_default();
            let n = Notification::new(
                NotificationKind::LargeFile,
                Severity::Warning,
                "Large file detected",
                format!(
                    "{} is {:.1} MB",
                    event.path.display(),
                    size as f64 / (1024.0 * 1024.0)
                ),
            )
            .with_actions(&["Review file size", "Consider compression", "Check if intentional"])
            .with_context("path", event.path.display().to_string())
            .with_context("size", size);
            out.push(self.record(n));
        }

        if event.kind == FileEventKind::Modified {
            if let Some(n) = self.track_modification(&event) {
                out.push(self.record(n));
            }
        }

        if event.kind == FileEventKind::Created && self.is_code_file(&event.path) {
            let n = Notification::new(
                NotificationKind::NewCodeFile,
                Severity::Info,
                "New code file",
                format!("Created {}", event.path.display()),
            )
            .with_actions(&["Review new file", "Add tests", "Update documentation"])
            .with_context("path", event.path.display().to_string());
            out.push(self.record(n));
        }

        if touched && self.is_dependency_file(&event) {
            let n = Notification::new(
                NotificationKind::DependencyChanged,
                Severity::Warning,
                "Dependency file changed",
                format!("{} was {}", event.path.display(), event.kind),
            )
            .with_actions(&["Update dependencies", "Check for conflicts", "Run security audit"])
            .with_context("path", event.path.display().to_string());
            out.push(self.record(n));
        }

        if let Some(callbacks) = self.callbacks.0.get(&event.kind) {
            for callback in callbacks {
                callback(&event);
            }
        }
        self.events.push(event);
        out
    }

    fn forget(&mut self, path: &Path) {
        self.modifications.remove(path);
        self.bursts_reported.remove(path);
        self.patterns_reported.remove(path);
    }

    /// Drops burst windows that went quiet and pattern marks for paths no
    /// longer in the event log.
    fn prune(&mut self, now: DateTime<Utc>) {
        let window = ChronoDuration::seconds(self.settings.rapid_change_window_secs as i64);
        self.modifications.retain(|_, times| times.back().is_some_and(|last| now - *last <= window));
        let modifications = &self.modifications;
        self.bursts_reported.retain(|path| modifications.contains_key(path));
        let logged: HashSet<&Path> = self.events.iter().map(|e| e.path.as_path()).collect();
        self.patterns_reported.retain(|path, _| logged.contains(path.as_path()));
    }

    /// Updates the per-path modification window; returns a notification when
    /// a new burst crosses the threshold.
    fn track_modification(&mut self, event: &FileEvent) -> Option<Notification> {
        let window = ChronoDuration::seconds(self.settings.rapid_change_window_secs as i64);
        let now = event.timestamp;
        let times = self.modifications.entry(event.path.clone()).or_default();

        // A full quiet window ends the previous burst
        if times.back().is_some_and(|last| now - *last > window) {
            self.bursts_reported.remove(&event.path);
        }
        times.push_back(now);
        while times.front().is_some_and(|first| now - *first > window) {
            times.pop_front();
        }

        let count = times.len();
        if count <= self.settings.rapid_change_count || self.bursts_reported.contains(&event.path) {
            return None;
        }
        self.bursts_reported.insert(event.path.clone());
        Some(
            Notification::new(
                NotificationKind::RapidChanges,
                Severity::Info,
                "Rapid changes detected",
                format!(
                    "{} changed {} times in the last {}s",
                    event.path.display(),
                    count,
                    self.settings.rapid_change_window_secs
                ),
            )
            .with_actions(&["Consider batching edits", "Check for a runaway process"])
            .with_context("path", event.path.display().to_string())
            .with_context("count", count),
        )
    }

    /// Runs the periodic analyses against the project at `root`.
    pub fn run_periodic(&mut self, root: &Path, now: DateTime<Utc>) -> Vec<Notification> {
        let mut out = Vec::new();

        let hour_ago = now - ChronoDuration::hours(1);
        let recent = self.events.iter().filter(|e| e.timestamp > hour_ago).count();
        if recent > self.settings.high_activity_threshold {
            let n = Notification::new(
                NotificationKind::HighActivity,
                Severity::Info,
                "High file activity",
                format!("{} file events in the last hour", recent),
            )
            .with_actions(&["Review recent changes", "Consider committing work"])
            .with_context("count", recent);
            out.push(self.record(n));
        }

        for n in self.scan_patterns(root) {
            out.push(self.record(n));
        }

        if let Some(n) = self.check_hygiene(root) {
            out.push(self.record(n));
        }

        let changed = std::mem::take(&mut self.changed_since_check).len();
        if root.join(".git").exists() && changed > self.settings.uncommitted_threshold {
            let n = Notification::new(
                NotificationKind::UncommittedChanges,
                Severity::Info,
                "Many uncommitted changes",
                format!("{} files changed since the last check", changed),
            )
            .with_actions(&["Review changes", "Commit work in progress"])
            .with_context("count", changed);
            out.push(self.record(n));
        }

        self.prune(now);
        debug!(notifications = out.len(), "Periodic analysis finished");
        out
    }

    fn scan_patterns(&mut self, root: &Path) -> Vec<Notification> {
        let mut seen = HashSet::new();
        let candidates: Vec<PathBuf> = self
            .events
            .recent(PATTERN_SCAN_EVENTS)
            .filter(|e| matches!(e.kind, FileEventKind::Created | FileEventKind::Modified))
            .filter(|e| self.is_code_file(&e.path))
            .filter(|e| seen.insert(e.path.clone()))
            .map(|e| e.path.clone())
            .collect();

        let mut found = Vec::new();
        for path in candidates {
            let full = root.join(&path);
            let within_limit = std::fs::metadata(&full)
                .is_ok_and(|m| m.is_file() && m.len() <= self.settings.large_file_bytes);
            if !within_limit {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&full) else {
                continue;
            };
            let extension = extension_of(&path).unwrap_or_default();
            let reported = self.patterns_reported.entry(path.clone()).or_default();

            for pattern in self.patterns.iter().filter(|p| p.applies_to(&extension)) {
                if reported.contains(pattern.name) {
                    continue;
                }
                let Some(m) = pattern.regex.find(&content) else {
                    continue;
                };
                reported.insert(pattern.name);
                let line = content[..m.start()].matches('\n').count() + 1;
                found.push(
                    Notification::new(
                        NotificationKind::RiskyPattern,
                        Severity::Warning,
                        "Code pattern detected",
                        format!("{} in {}:{}", pattern.description, path.display(), line),
                    )
                    .with_actions(&["Review flagged line", "Fix or justify the pattern"])
                    .with_context("path", path.display().to_string())
                    .with_context("pattern", pattern.name)
                    .with_context("line", line),
                );
            }
        }
        found
    }

    fn check_hygiene(&mut self, root: &Path) -> Option<Notification> {
        let mut missing: Vec<String> = self
            .settings
            .hygiene_files
            .iter()
            .filter(|f| !root.join(f).exists())
            .cloned()
            .collect();
        let has_manifest = self.settings.dependency_files.iter().any(|f| root.join(f).exists());
        if !has_manifest && !self.settings.dependency_files.is_empty() {
            missing.push("dependency manifest".to_string());
        }

        if self.last_missing.as_ref() == Some(&missing) {
            return None;
        }
        self.last_missing = Some(missing.clone());
        if missing.is_empty() {
            return None;
        }
        Some(
            Notification::new(
                NotificationKind::MissingHygieneFiles,
                Severity::Info,
                "Missing project files",
                format!("Missing: {}", missing.join(", ")),
            )
            .with_actions(&["Create missing files", "Run project setup"])
            .with_context("missing", missing),
        )
    }

    /// Records an error notification for a failed task.
    pub fn notify_task_failure(&mut self, task: &Task) -> Notification {
        let reason = task.error().unwrap_or("unknown error").to_string();
        let n = Notification::new(
            NotificationKind::TaskFailed,
            Severity::Error,
            "Task failed",
            format!("{}: {}", task.title, reason),
        )
        .with_actions(&["Inspect the error", "Requeue or rerun the task"])
        .with_context("task_id", task.id.clone())
        .with_context("role", task.role.to_string());
        self.record(n)
    }

    /// Acknowledges a notification. Returns false only for an unknown id.
    pub fn acknowledge(&mut self, id: &str) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.acknowledged = true;
                true
            }
            None => false,
        }
    }

    /// Unacknowledged notifications, highest priority first, newest first.
    pub fn unacknowledged(&self) -> Vec<Notification> {
        let mut pending: Vec<Notification> =
            self.notifications.iter().filter(|n| !n.acknowledged).cloned().collect();
        pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.created_at.cmp(&a.created_at)));
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentRole;

    fn engine() -> NotificationEngine {
        NotificationEngine::new(MonitorSettings::default())
    }

    fn modified(path: &str, at: DateTime<Utc>) -> FileEvent {
        FileEvent::new(FileEventKind::Modified, path).at(at)
    }

    fn kinds(notifications: &[Notification]) -> Vec<NotificationKind> {
        notifications.iter().map(|n| n.kind).collect()
    }

    #[test]
    fn test_large_file() {
        let mut engine = engine();
        let event = FileEvent::new(FileEventKind::Created, "data.bin").with_size(2 * 1024 * 1024);
        let out = engine.on_event(event);
        assert_eq!(kinds(&out), vec![NotificationKind::LargeFile]);
        assert_eq!(out[0].severity, Severity::Warning);
        assert_eq!(out[0].actions[0], "Review file size");

        let small = FileEvent::new(FileEventKind::Modified, "data.bin").with_size(10);
        assert!(engine.on_event(small).is_empty());
        let deleted = FileEvent::new(FileEventKind::Deleted, "data.bin").with_size(5 * 1024 * 1024);
        assert!(engine.on_event(deleted).is_empty());
    }

    #[test]
    fn test_rapid_changes_single_notification_per_burst() {
        let mut engine = engine();
        let start = Utc::now();
        let mut produced = Vec::new();
        for i in 0..6 {
            produced.extend(engine.on_event(modified("app.rs", start + ChronoDuration::seconds(i * 2))));
        }
        assert_eq!(kinds(&produced), vec![NotificationKind::RapidChanges]);

        // More edits inside the same burst stay quiet
        let more = engine.on_event(modified("app.rs", start + ChronoDuration::seconds(12)));
        assert!(more.is_empty());

        // After a quiet window a new burst can report again
        let later = start + ChronoDuration::seconds(200);
        let mut second = Vec::new();
        for i in 0..6 {
            second.extend(engine.on_event(modified("app.rs", later + ChronoDuration::seconds(i))));
        }
        assert_eq!(kinds(&second), vec![NotificationKind::RapidChanges]);
    }

    #[test]
    fn test_rapid_changes_needs_more_than_threshold() {
        let mut engine = engine();
        let start = Utc::now();
        for i in 0..5 {
            assert!(engine.on_event(modified("a.rs", start + ChronoDuration::seconds(i))).is_empty());
        }
        // Spread out edits never accumulate
        for i in 0..10 {
            let at = start + ChronoDuration::seconds(100 + i * 61);
            assert!(engine.on_event(modified("b.rs", at)).is_empty());
        }
    }

    #[test]
    fn test_new_code_and_dependency_files() {
        let mut engine = engine();
        let out = engine.on_event(FileEvent::new(FileEventKind::Created, "src/lib.rs"));
        assert_eq!(kinds(&out), vec![NotificationKind::NewCodeFile]);

        let out = engine.on_event(FileEvent::new(FileEventKind::Modified, "requirements.txt"));
        assert_eq!(kinds(&out), vec![NotificationKind::DependencyChanged]);
        assert_eq!(out[0].priority, 3);

        // package.json is both a code file and a manifest
        let out = engine.on_event(FileEvent::new(FileEventKind::Created, "web/package.json"));
        assert_eq!(
            kinds(&out),
            vec![NotificationKind::NewCodeFile, NotificationKind::DependencyChanged]
        );

        assert!(engine.on_event(FileEvent::new(FileEventKind::Created, "notes.txt")).is_empty());
        assert_eq!(engine.events().len(), 4);
    }

    #[test]
    fn test_high_activity() {
        let mut engine = engine();
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        for i in 0..51 {
            engine.on_event(FileEvent::new(FileEventKind::Deleted, format!("f{}.txt", i)).at(now));
        }
        let out = engine.run_periodic(dir.path(), now);
        assert!(kinds(&out).contains(&NotificationKind::HighActivity));

        // Events older than an hour do not count
        let later = now + ChronoDuration::hours(2);
        let out = engine.run_periodic(dir.path(), later);
        assert!(!kinds(&out).contains(&NotificationKind::HighActivity));
    }

    #[test]
    fn test_risky_patterns_first_match_once_per_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("app.py"),
            "try:\n    run()\nexcept:\n    pass\nprint('x')\nprint('y')\n# TODO: fix\n",
        )
        .unwrap();
        let mut engine = engine();
        engine.on_event(FileEvent::new(FileEventKind::Modified, "app.py"));

        let out = engine.run_periodic(dir.path(), Utc::now());
        let patterns: Vec<&str> = out
            .iter()
            .filter(|n| n.kind == NotificationKind::RiskyPattern)
            .filter_map(|n| n.context.get("pattern").and_then(|v| v.as_str()))
            .collect();
        assert_eq!(patterns, vec!["bare_except", "print_debug", "todo_marker"]);
        let bare = out.iter().find(|n| n.message.contains("Bare except")).unwrap();
        assert_eq!(bare.context.get("line").and_then(serde_json::Value::as_u64), Some(3));

        // Not repeated on the next run
        let out = engine.run_periodic(dir.path(), Utc::now());
        assert!(!kinds(&out).contains(&NotificationKind::RiskyPattern));

        // Touching the file again allows it to be reported again
        engine.on_event(FileEvent::new(FileEventKind::Modified, "app.py"));
        let out = engine.run_periodic(dir.path(), Utc::now());
        assert_eq!(out.iter().filter(|n| n.kind == NotificationKind::RiskyPattern).count(), 3);
    }

    #[test]
    fn test_patterns_respect_language() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() { let x = y.unwrap(); print(x); }").unwrap();
        let mut engine = engine();
        engine.on_event(FileEvent::new(FileEventKind::Created, "main.rs"));
        let out = engine.run_periodic(dir.path(), Utc::now());
        let patterns: Vec<&str> = out
            .iter()
            .filter_map(|n| n.context.get("pattern").and_then(|v| v.as_str()))
            .collect();
        assert_eq!(patterns, vec!["rust_unwrap"]);
    }

    #[test]
    fn test_missing_hygiene_files_listed_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine();
        let out = engine.run_periodic(dir.path(), Utc::now());
        let hygiene: Vec<&Notification> =
            out.iter().filter(|n| n.kind == NotificationKind::MissingHygieneFiles).collect();
        assert_eq!(hygiene.len(), 1);
        assert_eq!(hygiene[0].message, "Missing: README.md, .gitignore, dependency manifest");

        let out = engine.run_periodic(dir.path(), Utc::now());
        assert!(!kinds(&out).contains(&NotificationKind::MissingHygieneFiles));

        std::fs::write(dir.path().join("README.md"), "# hi").unwrap();
        let out = engine.run_periodic(dir.path(), Utc::now());
        let n = out.iter().find(|n| n.kind == NotificationKind::MissingHygieneFiles).unwrap();
        assert_eq!(n.message, "Missing: .gitignore, dependency manifest");
    }

    #[test]
    fn test_uncommitted_changes_requires_git() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine();
        for i in 0..11 {
            engine.on_event(FileEvent::new(FileEventKind::Modified, format!("f{}.txt", i)));
        }
        let out = engine.run_periodic(dir.path(), Utc::now());
        assert!(!kinds(&out).contains(&NotificationKind::UncommittedChanges));

        std::fs::create_dir(dir.path().join(".git")).unwrap();
        for i in 0..11 {
            engine.on_event(FileEvent::new(FileEventKind::Modified, format!("f{}.txt", i)));
        }
        let out = engine.run_periodic(dir.path(), Utc::now());
        assert!(kinds(&out).contains(&NotificationKind::UncommittedChanges));

        // Counter resets after each check
        let out = engine.run_periodic(dir.path(), Utc::now());
        assert!(!kinds(&out).contains(&NotificationKind::UncommittedChanges));
    }

    #[test]
    fn test_acknowledge_is_idempotent() {
        let mut engine = engine();
        let out = engine.on_event(FileEvent::new(FileEventKind::Created, "x.py"));
        let id = out[0].id.clone();
        assert_eq!(engine.unacknowledged().len(), 1);
        assert!(engine.acknowledge(&id));
        assert!(engine.acknowledge(&id));
        assert!(!engine.acknowledge("missing"));
        assert!(engine.unacknowledged().is_empty());
    }

    #[test]
    fn test_unacknowledged_sorted_by_priority() {
        let mut engine = engine();
        engine.on_event(FileEvent::new(FileEventKind::Created, "x.py"));
        let mut task = Task::new("Deploy", "", AgentRole::Deployer);
        task.record_error("exit 1");
        engine.notify_task_failure(&task);
        let pending = engine.unacknowledged();
        assert_eq!(pending[0].kind, NotificationKind::TaskFailed);
        assert_eq!(pending[0].severity, Severity::Error);
        assert_eq!(pending[1].kind, NotificationKind::NewCodeFile);
    }

    #[test]
    fn test_quiet_paths_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine();
        let start = Utc::now();
        for i in 0..6 {
            engine.on_event(modified("hot.rs", start + ChronoDuration::seconds(i)));
        }
        for i in 0..40 {
            engine.on_event(modified(&format!("f{}.rs", i), start));
        }
        assert_eq!(engine.modifications.len(), 41);
        assert!(engine.bursts_reported.contains(Path::new("hot.rs")));

        engine.on_event(modified("live.rs", start + ChronoDuration::seconds(100)));
        engine.run_periodic(dir.path(), start + ChronoDuration::seconds(110));
        assert_eq!(engine.modifications.len(), 1);
        assert!(engine.modifications.contains_key(Path::new("live.rs")));
        assert!(engine.bursts_reported.is_empty());

        engine.on_event(FileEvent::new(FileEventKind::Deleted, "live.rs"));
        assert!(engine.modifications.is_empty());
    }

    #[test]
    fn test_pattern_marks_follow_event_log() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.py"), "print('x')\n").unwrap();
        let settings = MonitorSettings { event_log_cap: 2, ..MonitorSettings::default() };
        let mut engine = NotificationEngine::new(settings);
        engine.on_event(FileEvent::new(FileEventKind::Modified, "old.py"));
        engine.run_periodic(dir.path(), Utc::now());
        assert!(engine.patterns_reported.contains_key(Path::new("old.py")));

        engine.on_event(FileEvent::new(FileEventKind::Deleted, "a.txt"));
        engine.on_event(FileEvent::new(FileEventKind::Deleted, "b.txt"));
        engine.run_periodic(dir.path(), Utc::now());
        assert!(engine.patterns_reported.is_empty());
    }

    #[test]
    fn test_recent_events_window() {
        let mut engine = engine();
        let now = Utc::now();
        engine.on_event(FileEvent::new(FileEventKind::Deleted, "old.txt").at(now - ChronoDuration::hours(3)));
        engine.on_event(FileEvent::new(FileEventKind::Deleted, "new.txt").at(now - ChronoDuration::minutes(10)));

        let recent = engine.recent_events(1, now);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].path, PathBuf::from("new.txt"));
        assert_eq!(engine.recent_events(4, now).len(), 2);
        assert!(engine.recent_events(0, now).is_empty());
    }

    #[test]
    fn test_event_callbacks_fire_by_kind() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let mut engine = engine();
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        engine.register_event_callback(
            FileEventKind::Created,
            Box::new(move |_: &FileEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        engine.on_event(FileEvent::new(FileEventKind::Created, "a.txt"));
        engine.on_event(FileEvent::new(FileEventKind::Modified, "a.txt"));
        engine.on_event(FileEvent::new(FileEventKind::Created, "b.txt"));
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_logs_are_capped() {
        let settings = MonitorSettings { event_log_cap: 3, notification_log_cap: 2, ..MonitorSettings::default() };
        let mut engine = NotificationEngine::new(settings);
        for i in 0..5 {
            engine.on_event(FileEvent::new(FileEventKind::Created, format!("m{}.py", i)));
        }
        assert_eq!(engine.events().len(), 3);
        assert_eq!(engine.notifications().len(), 2);
    }
}
