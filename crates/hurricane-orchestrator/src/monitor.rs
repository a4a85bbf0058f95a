//! Background monitor loop.
//!
//! Owns the receiving end of the [`EventSource`] channel, feeds events to the
//! shared [`NotificationEngine`] and runs the periodic analyses on an
//! interval. With `auto_react` enabled it also submits follow-up tasks through
//! the scheduler.

use chrono::Utc;
use hurricane_core::{
    AgentRole, CoreError, EventSource, FileEvent, FileEventKind, MonitorSettings, Notification,
    NotificationEngine, NotificationKind, StateStore, Task,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{OrchestrationError, Result};
use crate::scheduler::SchedulerHandle;

/// Events drained from the channel per batch.
pub const EVENT_BATCH: usize = 50;

/// A running monitor loop.
#[derive(Debug)]
pub struct MonitorHandle {
    source: Arc<EventSource>,
    token: CancellationToken,
    join: JoinHandle<()>,
    engine: Arc<Mutex<NotificationEngine>>,
    store: Arc<StateStore>,
    settings: MonitorSettings,
}

struct MonitorLoop {
    events: mpsc::UnboundedReceiver<FileEvent>,
    root: PathBuf,
    engine: Arc<Mutex<NotificationEngine>>,
    store: Arc<StateStore>,
    scheduler: SchedulerHandle,
    settings: MonitorSettings,
    token: CancellationToken,
}

impl MonitorHandle {
    /// Starts watching `root` and spawns the monitor loop.
    ///
    /// # Errors
    /// Returns an error if the root is missing, an ignore pattern is invalid
    /// or the OS watcher cannot be created.
    pub fn start(
        root: PathBuf,
        settings: MonitorSettings,
        engine: Arc<Mutex<NotificationEngine>>,
        store: Arc<StateStore>,
        scheduler: SchedulerHandle,
    ) -> Result<Self> {
        let (source, events) =
            EventSource::new(&root, settings.ignore_patterns.as_slice()).map_err(CoreError::from)?;
        source.start().map_err(CoreError::from)?;
        let source = Arc::new(source);
        let token = CancellationToken::new();

        let monitor = MonitorLoop {
            events,
            root: source.root().to_path_buf(),
            engine: Arc::clone(&engine),
            store: Arc::clone(&store),
            scheduler,
            settings: settings.clone(),
            token: token.clone(),
        };
        let join = tokio::spawn(monitor.run());
        info!(root = %root.display(), "Monitoring started");
        Ok(Self { source, token, join, engine, store, settings })
    }

    /// Event source feeding this loop.
    pub fn source(&self) -> &EventSource {
        &self.source
    }

    /// Stops the source, joins the loop within `stop_timeout_ms` and flushes the logs.
    ///
    /// Events queued before the call are processed before the loop exits.
    pub async fn stop(mut self) -> Result<()> {
        self.source.stop();
        self.token.cancel();

        match tokio::time::timeout(self.settings.stop_timeout(), &mut self.join).await {
            Ok(Ok(())) => debug!("Monitor loop joined"),
            Ok(Err(e)) => error!(error = %e, "Monitor loop ended abnormally"),
            Err(_) => {
                warn!(timeout_ms = self.settings.stop_timeout_ms, "Monitor loop did not stop in time, aborting");
                self.join.abort();
            }
        }

        let engine = self.engine.lock().await;
        self.store
            .save_logs(engine.events(), engine.notifications())
            .map_err(|e| OrchestrationError::Core(CoreError::Storage(e)))?;
        info!("Monitoring stopped");
        Ok(())
    }
}

impl MonitorLoop {
    async fn run(mut self) {
        let period = self.settings.analysis_interval();
        let mut analysis = tokio::time::interval_at(Instant::now() + period, period);
        analysis.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut batch = Vec::with_capacity(EVENT_BATCH);

        loop {
            tokio::select! {
                () = self.token.cancelled() => {
                    self.drain().await;
                    break;
                }
                received = self.events.recv_many(&mut batch, EVENT_BATCH) => {
                    if received == 0 {
                        debug!("Event channel closed");
                        break;
                    }
                    let events = std::mem::take(&mut batch);
                    self.process(events).await;
                }
                _ = analysis.tick() => self.analyze().await,
            }
        }
        debug!("Monitor loop exited");
    }

    /// Processes whatever is still queued once the loop is cancelled.
    async fn drain(&mut self) {
        let mut pending = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            pending.push(event);
        }
        if pending.is_empty() {
            return;
        }
        debug!(events = pending.len(), "Draining queued events");
        while !pending.is_empty() {
            let rest = pending.split_off(pending.len().min(EVENT_BATCH));
            let events = std::mem::replace(&mut pending, rest);
            self.process(events).await;
        }
    }

    async fn process(&mut self, events: Vec<FileEvent>) {
        let mut reactions = Vec::new();
        let mut engine = self.engine.lock().await;
        for event in events {
            let notifications = engine.on_event(event.clone());
            if self.settings.auto_react {
                reactions.extend(reaction(&event, &notifications));
            }
        }
        if let Err(e) = self.store.save_logs(engine.events(), engine.notifications()) {
            error!(error = %e, "Failed to persist monitor logs");
        }
        drop(engine);

        for task in reactions {
            let title = task.title.clone();
            match self.scheduler.create_task(task).await {
                Ok(task_id) => info!(task_id = %task_id, title = %title, "Follow-up task submitted"),
                Err(e) => warn!(title = %title, error = %e, "Failed to submit follow-up task"),
            }
        }
    }

    async fn analyze(&mut self) {
        let mut engine = self.engine.lock().await;
        let produced = engine.run_periodic(&self.root, Utc::now());
        debug!(notifications = produced.len(), "Periodic analysis ran");
        if produced.is_empty() {
            return;
        }
        if let Err(e) = self.store.save_logs(engine.events(), engine.notifications()) {
            error!(error = %e, "Failed to persist monitor logs");
        }
    }
}

/// Follow-up task for an event, if it warrants one.
fn reaction(event: &FileEvent, notifications: &[Notification]) -> Option<Task> {
    let path = event.path.display().to_string();
    let has = |kind: NotificationKind| notifications.iter().any(|n| n.kind == kind);

    if event.kind == FileEventKind::Modified && has(NotificationKind::DependencyChanged) {
        return Some(
            Task::new(
                format!("Review dependency changes: {}", path),
                format!("{} changed; check new versions for conflicts and known vulnerabilities.", path),
                AgentRole::Reviewer,
            )
            .autonomous(true)
            .with_context("trigger_path", serde_json::Value::String(path)),
        );
    }
    if has(NotificationKind::NewCodeFile) {
        return Some(
            Task::new(
                format!("Add tests for {}", path),
                format!("{} was created; write tests that cover its behaviour.", path),
                AgentRole::Tester,
            )
            .autonomous(true)
            .with_context("trigger_path", serde_json::Value::String(path)),
        );
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use hurricane_core::Severity;

    #[test]
    fn test_reaction_for_dependency_change() {
        let event = FileEvent::new(FileEventKind::Modified, "Cargo.toml");
        let n = Notification::new(NotificationKind::DependencyChanged, Severity::Warning, "t", "m");
        let task = reaction(&event, &[n]).unwrap();
        assert_eq!(task.title, "Review dependency changes: Cargo.toml");
        assert_eq!(task.role, AgentRole::Reviewer);
        assert!(task.autonomous);
    }

    #[test]
    fn test_reaction_for_new_code_file() {
        let event = FileEvent::new(FileEventKind::Created, "src/lib.rs");
        let n = Notification::new(NotificationKind::NewCodeFile, Severity::Info, "t", "m");
        let task = reaction(&event, &[n]).unwrap();
        assert_eq!(task.title, "Add tests for src/lib.rs");
        assert_eq!(task.role, AgentRole::Tester);
    }

    #[test]
    fn test_no_reaction() {
        let created_manifest = FileEvent::new(FileEventKind::Created, "go.mod");
        let n = Notification::new(NotificationKind::DependencyChanged, Severity::Warning, "t", "m");
        assert!(reaction(&created_manifest, &[n]).is_none());

        let event = FileEvent::new(FileEventKind::Modified, "a.py");
        assert!(reaction(&event, &[]).is_none());
    }
}
