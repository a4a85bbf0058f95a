//! File-system change source.
//!
//! Wraps the OS watcher and turns raw notify events into [`FileEvent`]s with
//! root-relative paths, dropping anything matched by the ignore set. Events
//! are pushed into an unbounded channel with a single consumer.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::error::{MonitorError, Result};
use crate::models::{FileEvent, FileEventKind};

/// Compiled ignore patterns.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    patterns: Vec<glob::Pattern>,
}

impl IgnoreSet {
    /// Compiles glob patterns.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p.as_ref()).map_err(|e| MonitorError::InvalidPattern {
                    pattern: p.as_ref().to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self { patterns })
    }

    /// Whether a root-relative path is ignored.
    ///
    /// A pattern matches if it matches the whole path or any single component,
    /// so `node_modules` excludes everything below such a directory.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        self.patterns.iter().any(|pattern| {
            pattern.matches_path(relative)
                || relative.components().any(|c| match c {
                    Component::Normal(name) => name.to_str().is_some_and(|n| pattern.matches(n)),
                    _ => false,
                })
        })
    }
}

/// Watches a directory tree and emits typed file events.
pub struct EventSource {
    root: PathBuf,
    ignore: IgnoreSet,
    tx: mpsc::UnboundedSender<FileEvent>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl std::fmt::Debug for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("root", &self.root)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl EventSource {
    /// Creates a stopped source for `root` and the receiving end of its channel.
    ///
    /// # Errors
    /// Returns an error if the root does not exist or a pattern is invalid.
    pub fn new<S: AsRef<str>>(
        root: impl AsRef<Path>,
        ignore_patterns: &[S],
    ) -> Result<(Self, mpsc::UnboundedReceiver<FileEvent>)> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|_| MonitorError::RootMissing(root.to_path_buf()))?;
        let ignore = IgnoreSet::new(ignore_patterns)?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok((Self { root, ignore, tx, watcher: Mutex::new(None) }, rx))
    }

    /// Watched root (canonical).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the OS watcher is active.
    pub fn is_running(&self) -> bool {
        self.watcher.lock().map(|w| w.is_some()).unwrap_or(false)
    }

    /// Starts watching. Starting a running source only logs a warning.
    pub fn start(&self) -> Result<()> {
        let Ok(mut slot) = self.watcher.lock() else {
            warn!("Event source lock poisoned");
            return Ok(());
        };
        if slot.is_some() {
            warn!(root = %self.root.display(), "Event source already running");
            return Ok(());
        }

        let mut watcher = notify::recommended_watcher(self.create_event_handler())?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        *slot = Some(watcher);
        info!(root = %self.root.display(), "Event source started");
        Ok(())
    }

    /// Stops watching. Stopping a stopped source only logs a warning.
    pub fn stop(&self) {
        let Ok(mut slot) = self.watcher.lock() else {
            return;
        };
        match slot.take() {
            // Dropping the watcher joins its thread
            Some(watcher) => {
                drop(watcher);
                info!(root = %self.root.display(), "Event source stopped");
            }
            None => warn!(root = %self.root.display(), "Event source already stopped"),
        }
    }

    /// Injects an event as if the watcher had seen it.
    ///
    /// Returns false if the path is ignored or nobody is listening.
    pub fn emit(&self, event: FileEvent) -> bool {
        if self.ignore.is_ignored(&event.path) {
            return false;
        }
        self.tx.send(event).is_ok()
    }

    fn create_event_handler(&self) -> impl Fn(notify::Result<Event>) + Send + Sync + 'static {
        let root = self.root.clone();
        let ignore = self.ignore.clone();
        let tx = self.tx.clone();
        move |result: notify::Result<Event>| match result {
            Ok(event) => {
                for file_event in normalize(&root, &ignore, &event) {
                    debug!(kind = %file_event.kind, path = %file_event.path.display(), "File event");
                    if tx.send(file_event).is_err() {
                        return;
                    }
                }
            }
            Err(e) => warn!(error = %e, "File watcher error"),
        }
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.watcher.lock() {
            slot.take();
        }
    }
}

fn relative(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).map_or_else(|_| path.to_path_buf(), Path::to_path_buf)
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().filter(std::fs::Metadata::is_file).map(|m| m.len())
}

/// Converts one raw watcher event into zero or more file events.
///
/// Inotify reports a rename three times (from, to, both); only the paired
/// form is kept. Backends that cannot pair renames report each side, which is
/// mapped to created or deleted depending on whether the path still exists.
pub fn normalize(root: &Path, ignore: &IgnoreSet, event: &Event) -> Vec<FileEvent> {
    if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
        if let [from, to] = event.paths.as_slice() {
            let (from_rel, to_rel) = (relative(root, from), relative(root, to));
            if ignore.is_ignored(&to_rel) || to.is_dir() {
                return Vec::new();
            }
            let mut renamed = FileEvent::new(FileEventKind::Renamed, to_rel).with_previous(from_rel);
            renamed.size = file_size(to);
            return vec![renamed];
        }
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter_map(|path| {
            let kind = match event.kind {
                EventKind::Create(_) => FileEventKind::Created,
                EventKind::Remove(_) => FileEventKind::Deleted,
                EventKind::Modify(ModifyKind::Name(RenameMode::From | RenameMode::To)) => {
                    return None;
                }
                EventKind::Modify(ModifyKind::Name(_)) => {
                    if path.exists() { FileEventKind::Created } else { FileEventKind::Deleted }
                }
                EventKind::Modify(_) => FileEventKind::Modified,
                EventKind::Access(_) | EventKind::Any | EventKind::Other => return None,
            };
            let rel = relative(root, path);
            if ignore.is_ignored(&rel) || path.is_dir() {
                return None;
            }
            let mut file_event = FileEvent::new(kind, rel);
            if kind != FileEventKind::Deleted {
                file_event.size = file_size(path);
            }
            Some(file_event)
        })
        .collect()
}
