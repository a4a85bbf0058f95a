//! File-system monitoring.
//!
//! [`EventSource`] turns OS watcher callbacks into normalized [`FileEvent`]s
//! on a channel; [`NotificationEngine`] classifies them and runs the
//! periodic project analyses.
//!
//! [`FileEvent`]: crate::models::FileEvent

mod error;
mod event_source;
mod notifications;

pub use error::{MonitorError, Result};
pub use event_source::{EventSource, IgnoreSet, normalize};
pub use notifications::{EventCallback, NotificationEngine, RiskyPattern};
