//! Errors produced by file monitoring.

use std::path::PathBuf;
use thiserror::Error;

/// Monitoring error.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The OS watcher failed.
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// An ignore pattern is not a valid glob.
    #[error("Invalid ignore pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Offending pattern.
        pattern: String,
        /// Glob compiler message.
        reason: String,
    },

    /// The watched root does not exist.
    #[error("Watch root does not exist: {0}")]
    RootMissing(PathBuf),
}

/// Result type for monitoring operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
