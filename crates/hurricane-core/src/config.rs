//! Configuration for the orchestrator.
//!
//! Loaded from a TOML file where every field is optional, then overridden by
//! `HURRICANE_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    Read(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    Parse(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HurricaneConfig {
    /// Text-generation service.
    #[serde(default)]
    pub model: ModelSettings,
    /// Scheduler behaviour.
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// File monitoring and notification thresholds.
    #[serde(default)]
    pub monitor: MonitorSettings,
    /// Durable state location.
    #[serde(default)]
    pub storage: StorageSettings,
}

/// Text-generation service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Provider name (`ollama` or `mock`).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Server URL.
    #[serde(default = "default_host")]
    pub host: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Request timeout.
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Token limit per request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "codellama".to_string()
}

fn default_model_timeout() -> u64 {
    30
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            host: default_host(),
            model: default_model(),
            timeout_secs: default_model_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Dispatch autonomous tasks without an explicit execute request.
    #[serde(default = "default_true")]
    pub autonomous_dispatch: bool,
    /// Interval between housekeeping ticks.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Upper bound on one task execution.
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
    /// Upper bound on one external command.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Dispatch decisions kept in the history log.
    #[serde(default = "default_decision_log_cap")]
    pub decision_log_cap: usize,
}

fn default_true() -> bool {
    true
}

fn default_tick_ms() -> u64 {
    500
}

fn default_task_timeout() -> u64 {
    600
}

fn default_command_timeout() -> u64 {
    300
}

fn default_decision_log_cap() -> usize {
    500
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            autonomous_dispatch: true,
            tick_ms: default_tick_ms(),
            task_timeout_secs: default_task_timeout(),
            command_timeout_secs: default_command_timeout(),
            decision_log_cap: default_decision_log_cap(),
        }
    }
}

impl SchedulerSettings {
    /// Tick interval.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Per-task timeout.
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

/// File monitoring settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Glob patterns matched against relative paths and path components.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
    /// Size above which a file is reported as large.
    #[serde(default = "default_large_file_bytes")]
    pub large_file_bytes: u64,
    /// Modify events per path tolerated within the window.
    #[serde(default = "default_rapid_change_count")]
    pub rapid_change_count: usize,
    /// Rapid-change window.
    #[serde(default = "default_rapid_change_window")]
    pub rapid_change_window_secs: u64,
    /// Interval between periodic analyses.
    #[serde(default = "default_analysis_interval")]
    pub analysis_interval_secs: u64,
    /// Events per hour above which activity is reported.
    #[serde(default = "default_high_activity")]
    pub high_activity_threshold: usize,
    /// Changed files since the last check above which a reminder is emitted.
    #[serde(default = "default_uncommitted")]
    pub uncommitted_threshold: usize,
    /// Extensions treated as source code.
    #[serde(default = "default_code_extensions")]
    pub code_extensions: Vec<String>,
    /// File names treated as dependency manifests.
    #[serde(default = "default_dependency_files")]
    pub dependency_files: Vec<String>,
    /// Files every project is expected to have.
    #[serde(default = "default_hygiene_files")]
    pub hygiene_files: Vec<String>,
    /// Submit follow-up tasks for dependency and code file changes.
    #[serde(default)]
    pub auto_react: bool,
    /// Events retained.
    #[serde(default = "default_event_cap")]
    pub event_log_cap: usize,
    /// Notifications retained.
    #[serde(default = "default_notification_cap")]
    pub notification_log_cap: usize,
    /// Bound on joining the monitor loop at stop.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,
}

fn default_ignore_patterns() -> Vec<String> {
    [
        "__pycache__",
        ".git",
        ".svn",
        "node_modules",
        ".vscode",
        ".idea",
        "venv",
        "env",
        ".env",
        "dist",
        "build",
        "target",
        ".DS_Store",
        ".pytest_cache",
        ".coverage",
        "htmlcov",
        ".hurricane",
        "*.pyc",
        "*.pyo",
        "*.log",
        "*.tmp",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_large_file_bytes() -> u64 {
    1024 * 1024
}

fn default_rapid_change_count() -> usize {
    5
}

fn default_rapid_change_window() -> u64 {
    60
}

fn default_analysis_interval() -> u64 {
    300
}

fn default_high_activity() -> usize {
    50
}

fn default_uncommitted() -> usize {
    10
}

fn default_code_extensions() -> Vec<String> {
    ["py", "js", "ts", "rs", "go", "java", "json", "yaml", "yml", "toml"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_dependency_files() -> Vec<String> {
    [
        "requirements.txt",
        "package.json",
        "package-lock.json",
        "pyproject.toml",
        "Pipfile",
        "Pipfile.lock",
        "Cargo.toml",
        "Cargo.lock",
        "go.mod",
        "go.sum",
        "yarn.lock",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_hygiene_files() -> Vec<String> {
    ["README.md", ".gitignore"].iter().map(ToString::to_string).collect()
}

fn default_event_cap() -> usize {
    1000
}

fn default_notification_cap() -> usize {
    100
}

fn default_stop_timeout() -> u64 {
    2000
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            ignore_patterns: default_ignore_patterns(),
            large_file_bytes: default_large_file_bytes(),
            rapid_change_count: default_rapid_change_count(),
            rapid_change_window_secs: default_rapid_change_window(),
            analysis_interval_secs: default_analysis_interval(),
            high_activity_threshold: default_high_activity(),
            uncommitted_threshold: default_uncommitted(),
            code_extensions: default_code_extensions(),
            dependency_files: default_dependency_files(),
            hygiene_files: default_hygiene_files(),
            auto_react: false,
            event_log_cap: default_event_cap(),
            notification_log_cap: default_notification_cap(),
            stop_timeout_ms: default_stop_timeout(),
        }
    }
}

impl MonitorSettings {
    /// Periodic analysis interval.
    pub fn analysis_interval(&self) -> Duration {
        Duration::from_secs(self.analysis_interval_secs)
    }

    /// Bound on joining the monitor loop.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Durable state settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// State directory, relative to the project root unless absolute.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".hurricane")
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { state_dir: default_state_dir() }
    }
}

impl StorageSettings {
    /// Resolves the state directory against `root`.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        if self.state_dir.is_absolute() { self.state_dir.clone() } else { root.join(&self.state_dir) }
    }
}

impl HurricaneConfig {
    /// Loads configuration from `path`, falling back to defaults when the file
    /// does not exist, then applies environment overrides and validates.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match Self::load_from_file(path) {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => {
                debug!(path = %path.display(), "No configuration file, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file without overrides.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
    }

    /// Parses configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Applies `HURRICANE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("HURRICANE_MODEL_HOST") {
            self.model.host = host;
        }
        if let Some(model) = lookup("HURRICANE_MODEL") {
            self.model.model = model;
        }
        if let Some(provider) = lookup("HURRICANE_MODEL_PROVIDER") {
            self.model.provider = provider;
        }
        if let Some(dir) = lookup("HURRICANE_STATE_DIR") {
            self.storage.state_dir = PathBuf::from(dir);
        }
    }

    /// Rejects values the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::Invalid(format!(
                "model.temperature must be within 0..=2, got {}",
                self.model.temperature
            )));
        }
        let positive = [
            ("model.timeout_secs", self.model.timeout_secs),
            ("scheduler.tick_ms", self.scheduler.tick_ms),
            ("scheduler.task_timeout_secs", self.scheduler.task_timeout_secs),
            ("scheduler.decision_log_cap", self.scheduler.decision_log_cap as u64),
            ("monitor.rapid_change_window_secs", self.monitor.rapid_change_window_secs),
            ("monitor.analysis_interval_secs", self.monitor.analysis_interval_secs),
            ("monitor.event_log_cap", self.monitor.event_log_cap as u64),
            ("monitor.notification_log_cap", self.monitor.notification_log_cap as u64),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = HurricaneConfig::from_toml_str("").unwrap();
        assert_eq!(config, HurricaneConfig::default());
        assert_eq!(config.model.host, "http://localhost:11434");
        assert_eq!(config.model.model, "codellama");
        assert_eq!(config.monitor.large_file_bytes, 1_048_576);
        assert_eq!(config.monitor.event_log_cap, 1000);
        assert_eq!(config.monitor.notification_log_cap, 100);
        assert!(config.scheduler.autonomous_dispatch);
        assert_eq!(config.scheduler.decision_log_cap, 500);
        assert!(!config.monitor.auto_react);
    }

    #[test]
    fn test_partial_toml() {
        let toml = r#"
            [model]
            model = "llama3"

            [monitor]
            rapid_change_count = 3
        "#;
        let config = HurricaneConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.model.model, "llama3");
        assert_eq!(config.model.timeout_secs, 30);
        assert_eq!(config.monitor.rapid_change_count, 3);
        assert_eq!(config.monitor.analysis_interval_secs, 300);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HurricaneConfig::load_from_file(&dir.path().join("nope.toml"))
            .unwrap_or_default();
        config.apply_overrides(|_| None);
        assert_eq!(config, HurricaneConfig::default());
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hurricane.toml");
        std::fs::write(&path, "[model\nhost = ").unwrap();
        assert!(matches!(HurricaneConfig::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            [("HURRICANE_MODEL", "mistral"), ("HURRICANE_STATE_DIR", "/var/lib/h")].into();
        let mut config = HurricaneConfig::default();
        config.apply_overrides(|key| env.get(key).map(ToString::to_string));
        assert_eq!(config.model.model, "mistral");
        assert_eq!(config.storage.state_dir, PathBuf::from("/var/lib/h"));
        assert_eq!(config.storage.resolve(Path::new("/proj")), PathBuf::from("/var/lib/h"));
    }

    #[test]
    fn test_validate_rejects_zero_cap() {
        let mut config = HurricaneConfig::default();
        config.monitor.event_log_cap = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_temperature() {
        let mut config = HurricaneConfig::default();
        config.model.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_state_dir_resolves_relative() {
        let settings = StorageSettings::default();
        assert_eq!(settings.resolve(Path::new("/proj")), PathBuf::from("/proj/.hurricane"));
    }
}
