//! Runner configuration.
//!
//! Every field has a default, so an empty YAML document is a valid config:
//!
//! ```yaml
//! max_duration_secs: 10
//! poll_interval_ms: 500
//! failure_policy: fail_fast
//! isolation:
//!   kind: runtime
//!   worker_threads: 1
//! run_log: .scenarios/runs.jsonl
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors raised while loading or validating a [`RunnerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How the watchdog reacts to the first endpoint reporting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop scanning the current tick at the first endpoint with failures.
    #[default]
    FailFast,
    /// Finish scanning every endpoint in the tick before failing.
    ScanAll,
}

/// Which isolation mechanism hosts the endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationKind {
    /// One dedicated tokio runtime per endpoint.
    #[default]
    Runtime,
    /// Tasks on the caller's runtime, aborted at teardown.
    Task,
}

/// Isolation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    pub kind: IsolationKind,

    /// Worker threads per endpoint runtime. Ignored for task isolation.
    pub worker_threads: usize,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            kind: IsolationKind::Runtime,
            worker_threads: 1,
        }
    }
}

/// Configuration for a [`ScenarioRunner`](crate::ScenarioRunner).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Maximum wall time a run may take once endpoints are dispatched.
    pub max_duration_secs: f64,

    /// Interval between watchdog ticks.
    pub poll_interval_ms: u64,

    pub failure_policy: FailurePolicy,

    pub isolation: IsolationConfig,

    /// Optional JSONL file that receives one record per run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_log: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 10.0,
            poll_interval_ms: 500,
            failure_policy: FailurePolicy::FailFast,
            isolation: IsolationConfig::default(),
            run_log: None,
        }
    }
}

impl RunnerConfig {
    /// Parses a config from YAML and validates it.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a YAML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Checks that the timing and isolation settings are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_duration_secs.is_finite() || self.max_duration_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "max_duration_secs must be a positive number, got {}",
                self.max_duration_secs
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        let max_duration = Duration::try_from_secs_f64(self.max_duration_secs).map_err(|_| {
            ConfigError::Invalid(format!(
                "max_duration_secs ({}) is too large",
                self.max_duration_secs
            ))
        })?;
        if self.poll_interval() > max_duration {
            return Err(ConfigError::Invalid(format!(
                "poll_interval_ms ({}) exceeds max_duration_secs ({})",
                self.poll_interval_ms, self.max_duration_secs
            )));
        }
        if self.isolation.worker_threads == 0 {
            return Err(ConfigError::Invalid(
                "isolation.worker_threads must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The deadline window. Values `validate` rejects saturate to
    /// `Duration::MAX`.
    pub fn max_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_duration_secs).unwrap_or(Duration::MAX)
    }

    /// The watchdog tick interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Overrides the deadline window.
    pub fn with_max_duration(mut self, max: Duration) -> Self {
        self.max_duration_secs = max.as_secs_f64();
        self
    }

    /// Overrides the tick interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_isolation(mut self, kind: IsolationKind) -> Self {
        self.isolation.kind = kind;
        self
    }

    pub fn with_run_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.run_log = Some(path.into());
        self
    }
}
