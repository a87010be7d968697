//! Runtime configuration.

use crate::errors::{ForgeflowError, Result};
use crate::pipeline::ProgressBudget;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// How the linear progress split is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Percent reserved for planning.
    #[serde(default = "default_planning_percent")]
    pub planning_percent: u8,
    /// Percent reserved for finalization.
    #[serde(default = "default_finalization_percent")]
    pub finalization_percent: u8,
}

fn default_planning_percent() -> u8 {
    10
}

fn default_finalization_percent() -> u8 {
    10
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            planning_percent: default_planning_percent(),
            finalization_percent: default_finalization_percent(),
        }
    }
}

impl From<ProgressConfig> for ProgressBudget {
    fn from(config: ProgressConfig) -> Self {
        Self::new(config.planning_percent, config.finalization_percent)
    }
}

/// Service configuration.
///
/// Every field has a default, so a partial JSON document (or `{}`) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgeflowConfig {
    /// Directory under which per-run output directories are created.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    /// JSON file holding the run records.
    #[serde(default = "default_records_path")]
    pub records_path: PathBuf,
    /// Number of recent events the bus keeps for late observers.
    #[serde(default = "default_replay_capacity")]
    pub replay_capacity: usize,
    /// Queue depth of channel observers before they are evicted.
    #[serde(default = "default_observer_queue_capacity")]
    pub observer_queue_capacity: usize,
    /// Model used when a request names none.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Ollama server URL.
    #[serde(default = "default_ollama_host")]
    pub ollama_host: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Context window in tokens.
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    /// Per-request timeout for completion calls.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Progress split.
    #[serde(default)]
    pub progress: ProgressConfig,
}

fn default_output_root() -> PathBuf {
    PathBuf::from("output")
}

fn default_records_path() -> PathBuf {
    PathBuf::from("output/runs.json")
}

fn default_replay_capacity() -> usize {
    200
}

fn default_observer_queue_capacity() -> usize {
    256
}

fn default_model() -> String {
    "gemma3:4b".to_string()
}

fn default_ollama_host() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_context_window() -> u32 {
    8192
}

fn default_request_timeout() -> u64 {
    600
}

impl Default for ForgeflowConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            records_path: default_records_path(),
            replay_capacity: default_replay_capacity(),
            observer_queue_capacity: default_observer_queue_capacity(),
            default_model: default_model(),
            ollama_host: default_ollama_host(),
            temperature: default_temperature(),
            context_window: default_context_window(),
            request_timeout_seconds: default_request_timeout(),
            progress: ProgressConfig::default(),
        }
    }
}

impl ForgeflowConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ForgeflowError::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| ForgeflowError::Config(format!("invalid {}: {e}", path.display())))
    }

    /// Defaults overridden by environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("FORGEFLOW_OUTPUT_ROOT") {
            self.output_root = PathBuf::from(v);
        }
        if let Some(v) = get("FORGEFLOW_RECORDS_PATH") {
            self.records_path = PathBuf::from(v);
        }
        if let Some(v) = get("FORGEFLOW_REPLAY_CAPACITY") {
            self.replay_capacity = parse("FORGEFLOW_REPLAY_CAPACITY", &v)?;
        }
        if let Some(v) = get("FORGEFLOW_OBSERVER_QUEUE") {
            self.observer_queue_capacity = parse("FORGEFLOW_OBSERVER_QUEUE", &v)?;
        }
        if let Some(v) = get("DEFAULT_MODEL") {
            self.default_model = v;
        }
        if let Some(v) = get("OLLAMA_HOST") {
            self.ollama_host = v;
        }
        if let Some(v) = get("FORGEFLOW_TEMPERATURE") {
            self.temperature = parse("FORGEFLOW_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("FORGEFLOW_NUM_CTX") {
            self.context_window = parse("FORGEFLOW_NUM_CTX", &v)?;
        }
        if let Some(v) = get("FORGEFLOW_REQUEST_TIMEOUT") {
            self.request_timeout_seconds = parse("FORGEFLOW_REQUEST_TIMEOUT", &v)?;
        }
        Ok(self)
    }

    /// Checks values that would make the service misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.replay_capacity == 0 {
            return Err(ForgeflowError::Config(
                "replay_capacity must be at least 1".to_string(),
            ));
        }
        if self.observer_queue_capacity == 0 {
            return Err(ForgeflowError::Config(
                "observer_queue_capacity must be at least 1".to_string(),
            ));
        }
        let reserved =
            u32::from(self.progress.planning_percent) + u32::from(self.progress.finalization_percent);
        if reserved >= 100 {
            return Err(ForgeflowError::Config(format!(
                "planning and finalization shares leave no room for generation ({reserved}%)"
            )));
        }
        Ok(())
    }

    /// Sets the output root.
    #[must_use]
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    /// Sets the records file.
    #[must_use]
    pub fn with_records_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.records_path = path.into();
        self
    }

    /// Sets the replay capacity.
    #[must_use]
    pub const fn with_replay_capacity(mut self, capacity: usize) -> Self {
        self.replay_capacity = capacity;
        self
    }

    /// Returns the completion request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Returns the progress split.
    #[must_use]
    pub fn progress_budget(&self) -> ProgressBudget {
        self.progress.into()
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ForgeflowError::Config(format!("{key}={value:?}: {e}")))
}
