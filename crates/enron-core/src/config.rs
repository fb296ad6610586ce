use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DB_PATH: &str = "/app/data/enron.db";
pub const DEFAULT_CONFIG_PATH: &str = "enron-agents.toml";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Top-level config (enron-agents.toml + ENRON_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnronConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// How long a statement waits on another process's lock before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Per-loop settings for the agent daemon.
///
/// An absent `every_secs` falls back to the task's built-in interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub every_secs: Option<u64>,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            every_secs: None,
            enabled: true,
        }
    }
}

impl TaskConfig {
    /// Resolve the configured interval, using `default_secs` when unset.
    pub fn every_or(&self, default_secs: u64) -> Duration {
        Duration::from_secs(self.every_secs.unwrap_or(default_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum records handed to a summarizer/classifier per iteration.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub summarizer: TaskConfig,
    #[serde(default)]
    pub classifier: TaskConfig,
    #[serde(default)]
    pub cleanup: TaskConfig,
    #[serde(default)]
    pub vacuum: TaskConfig,
    #[serde(default)]
    pub healthcheck: TaskConfig,
    #[serde(default)]
    pub metrics: TaskConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            summarizer: TaskConfig::default(),
            classifier: TaskConfig::default(),
            cleanup: TaskConfig::default(),
            vacuum: TaskConfig::default(),
            healthcheck: TaskConfig::default(),
            metrics: TaskConfig::default(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}
fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl EnronConfig {
    /// Load config from a TOML file with ENRON_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g. `ENRON_DATABASE__PATH`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or(DEFAULT_CONFIG_PATH);
        tracing::debug!(%path, "loading configuration");

        let config: EnronConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ENRON_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a loop spin or a pipeline fetch nothing.
    pub fn validate(&self) -> crate::error::Result<()> {
        let scheduler = &self.scheduler;
        if scheduler.batch_size == 0 {
            return Err(crate::error::CoreError::Config(
                "scheduler.batch_size must be at least 1".to_string(),
            ));
        }
        for (name, task) in scheduler.tasks() {
            if task.every_secs == Some(0) {
                return Err(crate::error::CoreError::Config(format!(
                    "scheduler.{name}.every_secs must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

impl SchedulerConfig {
    /// Each loop's settings, keyed by its config table name.
    pub fn tasks(&self) -> [(&'static str, &TaskConfig); 6] {
        [
            ("summarizer", &self.summarizer),
            ("classifier", &self.classifier),
            ("cleanup", &self.cleanup),
            ("vacuum", &self.vacuum),
            ("healthcheck", &self.healthcheck),
            ("metrics", &self.metrics),
        ]
    }
}
