use std::time::Duration;

use chrono::{DateTime, Utc};
use enron_core::SchedulerConfig;
use enron_maintenance::MaintenanceOp;

/// The daemon's named background loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Summarizer,
    Classifier,
    Cleanup,
    Vacuum,
    Healthcheck,
    Metrics,
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Summarizer,
        TaskKind::Classifier,
        TaskKind::Cleanup,
        TaskKind::Vacuum,
        TaskKind::Healthcheck,
        TaskKind::Metrics,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TaskKind::Summarizer => "summarizer",
            TaskKind::Classifier => "classifier",
            TaskKind::Cleanup => "cleanup",
            TaskKind::Vacuum => "vacuum",
            TaskKind::Healthcheck => "healthcheck",
            TaskKind::Metrics => "metrics",
        }
    }

    /// Line logged at the top of every iteration.
    pub fn intent(self) -> &'static str {
        match self {
            TaskKind::Summarizer => "🧠 [Summarizer] Checking for emails to summarize...",
            TaskKind::Classifier => "🧠 [Classifier] Checking for unclassified emails...",
            TaskKind::Cleanup => "🧹 [Cleanup] Deleting broken or empty emails...",
            TaskKind::Vacuum => "🗜️ [Vacuum] Running DB vacuum...",
            TaskKind::Healthcheck => "🩺 [Healthcheck] Running integrity check...",
            TaskKind::Metrics => "📈 [Metrics] Collecting usage statistics...",
        }
    }

    pub fn default_every(self) -> Duration {
        Duration::from_secs(self.default_every_secs())
    }

    fn default_every_secs(self) -> u64 {
        match self {
            TaskKind::Summarizer | TaskKind::Classifier => 60,
            TaskKind::Cleanup => 10 * 60,
            TaskKind::Vacuum => 60 * 60,
            TaskKind::Healthcheck => 30 * 60,
            TaskKind::Metrics => 5 * 60,
        }
    }

    /// The maintenance operation this loop drives, if it maps onto one.
    /// Summarizer and classifier run record pipelines instead.
    pub fn maintenance_op(self) -> Option<MaintenanceOp> {
        match self {
            TaskKind::Summarizer | TaskKind::Classifier => None,
            TaskKind::Cleanup => Some(MaintenanceOp::Cleanup),
            TaskKind::Vacuum => Some(MaintenanceOp::Vacuum),
            TaskKind::Healthcheck => Some(MaintenanceOp::Healthcheck),
            TaskKind::Metrics => Some(MaintenanceOp::Metrics),
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Shortest interval a configured loop may run at.
pub const MIN_EVERY: Duration = Duration::from_secs(1);

/// One loop to run: what, and how often.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    pub kind: TaskKind,
    pub every: Duration,
}

impl TaskSpec {
    pub fn new(kind: TaskKind, every: Duration) -> Self {
        Self { kind, every }
    }

    /// All six loops at their built-in intervals.
    pub fn defaults() -> Vec<TaskSpec> {
        TaskKind::ALL
            .into_iter()
            .map(|kind| TaskSpec::new(kind, kind.default_every()))
            .collect()
    }

    /// Enabled loops from config, falling back to built-in intervals.
    /// Intervals below [`MIN_EVERY`] are raised to it.
    pub fn from_config(config: &SchedulerConfig) -> Vec<TaskSpec> {
        TaskKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let task = match kind {
                    TaskKind::Summarizer => &config.summarizer,
                    TaskKind::Classifier => &config.classifier,
                    TaskKind::Cleanup => &config.cleanup,
                    TaskKind::Vacuum => &config.vacuum,
                    TaskKind::Healthcheck => &config.healthcheck,
                    TaskKind::Metrics => &config.metrics,
                };
                let every = task.every_or(kind.default_every_secs()).max(MIN_EVERY);
                task.enabled.then(|| TaskSpec::new(kind, every))
            })
            .collect()
    }
}

/// Point-in-time view of one loop's progress.
#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub kind: TaskKind,
    pub every: Duration,
    /// Iterations started, including failed ones.
    pub iterations: u64,
    pub failures: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
