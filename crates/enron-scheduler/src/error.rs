use thiserror::Error;

/// Errors that can end a single scheduler iteration.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The maintenance operation or handle acquisition failed.
    #[error(transparent)]
    Maintenance(#[from] enron_maintenance::MaintenanceError),

    /// The record processor rejected the whole batch.
    #[error("processor error: {0}")]
    Processor(String),

    /// The blocking worker running the database call panicked or was cancelled.
    #[error("worker error: {0}")]
    Worker(String),
}

impl From<rusqlite::Error> for SchedulerError {
    fn from(e: rusqlite::Error) -> Self {
        SchedulerError::Maintenance(e.into())
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
