use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while acquiring the store or executing an operation.
#[derive(Debug, Error)]
pub enum MaintenanceError {
    /// The database file could not be opened (missing, permissions, not a database).
    #[error("cannot open database at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Underlying SQLite / rusqlite error while executing a statement.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The column a migration adds is already present.
    #[error("column {table}.{column} already exists")]
    ColumnExists { table: String, column: String },

    /// `PRAGMA integrity_check` reported something other than `ok`.
    #[error("integrity check failed: {0}")]
    IntegrityFailed(String),

    #[error("failed to close database: {0}")]
    Close(rusqlite::Error),
}

impl MaintenanceError {
    /// Short error code used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            MaintenanceError::Open { .. } => "OPEN_FAILED",
            MaintenanceError::Database(_) => "DATABASE_ERROR",
            MaintenanceError::ColumnExists { .. } => "COLUMN_EXISTS",
            MaintenanceError::IntegrityFailed(_) => "INTEGRITY_FAILED",
            MaintenanceError::Close(_) => "CLOSE_FAILED",
        }
    }

    /// True when the store itself could not be acquired.
    pub fn is_acquisition(&self) -> bool {
        matches!(self, MaintenanceError::Open { .. })
    }
}

pub type Result<T> = std::result::Result<T, MaintenanceError>;
