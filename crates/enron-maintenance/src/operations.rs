use std::fmt;
use std::str::FromStr;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{MaintenanceError, Result};

const EMAILS_TABLE: &str = "emails";
const MIGRATION_COLUMN: &str = "word_count";
const INDEXES: [(&str, &str); 2] = [
    (
        "idx_user_id",
        "CREATE INDEX IF NOT EXISTS idx_user_id ON emails(user)",
    ),
    (
        "idx_folder",
        "CREATE INDEX IF NOT EXISTS idx_folder ON emails(folder)",
    ),
];

/// A named unit of database work. Takes nothing but the open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaintenanceOp {
    /// Refresh query-planner statistics.
    Analyze,
    /// Delete rows whose body is NULL or empty.
    Cleanup,
    /// Run `PRAGMA integrity_check`.
    Healthcheck,
    /// Ensure the `user` and `folder` indexes exist.
    Indexing,
    /// Add the `word_count` column. Fails once the column exists.
    Migration,
    /// Rebuild the file to reclaim free pages.
    Vacuum,
    /// Count rows and pages for the usage log.
    Metrics,
}

/// What an operation reports back on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpOutcome {
    Analyzed,
    Cleaned { rows_deleted: usize },
    Integrity(IntegrityReport),
    Indexed { indexes: Vec<String> },
    Migrated { column: String },
    Vacuumed,
    Metrics(EmailMetrics),
}

/// Rows returned by `PRAGMA integrity_check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub messages: Vec<String>,
}

impl IntegrityReport {
    /// SQLite answers a single `ok` row for a sound database.
    pub fn is_ok(&self) -> bool {
        self.messages.len() == 1 && self.messages[0] == "ok"
    }

    pub fn summary(&self) -> String {
        self.messages.join("; ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmailMetrics {
    pub total_emails: i64,
    pub empty_bodies: i64,
    pub page_count: i64,
    pub page_size: i64,
    pub freelist_pages: i64,
}

impl EmailMetrics {
    pub fn size_bytes(&self) -> i64 {
        self.page_count * self.page_size
    }

    /// Bytes a VACUUM would hand back to the filesystem.
    pub fn reclaimable_bytes(&self) -> i64 {
        self.freelist_pages * self.page_size
    }
}

impl MaintenanceOp {
    pub const ALL: [MaintenanceOp; 7] = [
        MaintenanceOp::Analyze,
        MaintenanceOp::Cleanup,
        MaintenanceOp::Healthcheck,
        MaintenanceOp::Indexing,
        MaintenanceOp::Migration,
        MaintenanceOp::Vacuum,
        MaintenanceOp::Metrics,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MaintenanceOp::Analyze => "analyze",
            MaintenanceOp::Cleanup => "cleanup",
            MaintenanceOp::Healthcheck => "healthcheck",
            MaintenanceOp::Indexing => "indexing",
            MaintenanceOp::Migration => "migration",
            MaintenanceOp::Vacuum => "vacuum",
            MaintenanceOp::Metrics => "metrics",
        }
    }

    /// Short tag printed in front of the op's console lines.
    pub fn label(self) -> &'static str {
        match self {
            MaintenanceOp::Analyze => "📊",
            MaintenanceOp::Cleanup => "🧹",
            MaintenanceOp::Healthcheck => "🩺",
            MaintenanceOp::Indexing => "🏗️",
            MaintenanceOp::Migration => "🔁",
            MaintenanceOp::Vacuum => "🗜️",
            MaintenanceOp::Metrics => "📈",
        }
    }

    pub fn is_idempotent(self) -> bool {
        !matches!(self, MaintenanceOp::Migration)
    }

    pub fn start_message(self) -> String {
        let text = match self {
            MaintenanceOp::Analyze => "Running ANALYZE...",
            MaintenanceOp::Cleanup => "Running cleanup agent...",
            MaintenanceOp::Healthcheck => "Performing health check...",
            MaintenanceOp::Indexing => "Creating indexes...",
            MaintenanceOp::Migration => "Running migration agent...",
            MaintenanceOp::Vacuum => "Vacuuming database...",
            MaintenanceOp::Metrics => "Collecting usage statistics...",
        };
        format!("{} {text}", self.label())
    }

    pub fn complete_message(self, outcome: &OpOutcome) -> String {
        match outcome {
            OpOutcome::Analyzed => "✅ ANALYZE complete.".to_string(),
            OpOutcome::Cleaned { rows_deleted } => {
                format!("✅ Cleanup complete. Removed {rows_deleted} empty emails.")
            }
            OpOutcome::Integrity(report) => format!("Health Check: {}", report.summary()),
            OpOutcome::Indexed { indexes } => {
                format!("✅ Indexes created: {}.", indexes.join(", "))
            }
            OpOutcome::Migrated { column } => format!("✅ Column {column} added."),
            OpOutcome::Vacuumed => "✅ Vacuum complete.".to_string(),
            OpOutcome::Metrics(m) => format!(
                "✅ {} emails ({} empty), {} bytes, {} reclaimable.",
                m.total_emails,
                m.empty_bodies,
                m.size_bytes(),
                m.reclaimable_bytes()
            ),
        }
    }

    /// Execute the operation synchronously against `conn`.
    pub fn run(self, conn: &Connection) -> Result<OpOutcome> {
        debug!(op = %self, "executing maintenance operation");
        match self {
            MaintenanceOp::Analyze => {
                conn.execute_batch("ANALYZE")?;
                Ok(OpOutcome::Analyzed)
            }
            MaintenanceOp::Cleanup => {
                let rows_deleted = cleanup(conn)?;
                Ok(OpOutcome::Cleaned { rows_deleted })
            }
            MaintenanceOp::Healthcheck => {
                let report = integrity_check(conn)?;
                if !report.is_ok() {
                    warn!(result = %report.summary(), "integrity check reported problems");
                    return Err(MaintenanceError::IntegrityFailed(report.summary()));
                }
                Ok(OpOutcome::Integrity(report))
            }
            MaintenanceOp::Indexing => {
                let indexes = create_indexes(conn)?;
                Ok(OpOutcome::Indexed { indexes })
            }
            MaintenanceOp::Migration => {
                add_word_count_column(conn)?;
                Ok(OpOutcome::Migrated {
                    column: MIGRATION_COLUMN.to_string(),
                })
            }
            MaintenanceOp::Vacuum => {
                conn.execute_batch("VACUUM")?;
                Ok(OpOutcome::Vacuumed)
            }
            MaintenanceOp::Metrics => Ok(OpOutcome::Metrics(collect_metrics(conn)?)),
        }
    }
}

impl fmt::Display for MaintenanceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MaintenanceOp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "analyze" => Ok(MaintenanceOp::Analyze),
            "cleanup" => Ok(MaintenanceOp::Cleanup),
            "healthcheck" => Ok(MaintenanceOp::Healthcheck),
            "indexing" | "index" => Ok(MaintenanceOp::Indexing),
            "migration" | "migrate" => Ok(MaintenanceOp::Migration),
            "vacuum" => Ok(MaintenanceOp::Vacuum),
            "metrics" => Ok(MaintenanceOp::Metrics),
            other => Err(format!("unknown maintenance operation: {other}")),
        }
    }
}

fn cleanup(conn: &Connection) -> Result<usize> {
    let n = conn.execute("DELETE FROM emails WHERE body IS NULL OR body = ''", [])?;
    if n > 0 {
        info!(rows = n, "deleted emails with empty bodies");
    }
    Ok(n)
}

/// Collect every row of `PRAGMA integrity_check`.
///
/// A corrupt file may also make the pragma itself fail; that comes back as
/// `MaintenanceError::Database`.
pub fn integrity_check(conn: &Connection) -> Result<IntegrityReport> {
    let mut stmt = conn.prepare("PRAGMA integrity_check")?;
    let messages = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(IntegrityReport { messages })
}

// The two statements are independent; either order ends in the same schema.
fn create_indexes(conn: &Connection) -> Result<Vec<String>> {
    let mut created = Vec::with_capacity(INDEXES.len());
    for (name, sql) in INDEXES {
        conn.execute_batch(sql)?;
        created.push(name.to_string());
    }
    Ok(created)
}

// Populating the new column is not part of this migration.
fn add_word_count_column(conn: &Connection) -> Result<()> {
    let sql = format!("ALTER TABLE {EMAILS_TABLE} ADD COLUMN {MIGRATION_COLUMN} INTEGER");
    match conn.execute_batch(&sql) {
        Ok(()) => {
            info!(table = EMAILS_TABLE, column = MIGRATION_COLUMN, "column added");
            Ok(())
        }
        Err(rusqlite::Error::SqliteFailure(_, Some(ref msg)))
            if msg.starts_with("duplicate column name") =>
        {
            Err(MaintenanceError::ColumnExists {
                table: EMAILS_TABLE.to_string(),
                column: MIGRATION_COLUMN.to_string(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

pub fn collect_metrics(conn: &Connection) -> Result<EmailMetrics> {
    let (total_emails, empty_bodies): (i64, i64) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN body IS NULL OR body = '' THEN 1 ELSE 0 END), 0)
         FROM emails",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let page_count: i64 = conn.pragma_query_value(None, "page_count", |row| row.get(0))?;
    let page_size: i64 = conn.pragma_query_value(None, "page_size", |row| row.get(0))?;
    let freelist_pages: i64 = conn.pragma_query_value(None, "freelist_count", |row| row.get(0))?;

    Ok(EmailMetrics {
        total_emails,
        empty_bodies,
        page_count,
        page_size,
        freelist_pages,
    })
}
