use std::io::{self, Write};

use tracing::{error, info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::operations::{MaintenanceOp, OpOutcome};

/// Run exactly one operation and print its console lines to stdout.
pub fn run_once(db: &Database, op: MaintenanceOp) -> Result<OpOutcome> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_once_to(db, op, &mut out)
}

/// Run exactly one operation, writing the starting and completion lines to `out`.
///
/// The handle is closed before returning, whether the operation succeeded or
/// not. A close failure is only reported when the operation itself succeeded.
pub fn run_once_to<W: Write>(db: &Database, op: MaintenanceOp, out: &mut W) -> Result<OpOutcome> {
    print_line(out, &op.start_message());
    info!(%op, path = %db.path().display(), "one-shot maintenance starting");

    let result = db.with_conn(|conn| op.run(conn));
    let closed = db.close();

    match &result {
        Ok(outcome) => {
            print_line(out, &op.complete_message(outcome));
            info!(%op, "one-shot maintenance complete");
        }
        Err(e) => {
            print_line(out, &format!("❌ {op} failed: {e}"));
            error!(%op, kind = e.kind(), error = %e, "one-shot maintenance failed");
        }
    }

    match closed {
        Err(e) if result.is_ok() => Err(e),
        Err(e) => {
            warn!(error = %e, "close failed after operation error");
            result
        }
        Ok(()) => result,
    }
}

// Console output is best-effort; a closed stdout must not mask the outcome.
fn print_line<W: Write>(out: &mut W, line: &str) {
    let _ = writeln!(out, "{line}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rusqlite::Connection;

    fn seeded(dir: &tempfile::TempDir) -> Database {
        let path = dir.path().join("enron.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE emails (id INTEGER PRIMARY KEY, user TEXT, folder TEXT, body TEXT);
                 INSERT INTO emails (user, folder, body) VALUES ('a', 'inbox', '');",
            )
            .unwrap();
        Database::new(path, Duration::from_millis(100))
    }

    #[test]
    fn prints_start_and_completion_and_releases_handle() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded(&dir);
        let mut out = Vec::new();

        let outcome = run_once_to(&db, MaintenanceOp::Cleanup, &mut out).unwrap();
        assert_eq!(outcome, OpOutcome::Cleaned { rows_deleted: 1 });
        assert!(!db.is_open());

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "🧹 Running cleanup agent...");
        assert!(lines[1].starts_with("✅ Cleanup complete."));
    }

    #[test]
    fn healthcheck_prints_result_string() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded(&dir);
        let mut out = Vec::new();

        run_once_to(&db, MaintenanceOp::Healthcheck, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.lines().any(|l| l == "Health Check: ok"));
    }

    #[test]
    fn failure_is_returned_and_handle_still_released() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded(&dir);
        let mut out = Vec::new();

        run_once_to(&db, MaintenanceOp::Migration, &mut out).unwrap();
        let err = run_once_to(&db, MaintenanceOp::Migration, &mut out).unwrap_err();
        assert_eq!(err.kind(), "COLUMN_EXISTS");
        assert!(!db.is_open());

        let text = String::from_utf8(out).unwrap();
        assert!(text.lines().last().unwrap().starts_with("❌ migration failed"));
    }

    #[test]
    fn missing_database_is_an_acquisition_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("gone.db"), Duration::from_millis(100));
        let mut out = Vec::new();

        let err = run_once_to(&db, MaintenanceOp::Analyze, &mut out).unwrap_err();
        assert!(err.is_acquisition());
    }
}
