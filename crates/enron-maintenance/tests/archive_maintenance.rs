// Maintenance operations against on-disk archive databases.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;

use enron_maintenance::operations::integrity_check;
use enron_maintenance::{run_once_to, Database, MaintenanceError, MaintenanceOp, OpOutcome};
use rusqlite::Connection;

fn create_archive(path: &Path) {
    Connection::open(path)
        .unwrap()
        .execute_batch(
            "CREATE TABLE emails (
                id     INTEGER PRIMARY KEY AUTOINCREMENT,
                user   TEXT,
                folder TEXT,
                body   TEXT
            );",
        )
        .unwrap();
}

fn snapshot(db: &Database) -> (Vec<(String, String, Option<String>)>, Vec<(i64, Option<String>)>) {
    db.with_conn(|conn| {
        let mut schema = conn.prepare(
            "SELECT type, name, sql FROM sqlite_master
             WHERE name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let schema = schema
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut rows = conn.prepare("SELECT id, body FROM emails ORDER BY id")?;
        let rows = rows
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((schema, rows))
    })
    .unwrap()
}

#[test]
fn cleanup_end_to_end_leaves_the_non_empty_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("enron.db");
    create_archive(&path);
    Connection::open(&path)
        .unwrap()
        .execute_batch(
            "INSERT INTO emails (user, folder, body) VALUES ('skilling-j', 'inbox', '');
             INSERT INTO emails (user, folder, body)
             VALUES ('skilling-j', 'inbox', 'Board meeting moved.');",
        )
        .unwrap();

    let db = Database::new(&path, Duration::from_secs(1));
    let mut out = Vec::new();
    run_once_to(&db, MaintenanceOp::Cleanup, &mut out).unwrap();

    let (_, rows) = snapshot(&db);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1.as_deref(), Some("Board meeting moved."));
}

#[test]
fn every_idempotent_op_is_stable_on_second_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("enron.db");
    create_archive(&path);
    Connection::open(&path)
        .unwrap()
        .execute_batch(
            "INSERT INTO emails (user, folder, body) VALUES
                ('kean-s', 'inbox', 'FYI'),
                ('kean-s', 'deleted', NULL),
                ('kean-s', 'sent', 'Thanks');",
        )
        .unwrap();
    let db = Database::new(&path, Duration::from_secs(1));

    for op in MaintenanceOp::ALL.into_iter().filter(|op| op.is_idempotent()) {
        db.with_conn(|conn| op.run(conn)).unwrap();
        let first = snapshot(&db);
        db.with_conn(|conn| op.run(conn)).unwrap();
        let second = snapshot(&db);
        assert_eq!(first, second, "{op} changed state on its second run");
    }
}

#[test]
fn healthcheck_flags_a_corrupted_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("enron.db");
    create_archive(&path);
    {
        let mut conn = Connection::open(&path).unwrap();
        let tx = conn.transaction().unwrap();
        for i in 0..500 {
            tx.execute(
                "INSERT INTO emails (user, folder, body) VALUES (?1, 'inbox', ?2)",
                rusqlite::params![format!("user-{}", i % 7), "x".repeat(200)],
            )
            .unwrap();
        }
        tx.commit().unwrap();
    }

    // Scribble over pages 2..4; page 1 (header + schema) stays intact.
    let page_size = 4096u64;
    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(page_size)).unwrap();
    file.write_all(&vec![0xA5u8; (page_size * 3) as usize]).unwrap();
    file.sync_all().unwrap();
    drop(file);

    let db = Database::new(&path, Duration::from_secs(1));
    match db.with_conn(|conn| integrity_check(conn)) {
        Ok(report) => {
            assert!(!report.is_ok());
            assert_ne!(report.summary(), "ok");
        }
        // Severe damage can make the pragma itself fail.
        Err(e) => assert!(matches!(e, MaintenanceError::Database(_))),
    }

    let err = db.with_conn(|conn| MaintenanceOp::Healthcheck.run(conn)).unwrap_err();
    assert!(matches!(
        err,
        MaintenanceError::IntegrityFailed(_) | MaintenanceError::Database(_)
    ));
}

#[test]
fn sound_file_reports_literal_ok() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("enron.db");
    create_archive(&path);
    let db = Database::new(&path, Duration::from_secs(1));

    let outcome = db.with_conn(|conn| MaintenanceOp::Healthcheck.run(conn)).unwrap();
    match outcome {
        OpOutcome::Integrity(report) => assert_eq!(report.messages, vec!["ok".to_string()]),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn outcome_serializes_with_op_tag() {
    let json = serde_json::to_value(OpOutcome::Cleaned { rows_deleted: 3 }).unwrap();
    assert_eq!(json["op"], "cleaned");
    assert_eq!(json["rows_deleted"], 3);
}
