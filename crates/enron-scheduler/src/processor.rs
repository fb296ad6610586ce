//! Collaborator interface for the summarizer and classifier loops.
//!
//! The scheduler owns the database side of these loops (picking unprocessed
//! emails, writing results back); the actual summarizing or classifying is
//! done by a [`RecordProcessor`] supplied by the embedding binary.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use enron_maintenance::Database;
use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::error::{Result, SchedulerError};

/// An email handed to a processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRecord {
    pub id: i64,
    pub subject: Option<String>,
    pub body: String,
}

/// A processor's answer for one email: a summary or a category label.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRecord {
    pub email_id: i64,
    pub label: String,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub email_id: i64,
    pub reason: String,
}

pub type RecordResult = std::result::Result<ProcessedRecord, RecordFailure>;

/// Turns a batch of unprocessed emails into per-record results.
///
/// Return `Err` only when the whole batch could not be handled (e.g. the
/// backing service is unreachable); single bad records go in the vector.
#[async_trait]
pub trait RecordProcessor: Send + Sync {
    fn name(&self) -> &str;
    async fn process(&self, batch: Vec<EmailRecord>) -> Result<Vec<RecordResult>>;
}

/// Where a pipeline reads its backlog from and writes results to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineTarget {
    /// `emails.summary`
    Summaries,
    /// `email_classifications`
    Classifications,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub fetched: usize,
    pub written: usize,
    pub failed: usize,
}

/// A processor bound to its target, sweeping the backlog in id order.
///
/// Each pass resumes after the highest id the previous pass fetched, so
/// records that keep failing cannot crowd out the rest of the backlog. A
/// short batch means the sweep reached the end; the next pass starts over
/// from the lowest id and retries earlier failures.
pub struct Pipeline {
    processor: Arc<dyn RecordProcessor>,
    target: PipelineTarget,
    batch_size: usize,
    cursor: AtomicI64,
}

impl Pipeline {
    pub fn new(
        processor: Arc<dyn RecordProcessor>,
        target: PipelineTarget,
        batch_size: usize,
    ) -> Self {
        Self {
            processor,
            target,
            batch_size: batch_size.max(1),
            cursor: AtomicI64::new(0),
        }
    }

    pub fn processor_name(&self) -> &str {
        self.processor.name()
    }

    /// One pass: fetch up to `batch_size` records, process, write back.
    pub async fn run(&self, db: &Database) -> Result<PipelineReport> {
        let target = self.target;
        let batch_size = self.batch_size;
        let after_id = self.cursor.load(Ordering::Relaxed);
        let batch = {
            let db = db.clone();
            blocking(move || {
                db.with_conn(|conn| fetch_backlog(conn, target, after_id, batch_size))
            })
            .await?
        };

        let next_cursor = match batch.last() {
            Some(last) if batch.len() >= batch_size => last.id,
            _ => 0,
        };
        self.cursor.store(next_cursor, Ordering::Relaxed);

        let mut report = PipelineReport {
            fetched: batch.len(),
            ..PipelineReport::default()
        };
        if batch.is_empty() {
            debug!(?target, after_id, "nothing to process");
            return Ok(report);
        }

        let results = self.processor.process(batch).await?;
        let mut done = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(record) => done.push(record),
                Err(failure) => {
                    warn!(
                        processor = self.processor.name(),
                        email_id = failure.email_id,
                        reason = %failure.reason,
                        "record processing failed"
                    );
                    report.failed += 1;
                }
            }
        }

        if !done.is_empty() {
            let db = db.clone();
            report.written =
                blocking(move || db.with_conn(|conn| write_results(conn, target, &done))).await?;
        }
        Ok(report)
    }
}

pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> enron_maintenance::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SchedulerError::Worker(e.to_string()))?
        .map_err(SchedulerError::from)
}

fn fetch_backlog(
    conn: &Connection,
    target: PipelineTarget,
    after_id: i64,
    batch_size: usize,
) -> enron_maintenance::Result<Vec<EmailRecord>> {
    let sql = match target {
        PipelineTarget::Summaries => {
            "SELECT id, subject, body FROM emails
             WHERE summary IS NULL AND body IS NOT NULL AND body <> '' AND id > ?1
             ORDER BY id LIMIT ?2"
        }
        PipelineTarget::Classifications => {
            "SELECT e.id, e.subject, e.body FROM emails e
             LEFT JOIN email_classifications c ON c.email_id = CAST(e.id AS TEXT)
             WHERE c.email_id IS NULL AND e.body IS NOT NULL AND e.body <> '' AND e.id > ?1
             ORDER BY e.id LIMIT ?2"
        }
    };
    let limit = i64::try_from(batch_size).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare_cached(sql)?;
    let records = stmt
        .query_map(params![after_id, limit], |row| {
            Ok(EmailRecord {
                id: row.get(0)?,
                subject: row.get(1)?,
                body: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

fn write_results(
    conn: &Connection,
    target: PipelineTarget,
    records: &[ProcessedRecord],
) -> enron_maintenance::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut written = 0;
    match target {
        PipelineTarget::Summaries => {
            let mut stmt = tx.prepare_cached("UPDATE emails SET summary = ?1 WHERE id = ?2")?;
            for record in records {
                written += stmt.execute(params![record.label, record.email_id])?;
            }
        }
        PipelineTarget::Classifications => {
            // email_classifications.email_id is TEXT
            let mut stmt = tx.prepare_cached(
                "INSERT INTO email_classifications (email_id, category, category_name, confidence)
                 VALUES (?1, ?2, ?2, COALESCE(?3, 0.0))",
            )?;
            for record in records {
                written += stmt.execute(params![
                    record.email_id.to_string(),
                    record.label,
                    record.confidence
                ])?;
            }
        }
    }
    tx.commit()?;
    Ok(written)
}
