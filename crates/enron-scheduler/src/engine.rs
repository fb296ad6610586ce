use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use enron_core::SchedulerConfig;
use enron_maintenance::{Database, OpOutcome};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    error::Result,
    processor::{blocking, Pipeline, PipelineTarget, RecordProcessor},
    types::{TaskKind, TaskSpec, TaskStatus},
};

/// Hosts the daemon's independent fixed-interval loops.
///
/// Loops share nothing but the [`Database`] owner, which serializes their
/// statements. There is no ordering between loops.
pub struct SchedulerEngine {
    db: Database,
    specs: Vec<TaskSpec>,
    summarizer: Option<Arc<dyn RecordProcessor>>,
    classifier: Option<Arc<dyn RecordProcessor>>,
    batch_size: usize,
}

impl SchedulerEngine {
    pub fn new(db: Database, specs: Vec<TaskSpec>) -> Self {
        Self {
            db,
            specs,
            summarizer: None,
            classifier: None,
            batch_size: enron_core::config::DEFAULT_BATCH_SIZE,
        }
    }

    pub fn from_config(db: Database, config: &SchedulerConfig) -> Self {
        Self::new(db, TaskSpec::from_config(config)).with_batch_size(config.batch_size)
    }

    pub fn with_summarizer(mut self, processor: Arc<dyn RecordProcessor>) -> Self {
        self.summarizer = Some(processor);
        self
    }

    pub fn with_classifier(mut self, processor: Arc<dyn RecordProcessor>) -> Self {
        self.classifier = Some(processor);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Spawn every loop and return immediately.
    ///
    /// Loops exit once `shutdown` broadcasts `true` or its sender is dropped.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> SchedulerHandle {
        let batch_size = self.batch_size;
        let worker = Arc::new(Worker {
            db: self.db,
            summarizer: self
                .summarizer
                .map(|p| Pipeline::new(p, PipelineTarget::Summaries, batch_size)),
            classifier: self
                .classifier
                .map(|p| Pipeline::new(p, PipelineTarget::Classifications, batch_size)),
        });

        let loops = self
            .specs
            .into_iter()
            .map(|spec| {
                let counters = Arc::new(TaskCounters::default());
                let join = tokio::spawn(run_loop(
                    Arc::clone(&worker),
                    spec,
                    Arc::clone(&counters),
                    shutdown.clone(),
                ));
                LoopEntry {
                    spec,
                    counters,
                    join,
                }
            })
            .collect::<Vec<_>>();

        info!(tasks = loops.len(), "agent scheduler started");
        SchedulerHandle { loops }
    }
}

/// Running loops, for inspection and joining.
pub struct SchedulerHandle {
    loops: Vec<LoopEntry>,
}

struct LoopEntry {
    spec: TaskSpec,
    counters: Arc<TaskCounters>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn snapshot(&self) -> Vec<TaskStatus> {
        self.loops
            .iter()
            .map(|entry| entry.counters.status(entry.spec))
            .collect()
    }

    /// True while every spawned loop is still alive.
    pub fn is_running(&self) -> bool {
        !self.loops.is_empty() && self.loops.iter().all(|entry| !entry.join.is_finished())
    }

    pub async fn join(self) {
        for entry in self.loops {
            if let Err(e) = entry.join.await {
                error!(task = %entry.spec.kind, "task loop ended abnormally: {e}");
            }
        }
        info!("agent scheduler stopped");
    }
}

#[derive(Default)]
struct TaskCounters {
    iterations: AtomicU64,
    failures: AtomicU64,
    last: Mutex<LastRun>,
}

#[derive(Default)]
struct LastRun {
    at: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl TaskCounters {
    fn begin(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, result: &Result<()>) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.at = Some(Utc::now());
        match result {
            Ok(()) => last.error = None,
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                last.error = Some(e.to_string());
            }
        }
    }

    fn status(&self, spec: TaskSpec) -> TaskStatus {
        let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        TaskStatus {
            kind: spec.kind,
            every: spec.every,
            iterations: self.iterations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            last_run: last.at,
            last_error: last.error.clone(),
        }
    }
}

struct Worker {
    db: Database,
    summarizer: Option<Pipeline>,
    classifier: Option<Pipeline>,
}

impl Worker {
    async fn perform(&self, kind: TaskKind) -> Result<()> {
        if let Some(op) = kind.maintenance_op() {
            let db = self.db.clone();
            let outcome = blocking(move || db.with_conn(|conn| op.run(conn))).await?;
            log_outcome(kind, &outcome);
            return Ok(());
        }

        let pipeline = match kind {
            TaskKind::Summarizer => &self.summarizer,
            _ => &self.classifier,
        };
        let Some(pipeline) = pipeline else {
            debug!(task = %kind, "no record processor attached; skipping");
            return Ok(());
        };

        let report = pipeline.run(&self.db).await?;
        if report.fetched > 0 {
            info!(
                task = %kind,
                processor = pipeline.processor_name(),
                fetched = report.fetched,
                written = report.written,
                failed = report.failed,
                "batch processed"
            );
        }
        Ok(())
    }
}

fn log_outcome(kind: TaskKind, outcome: &OpOutcome) {
    match outcome {
        OpOutcome::Cleaned { rows_deleted } => {
            info!(task = %kind, rows_deleted, "cleanup pass complete")
        }
        OpOutcome::Integrity(report) => {
            info!(task = %kind, result = %report.summary(), "integrity check passed")
        }
        OpOutcome::Metrics(m) => info!(
            task = %kind,
            total_emails = m.total_emails,
            empty_bodies = m.empty_bodies,
            size_bytes = m.size_bytes(),
            reclaimable_bytes = m.reclaimable_bytes(),
            "usage statistics"
        ),
        other => debug!(task = %kind, outcome = ?other, "iteration complete"),
    }
}

/// waiting → running → waiting, until shutdown.
async fn run_loop(
    worker: Arc<Worker>,
    spec: TaskSpec,
    counters: Arc<TaskCounters>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(task = %spec.kind, every_secs = spec.every.as_secs_f64(), "task loop started");
    loop {
        if *shutdown.borrow() {
            break;
        }

        info!(task = %spec.kind, "{}", spec.kind.intent());
        counters.begin();
        let result = worker.perform(spec.kind).await;
        if let Err(ref e) = result {
            // keep the loop alive; the next attempt happens on schedule
            error!(task = %spec.kind, error = %e, "task iteration failed");
        }
        counters.finish(&result);

        if !sleep_or_shutdown(spec, &mut shutdown).await {
            break;
        }
    }
    info!(task = %spec.kind, "task loop stopped");
}

/// Wait out the interval. Returns false if shutdown was requested meanwhile.
async fn sleep_or_shutdown(spec: TaskSpec, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(spec.every);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    warn!(task = %spec.kind, "shutdown sender dropped; stopping");
                    return false;
                }
                if *shutdown.borrow() {
                    return false;
                }
            }
        }
    }
}
