//! `enron-scheduler` — the agent daemon's fixed-interval background loops.
//!
//! # Overview
//!
//! [`engine::SchedulerEngine`] spawns one Tokio task per [`types::TaskSpec`].
//! Each loop logs its intent, performs the work, then sleeps for its interval
//! until the shutdown signal fires. A failed iteration is logged and counted;
//! the loop keeps going.
//!
//! # Tasks
//!
//! | Task          | Default interval | Work                                   |
//! |---------------|------------------|----------------------------------------|
//! | `Summarizer`  | 1 min            | batch pipeline via [`RecordProcessor`] |
//! | `Classifier`  | 1 min            | batch pipeline via [`RecordProcessor`] |
//! | `Cleanup`     | 10 min           | `MaintenanceOp::Cleanup`               |
//! | `Vacuum`      | 1 h              | `MaintenanceOp::Vacuum`                |
//! | `Healthcheck` | 30 min           | `MaintenanceOp::Healthcheck`           |
//! | `Metrics`     | 5 min            | `MaintenanceOp::Metrics`               |

pub mod engine;
pub mod error;
pub mod processor;
pub mod types;

pub use engine::{SchedulerEngine, SchedulerHandle};
pub use error::{Result, SchedulerError};
pub use processor::{
    EmailRecord, Pipeline, PipelineReport, PipelineTarget, ProcessedRecord, RecordFailure,
    RecordProcessor, RecordResult,
};
pub use types::{TaskKind, TaskSpec, TaskStatus, MIN_EVERY};
