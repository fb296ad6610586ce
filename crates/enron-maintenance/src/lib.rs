//! `enron-maintenance` — handle ownership and one-shot maintenance operations
//! for the email archive's SQLite store.
//!
//! # Operations
//!
//! | Op            | Statement                                            | Idempotent |
//! |---------------|------------------------------------------------------|------------|
//! | `Analyze`     | `ANALYZE`                                            | yes        |
//! | `Cleanup`     | `DELETE FROM emails WHERE body IS NULL OR body = ''` | yes        |
//! | `Healthcheck` | `PRAGMA integrity_check`                             | yes        |
//! | `Indexing`    | `CREATE INDEX IF NOT EXISTS` on `user`, `folder`     | yes        |
//! | `Migration`   | `ALTER TABLE emails ADD COLUMN word_count INTEGER`   | no         |
//! | `Vacuum`      | `VACUUM`                                             | yes        |
//! | `Metrics`     | row counts and page pragmas                          | read-only  |

pub mod db;
pub mod error;
pub mod operations;
pub mod runner;

pub use db::Database;
pub use error::{MaintenanceError, Result};
pub use operations::{EmailMetrics, IntegrityReport, MaintenanceOp, OpOutcome};
pub use runner::{run_once, run_once_to};
