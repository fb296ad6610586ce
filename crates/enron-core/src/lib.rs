//! Shared configuration and error types for the enron maintenance agents.

pub mod config;
pub mod error;

pub use config::{DatabaseConfig, EnronConfig, SchedulerConfig, TaskConfig};
pub use error::{CoreError, Result};
