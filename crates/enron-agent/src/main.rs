use std::process::ExitCode;

use clap::Parser;
use enron_core::{EnronConfig, Result as CoreResult};
use enron_maintenance::{run_once, Database, MaintenanceOp};
use enron_scheduler::SchedulerEngine;
use tokio::signal;
use tracing::{error, info, warn};

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // stdout carries the agents' console lines; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "enron_agent=info,enron_scheduler=info,enron_maintenance=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // config: --config > ENRON_CONFIG env > ./enron-agents.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("ENRON_CONFIG").ok());
    let config = match resolve_config(config_path.as_deref(), cli.db.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let db = Database::from_config(&config.database);

    match cli.command.maintenance_op() {
        Some(op) => Ok(ExitCode::from(one_shot(db, op, cli.json).await?)),
        None => {
            daemon(db, &config).await;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Load the config file (a missing file means defaults) and apply `--db`.
fn resolve_config(config_path: Option<&str>, db_override: Option<&str>) -> CoreResult<EnronConfig> {
    let mut config = EnronConfig::load(config_path)?;
    if let Some(path) = db_override {
        config.database.path = path.to_string();
    }
    Ok(config)
}

/// Run a single operation and return the process exit status.
async fn one_shot(db: Database, op: MaintenanceOp, json: bool) -> anyhow::Result<u8> {
    let result = tokio::task::spawn_blocking(move || run_once(&db, op)).await?;
    match result {
        Ok(outcome) => {
            if json {
                println!("{}", serde_json::to_string(&outcome)?);
            }
            Ok(0)
        }
        Err(e) => {
            error!(%op, kind = e.kind(), "{e}");
            Ok(1)
        }
    }
}

async fn daemon(db: Database, config: &EnronConfig) {
    info!("👑 Unified agent daemon starting...");
    info!(path = %db.path().display(), "archive database");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = SchedulerEngine::from_config(db.clone(), &config.scheduler).start(shutdown_rx);

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    for status in handle.snapshot() {
        info!(
            task = %status.kind,
            iterations = status.iterations,
            failures = status.failures,
            "agent stopping"
        );
    }
    handle.join().await;

    if let Err(e) = db.close() {
        warn!("closing database failed: {e}");
    }
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping agents");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use enron_core::CoreError;

    fn archive(dir: &tempfile::TempDir) -> Database {
        let path = dir.path().join("enron.db");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE emails (id INTEGER PRIMARY KEY, user TEXT, folder TEXT, body TEXT);",
            )
            .unwrap();
        Database::new(path, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn failed_operation_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("missing.db"), Duration::from_millis(50));

        let code = one_shot(db, MaintenanceOp::Analyze, false).await.unwrap();
        assert_eq!(code, 1);
        assert!(!dir.path().join("missing.db").exists());
    }

    #[tokio::test]
    async fn successful_operation_exits_zero() {
        let dir = tempfile::tempdir().unwrap();
        let db = archive(&dir);

        let code = one_shot(db, MaintenanceOp::Cleanup, true).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn repeated_migration_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let db = archive(&dir);

        assert_eq!(one_shot(db.clone(), MaintenanceOp::Migration, false).await.unwrap(), 0);
        assert_eq!(one_shot(db, MaintenanceOp::Migration, false).await.unwrap(), 1);
    }

    #[test]
    fn db_flag_overrides_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("enron-agents.toml");
        std::fs::write(&file, "[database]\npath = \"/tmp/from-file.db\"\n").unwrap();

        let config = resolve_config(file.to_str(), Some("/tmp/from-flag.db")).unwrap();
        assert_eq!(config.database.path, "/tmp/from-flag.db");

        let config = resolve_config(file.to_str(), None).unwrap();
        assert_eq!(config.database.path, "/tmp/from-file.db");
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("absent.toml");

        let config = resolve_config(file.to_str(), None).unwrap();
        assert_eq!(config.scheduler.batch_size, enron_core::config::DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn broken_config_file_is_an_error_not_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("enron-agents.toml");
        std::fs::write(&file, "[database]\npath = [\"not\", \"a string\"]\n").unwrap();

        let err = resolve_config(file.to_str(), Some("/tmp/from-flag.db")).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
