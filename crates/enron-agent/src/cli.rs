use clap::{Parser, Subcommand};
use enron_maintenance::MaintenanceOp;

/// Maintenance agents for the email archive database.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file (default: enron-agents.toml, or ENRON_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override `database.path` from the configuration
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Also print the operation outcome as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Refresh query-planner statistics (ANALYZE)
    Analyze,
    /// Delete emails whose body is empty or NULL
    Cleanup,
    /// Run PRAGMA integrity_check
    Healthcheck,
    /// Create the user and folder indexes
    Index,
    /// Add the word_count column (one-time)
    Migrate,
    /// Reclaim free pages (VACUUM)
    Vacuum,
    /// Print row and page statistics
    Metrics,
    /// Run all background loops until interrupted
    Daemon,
}

impl Command {
    /// The one-shot operation behind this subcommand; `None` for the daemon.
    pub fn maintenance_op(self) -> Option<MaintenanceOp> {
        match self {
            Command::Analyze => Some(MaintenanceOp::Analyze),
            Command::Cleanup => Some(MaintenanceOp::Cleanup),
            Command::Healthcheck => Some(MaintenanceOp::Healthcheck),
            Command::Index => Some(MaintenanceOp::Indexing),
            Command::Migrate => Some(MaintenanceOp::Migration),
            Command::Vacuum => Some(MaintenanceOp::Vacuum),
            Command::Metrics => Some(MaintenanceOp::Metrics),
            Command::Daemon => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["enron-agent", "cleanup", "--db", "/tmp/x.db", "--json"]).unwrap();
        assert_eq!(cli.command, Command::Cleanup);
        assert_eq!(cli.db.as_deref(), Some("/tmp/x.db"));
        assert!(cli.json);
        assert!(cli.config.is_none());
    }

    #[test]
    fn every_one_shot_maps_to_an_operation() {
        for (name, op) in [
            ("analyze", MaintenanceOp::Analyze),
            ("cleanup", MaintenanceOp::Cleanup),
            ("healthcheck", MaintenanceOp::Healthcheck),
            ("index", MaintenanceOp::Indexing),
            ("migrate", MaintenanceOp::Migration),
            ("vacuum", MaintenanceOp::Vacuum),
            ("metrics", MaintenanceOp::Metrics),
        ] {
            let cli = Cli::try_parse_from(["enron-agent", name]).unwrap();
            assert_eq!(cli.command.maintenance_op(), Some(op));
        }
        let cli = Cli::try_parse_from(["enron-agent", "-c", "agents.toml", "daemon"]).unwrap();
        assert_eq!(cli.command.maintenance_op(), None);
        assert_eq!(cli.config.as_deref(), Some("agents.toml"));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["enron-agent"]).is_err());
    }
}
