//! caresync CLI - run and inspect monthly care-management syncs
//!
//! - `sync`: one monthly sync (default: current month, UTC)
//! - `backfill`: the trailing N months, oldest first
//! - `status`: recent run history and stored snapshots

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use caresync::config::{self, SyncConfig};
use caresync::db::{SqliteSyncStore, SyncStore};
use caresync::models::SyncPeriod;
use caresync::sync::{SyncError, SyncOrchestrator};

/// caresync - care-management platform sync
#[derive(Parser)]
#[command(name = "caresync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "CARESYNC_DB_PATH")]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync one month of enrollments and time logs
    Sync(PeriodArgs),

    /// Sync the trailing N months, oldest first
    Backfill {
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=36))]
        months: u32,
    },

    /// Show recent sync runs, and a month's snapshots when one is given
    Status {
        #[arg(long, default_value_t = 10)]
        limit: u32,

        #[command(flatten)]
        period: PeriodArgs,
    },
}

#[derive(Args)]
struct PeriodArgs {
    /// Month 1-12 (defaults to the current month)
    #[arg(long, requires = "year")]
    month: Option<u32>,

    #[arg(long, requires = "month")]
    year: Option<i32>,
}

impl PeriodArgs {
    fn resolve(&self) -> Result<Option<SyncPeriod>, SyncError> {
        match (self.month, self.year) {
            (Some(month), Some(year)) => SyncPeriod::new(month, year)
                .map(Some)
                .ok_or(SyncError::InvalidPeriod { month, year }),
            _ => Ok(None),
        }
    }
}

fn main() {
    caresync::init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "caresync failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), SyncError> {
    tracing::debug!("{} v{}", config::APP_NAME, config::APP_VERSION);

    match cli.command {
        Commands::Sync(args) => {
            let period = args.resolve()?.unwrap_or_else(SyncPeriod::current);
            let orchestrator = orchestrator(cli.db_path)?;
            print_json(&orchestrator.run(period)?);
            Ok(())
        }
        Commands::Backfill { months } => {
            let periods = SyncPeriod::current().trailing(months);
            let orchestrator = orchestrator(cli.db_path)?;
            print_json(&orchestrator.run_backfill(&periods)?);
            Ok(())
        }
        Commands::Status { limit, period } => {
            let store = SqliteSyncStore::open(&cli.db_path.unwrap_or_else(config::default_db_path))?;
            print_json(&store.recent_sync_runs(limit)?);
            if let Some(period) = period.resolve()? {
                print_json(&store.snapshots_for_period(period.month(), period.year())?);
            }
            Ok(())
        }
    }
}

fn orchestrator(db_path: Option<PathBuf>) -> Result<SyncOrchestrator, SyncError> {
    let mut config = SyncConfig::from_env()?;
    if let Some(path) = db_path {
        config.db_path = path;
    }
    let store: Arc<dyn SyncStore> = Arc::new(SqliteSyncStore::open(&config.db_path)?);
    SyncOrchestrator::from_config(&config, store)
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!(error = %e, "Failed to render output"),
    }
}
