//! Monthly enrollment and time-log sync engine.
//!
//! Phases run strictly in order, each in its own module:
//! organizations → patient index → enrollments → conflict resolution →
//! time logs → snapshots. `orchestrator` sequences them and owns the
//! single-flight progress state.

pub mod conflicts;
pub mod enrollment;
pub mod orchestrator;
pub mod organizations;
pub mod patient_index;
pub mod snapshot;
pub mod time_logs;

pub use conflicts::*;
pub use enrollment::*;
pub use orchestrator::*;
pub use organizations::*;
pub use patient_index::*;
pub use snapshot::*;
pub use time_logs::*;

use thiserror::Error;

use crate::config::ConfigError;
use crate::db::DatabaseError;
use crate::remote::RemoteError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote API error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("A sync run is already in progress")]
    AlreadyRunning(Box<SyncProgress>),

    #[error("Invalid sync period: month {month}, year {year}")]
    InvalidPeriod { month: u32, year: i32 },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sync run panicked: {0}")]
    Panicked(String),
}
