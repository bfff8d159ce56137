//! Local persistence for practices, monthly snapshots and run history.

pub mod repository;
pub mod sqlite;
pub mod store;

pub use repository::*;
pub use sqlite::*;
pub use store::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("No {entity_type} row {id} to update")]
    NotFound { entity_type: String, id: String },

    #[error("Unrecognized {field} value: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Schema migration v{version} failed: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Cannot decode column {column}: {reason}")]
    InvalidColumn { column: String, reason: String },

    #[error("Store connection lock poisoned")]
    LockPoisoned,
}
