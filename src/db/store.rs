//! Storage seam consumed by the sync engine.
//!
//! The engine never issues SQL itself; it only talks to `SyncStore`.
//! `SqliteSyncStore` is the production implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::{repository, DatabaseError};
use crate::models::*;

/// Persistence operations needed by one sync run.
pub trait SyncStore: Send + Sync {
    /// Insert or update by remote organization id; returns the stored practice.
    fn upsert_practice(&self, practice: &PracticeUpsert) -> Result<Practice, DatabaseError>;

    fn list_practices(&self) -> Result<Vec<Practice>, DatabaseError>;

    /// Atomically delete all rows of (month, year) and insert `rows`.
    fn replace_snapshots_for_period(
        &self,
        month: u32,
        year: i32,
        rows: &[ProgramSnapshot],
    ) -> Result<usize, DatabaseError>;

    fn snapshots_for_period(&self, month: u32, year: i32) -> Result<Vec<ProgramSnapshot>, DatabaseError>;

    fn insert_sync_run_log(&self, run: &SyncRunLog) -> Result<(), DatabaseError>;

    fn update_sync_run_log(
        &self,
        id: &Uuid,
        status: RunStatus,
        completed_at: DateTime<Utc>,
        records_processed: u64,
        detail: Option<&str>,
    ) -> Result<(), DatabaseError>;

    fn recent_sync_runs(&self, limit: u32) -> Result<Vec<SyncRunLog>, DatabaseError>;
}

/// SQLite-backed store. The connection is serialized behind a mutex so the
/// store can be shared with a background sync thread.
pub struct SqliteSyncStore {
    conn: Mutex<Connection>,
}

impl SqliteSyncStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(super::open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(super::open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }
}

impl SyncStore for SqliteSyncStore {
    fn upsert_practice(&self, practice: &PracticeUpsert) -> Result<Practice, DatabaseError> {
        let conn = self.conn()?;
        repository::upsert_practice(&conn, practice)
    }

    fn list_practices(&self) -> Result<Vec<Practice>, DatabaseError> {
        let conn = self.conn()?;
        repository::list_practices(&conn)
    }

    fn replace_snapshots_for_period(
        &self,
        month: u32,
        year: i32,
        rows: &[ProgramSnapshot],
    ) -> Result<usize, DatabaseError> {
        let conn = self.conn()?;
        repository::replace_snapshots_for_period(&conn, month, year, rows)
    }

    fn snapshots_for_period(&self, month: u32, year: i32) -> Result<Vec<ProgramSnapshot>, DatabaseError> {
        let conn = self.conn()?;
        repository::snapshots_for_period(&conn, month, year)
    }

    fn insert_sync_run_log(&self, run: &SyncRunLog) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        repository::insert_sync_run(&conn, run)
    }

    fn update_sync_run_log(
        &self,
        id: &Uuid,
        status: RunStatus,
        completed_at: DateTime<Utc>,
        records_processed: u64,
        detail: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        repository::finish_sync_run(&conn, id, status, completed_at, records_processed, detail)
    }

    fn recent_sync_runs(&self, limit: u32) -> Result<Vec<SyncRunLog>, DatabaseError> {
        let conn = self.conn()?;
        repository::recent_sync_runs(&conn, limit)
    }
}
