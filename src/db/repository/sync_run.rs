use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_sync_run(conn: &Connection, run: &SyncRunLog) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO sync_runs (id, kind, status, started_at, completed_at, records_processed, detail)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            run.id.to_string(),
            run.kind.as_str(),
            run.status.as_str(),
            run.started_at.to_rfc3339(),
            run.completed_at.map(|t| t.to_rfc3339()),
            run.records_processed as i64,
            run.detail,
        ],
    )?;
    Ok(())
}

/// Set the terminal status of a run. Only `running` rows are updated, so a
/// finished run is never rewritten.
pub fn finish_sync_run(
    conn: &Connection,
    id: &Uuid,
    status: RunStatus,
    completed_at: DateTime<Utc>,
    records_processed: u64,
    detail: Option<&str>,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE sync_runs
         SET status = ?1, completed_at = ?2, records_processed = ?3, detail = COALESCE(?4, detail)
         WHERE id = ?5 AND status = 'running'",
        params![
            status.as_str(),
            completed_at.to_rfc3339(),
            records_processed as i64,
            detail,
            id.to_string(),
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "running sync_run".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn recent_sync_runs(conn: &Connection, limit: u32) -> Result<Vec<SyncRunLog>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, status, started_at, completed_at, records_processed, detail
         FROM sync_runs
         ORDER BY started_at DESC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, kind, status, started_at, completed_at, records, detail)| {
            Ok(SyncRunLog {
                id: Uuid::parse_str(&id).map_err(|e| DatabaseError::InvalidColumn {
                    column: "sync_runs.id".into(),
                    reason: e.to_string(),
                })?,
                kind: kind.parse()?,
                status: status.parse()?,
                started_at: parse_timestamp("sync_runs.started_at", &started_at)?,
                completed_at: completed_at
                    .map(|t| parse_timestamp("sync_runs.completed_at", &t))
                    .transpose()?,
                records_processed: records.max(0) as u64,
                detail,
            })
        })
        .collect()
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DatabaseError::InvalidColumn {
            column: column.into(),
            reason: e.to_string(),
        })
}
