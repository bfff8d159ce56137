use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::*;

/// Delete every snapshot for (month, year) and insert `rows` in one
/// transaction. Returns the number of rows deleted.
pub fn replace_snapshots_for_period(
    conn: &Connection,
    month: u32,
    year: i32,
    rows: &[ProgramSnapshot],
) -> Result<usize, DatabaseError> {
    let tx = conn.unchecked_transaction()?;

    let deleted = tx.execute(
        "DELETE FROM program_snapshots WHERE month = ?1 AND year = ?2",
        params![month, year],
    )?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO program_snapshots
             (practice_id, program, month, year, patients_enrolled, inactive_count,
              not_enrolled_count, mins0, mins1_9, mins10_19, mins20_39, mins20_plus,
              mins40_59, mins40_plus, mins60_plus, source, synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        )?;
        for row in rows {
            if row.month != month || row.year != year {
                return Err(DatabaseError::InvalidColumn {
                    column: "program_snapshots.month".into(),
                    reason: format!(
                        "row for {}-{:02} in replacement of {year}-{month:02}",
                        row.year, row.month
                    ),
                });
            }
            let b = &row.buckets;
            stmt.execute(params![
                row.practice_id.to_string(),
                row.program.as_str(),
                row.month,
                row.year,
                row.patients_enrolled,
                row.inactive_count,
                row.not_enrolled_count,
                b.mins0,
                b.mins1_9,
                b.mins10_19,
                b.mins20_39,
                b.mins20_plus,
                b.mins40_59,
                b.mins40_plus,
                b.mins60_plus,
                row.source,
                row.synced_at.to_rfc3339(),
            ])?;
        }
    }

    tx.commit()?;
    Ok(deleted)
}

pub fn snapshots_for_period(
    conn: &Connection,
    month: u32,
    year: i32,
) -> Result<Vec<ProgramSnapshot>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT practice_id, program, month, year, patients_enrolled, inactive_count,
                not_enrolled_count, mins0, mins1_9, mins10_19, mins20_39, mins20_plus,
                mins40_59, mins40_plus, mins60_plus, source, synced_at
         FROM program_snapshots
         WHERE month = ?1 AND year = ?2
         ORDER BY practice_id, program",
    )?;
    let rows = stmt
        .query_map(params![month, year], snapshot_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(SnapshotRow::into_snapshot).collect()
}

struct SnapshotRow {
    practice_id: String,
    program: String,
    month: u32,
    year: i32,
    counts: [u32; 11],
    source: String,
    synced_at: String,
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<SnapshotRow> {
    let mut counts = [0u32; 11];
    for (i, slot) in counts.iter_mut().enumerate() {
        *slot = row.get(4 + i)?;
    }
    Ok(SnapshotRow {
        practice_id: row.get(0)?,
        program: row.get(1)?,
        month: row.get(2)?,
        year: row.get(3)?,
        counts,
        source: row.get(15)?,
        synced_at: row.get(16)?,
    })
}

impl SnapshotRow {
    fn into_snapshot(self) -> Result<ProgramSnapshot, DatabaseError> {
        let practice_id = Uuid::parse_str(&self.practice_id).map_err(|e| DatabaseError::InvalidColumn {
            column: "program_snapshots.practice_id".into(),
            reason: e.to_string(),
        })?;
        let synced_at = DateTime::parse_from_rfc3339(&self.synced_at)
            .map_err(|e| DatabaseError::InvalidColumn {
                column: "program_snapshots.synced_at".into(),
                reason: e.to_string(),
            })?
            .with_timezone(&Utc);
        let c = self.counts;
        Ok(ProgramSnapshot {
            practice_id,
            program: self.program.parse()?,
            month: self.month,
            year: self.year,
            patients_enrolled: c[0],
            inactive_count: c[1],
            not_enrolled_count: c[2],
            buckets: TimeBucketCounts {
                mins0: c[3],
                mins1_9: c[4],
                mins10_19: c[5],
                mins20_39: c[6],
                mins20_plus: c[7],
                mins40_59: c[8],
                mins40_plus: c[9],
                mins60_plus: c[10],
            },
            source: self.source,
            synced_at,
        })
    }
}
