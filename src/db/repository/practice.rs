use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::*;

const PRACTICE_COLUMNS: &str = "id, remote_org_id, name, alias, status, departments";

fn practice_from_row(row: &Row<'_>) -> rusqlite::Result<PracticeRow> {
    Ok(PracticeRow {
        id: row.get(0)?,
        remote_org_id: row.get(1)?,
        name: row.get(2)?,
        alias: row.get(3)?,
        status: row.get(4)?,
        departments: row.get(5)?,
    })
}

/// Raw column values, decoded into `Practice` outside the rusqlite closure
/// so enum and JSON failures surface as `DatabaseError`.
struct PracticeRow {
    id: String,
    remote_org_id: i64,
    name: String,
    alias: Option<String>,
    status: String,
    departments: String,
}

impl PracticeRow {
    fn into_practice(self) -> Result<Practice, DatabaseError> {
        let id = Uuid::parse_str(&self.id).map_err(|e| DatabaseError::InvalidColumn {
            column: "practices.id".into(),
            reason: e.to_string(),
        })?;
        let departments: Vec<String> =
            serde_json::from_str(&self.departments).map_err(|e| DatabaseError::InvalidColumn {
                column: "practices.departments".into(),
                reason: e.to_string(),
            })?;
        Ok(Practice {
            id,
            remote_org_id: self.remote_org_id,
            name: self.name,
            alias: self.alias,
            status: self.status.parse()?,
            departments,
        })
    }
}

/// Insert or update a practice keyed by its remote organization id.
/// The internal id is kept stable across updates.
pub fn upsert_practice(conn: &Connection, practice: &PracticeUpsert) -> Result<Practice, DatabaseError> {
    let departments = serde_json::to_string(&practice.departments).map_err(|e| {
        DatabaseError::InvalidColumn {
            column: "practices.departments".into(),
            reason: e.to_string(),
        }
    })?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM practices WHERE remote_org_id = ?1",
            params![practice.remote_org_id],
            |row| row.get(0),
        )
        .optional()?;

    let id = match existing {
        Some(id) => {
            conn.execute(
                "UPDATE practices
                 SET name = ?1, alias = ?2, status = ?3, departments = ?4, updated_at = datetime('now')
                 WHERE id = ?5",
                params![
                    practice.name,
                    practice.alias,
                    practice.status.as_str(),
                    departments,
                    id,
                ],
            )?;
            id
        }
        None => {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO practices (id, remote_org_id, name, alias, status, departments)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    practice.remote_org_id,
                    practice.name,
                    practice.alias,
                    practice.status.as_str(),
                    departments,
                ],
            )?;
            id
        }
    };

    get_practice_by_remote_id(conn, practice.remote_org_id)?.ok_or(DatabaseError::NotFound {
        entity_type: "practice".into(),
        id,
    })
}

pub fn get_practice_by_remote_id(
    conn: &Connection,
    remote_org_id: i64,
) -> Result<Option<Practice>, DatabaseError> {
    let sql = format!("SELECT {PRACTICE_COLUMNS} FROM practices WHERE remote_org_id = ?1");
    conn.query_row(&sql, params![remote_org_id], practice_from_row)
        .optional()?
        .map(PracticeRow::into_practice)
        .transpose()
}

pub fn list_practices(conn: &Connection) -> Result<Vec<Practice>, DatabaseError> {
    let sql = format!("SELECT {PRACTICE_COLUMNS} FROM practices ORDER BY name, remote_org_id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], practice_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(PracticeRow::into_practice).collect()
}
