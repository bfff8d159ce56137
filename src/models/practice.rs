use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PracticeStatus;

/// A practice mirrored from a remote organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Practice {
    pub id: Uuid,
    pub remote_org_id: i64,
    pub name: String,
    pub alias: Option<String>,
    pub status: PracticeStatus,
    /// Department labels in remote order, without duplicates.
    pub departments: Vec<String>,
}

/// Fields written by an organization upsert. The internal id is assigned
/// by the store on first insert and preserved afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeUpsert {
    pub remote_org_id: i64,
    pub name: String,
    pub alias: Option<String>,
    pub status: PracticeStatus,
    pub departments: Vec<String>,
}
