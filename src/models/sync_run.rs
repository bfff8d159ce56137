use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{RunKind, RunStatus};

/// Audit row written once per orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRunLog {
    pub id: Uuid,
    pub kind: RunKind,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_processed: u64,
    pub detail: Option<String>,
}

impl SyncRunLog {
    /// A fresh `running` row.
    pub fn started(kind: RunKind, detail: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            records_processed: 0,
            detail: Some(detail.into()),
        }
    }
}
