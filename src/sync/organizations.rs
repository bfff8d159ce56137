//! Organization phase: mirror remote organizations into practices.

use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

use super::SyncError;
use crate::db::{DatabaseError, SyncStore};
use crate::models::{PracticeStatus, PracticeUpsert};
use crate::remote::{OrganizationRecord, PageProgress, PaginatedFetcher};

pub const ORGANIZATIONS_PATH: &str = "/Organization";

/// Remote organization ids seen this run and their practice ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationSyncResult {
    /// Remote ids in the order the platform returned them.
    pub org_ids: Vec<i64>,
    pub practice_ids: BTreeMap<i64, Uuid>,
    pub skipped: usize,
}

/// Fetch all organizations and upsert them as practices.
pub fn sync_organizations(
    fetcher: &PaginatedFetcher,
    store: &dyn SyncStore,
    on_page: Option<&dyn Fn(PageProgress)>,
) -> Result<OrganizationSyncResult, SyncError> {
    let resources = fetcher.fetch_all(ORGANIZATIONS_PATH, &[], None, on_page)?;
    Ok(apply_organizations(store, resources)?)
}

/// Upsert already-fetched organization resources. Malformed records are
/// skipped.
pub fn apply_organizations(
    store: &dyn SyncStore,
    resources: Vec<Value>,
) -> Result<OrganizationSyncResult, DatabaseError> {
    let mut result = OrganizationSyncResult::default();

    for resource in resources {
        let org = match OrganizationRecord::parse(resource) {
            Ok(org) => org,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping organization record");
                result.skipped += 1;
                continue;
            }
        };

        let practice = store.upsert_practice(&PracticeUpsert {
            remote_org_id: org.id,
            name: org.name,
            alias: org.alias,
            status: if org.active {
                PracticeStatus::Active
            } else {
                PracticeStatus::Inactive
            },
            departments: org.departments,
        })?;

        if result.practice_ids.insert(org.id, practice.id).is_none() {
            result.org_ids.push(org.id);
        }
    }

    tracing::info!(
        organizations = result.org_ids.len(),
        skipped = result.skipped,
        "Organizations synced"
    );
    Ok(result)
}
