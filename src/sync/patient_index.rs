//! Patient index phase: remote patient id → owning organization.
//!
//! Best-effort. A failed fetch for one organization is recorded as a
//! `PartialIndexFailure` and that organization's patients stay unindexed.

use std::collections::HashMap;

use crate::remote::{PaginatedFetcher, PatientRecord, RemoteError};

pub const PATIENTS_PATH: &str = "/Patient";

/// Organization id used for patients missing from the index.
pub const UNASSIGNED_ORG: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatientIndexEntry {
    pub org_id: i64,
    pub inactive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialIndexFailure {
    pub org_id: i64,
    pub error: RemoteError,
}

#[derive(Debug, Clone, Default)]
pub struct PatientIndex {
    entries: HashMap<String, PatientIndexEntry>,
    pub failures: Vec<PartialIndexFailure>,
    pub skipped: usize,
}

impl PatientIndex {
    pub fn insert(&mut self, org_id: i64, patient: PatientRecord) {
        let entry = PatientIndexEntry {
            org_id,
            inactive: patient.inactive,
        };
        if let Some(previous) = self.entries.insert(patient.id.clone(), entry) {
            if previous.org_id != org_id {
                tracing::debug!(
                    patient_id = %patient.id,
                    previous_org = previous.org_id,
                    org_id,
                    "Patient listed under two organizations, keeping the later one"
                );
            }
        }
    }

    pub fn get(&self, patient_id: &str) -> Option<&PatientIndexEntry> {
        self.entries.get(patient_id)
    }

    /// Owning organization, or `UNASSIGNED_ORG` if the patient is unknown.
    pub fn org_of(&self, patient_id: &str) -> i64 {
        self.get(patient_id).map_or(UNASSIGNED_ORG, |e| e.org_id)
    }

    pub fn is_inactive(&self, patient_id: &str) -> bool {
        self.get(patient_id).is_some_and(|e| e.inactive)
    }

    /// Indexed patients of `org_id` not flagged inactive.
    pub fn active_patients_in(&self, org_id: i64) -> usize {
        self.entries
            .values()
            .filter(|e| e.org_id == org_id && !e.inactive)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fetch each organization's patients. `on_org(done, total)` is called
/// after every organization, successful or not.
pub fn build_patient_index(
    fetcher: &PaginatedFetcher,
    org_ids: &[i64],
    on_org: Option<&dyn Fn(usize, usize)>,
) -> PatientIndex {
    let mut index = PatientIndex::default();

    for (i, &org_id) in org_ids.iter().enumerate() {
        let filters = [("organization", org_id.to_string())];
        match fetcher.fetch_all(PATIENTS_PATH, &filters, None, None) {
            Ok(resources) => {
                for resource in resources {
                    match PatientRecord::parse(resource) {
                        Ok(patient) => index.insert(org_id, patient),
                        Err(e) => {
                            tracing::debug!(org_id, error = %e, "Skipping patient record");
                            index.skipped += 1;
                        }
                    }
                }
            }
            Err(error) => {
                tracing::warn!(org_id, error = %error, "Patient fetch failed, organization left out of index");
                index.failures.push(PartialIndexFailure { org_id, error });
            }
        }

        if let Some(report) = on_org {
            report(i + 1, org_ids.len());
        }
    }

    tracing::info!(
        patients = index.len(),
        failed_organizations = index.failures.len(),
        skipped = index.skipped,
        "Patient index built"
    );
    index
}
