//! Enrollment phase: one paged walk over every enrollment record, folded
//! into per-organization, per-program active sets and inactive counts.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::PatientIndex;
use crate::models::ProgramType;
use crate::remote::{EnrollmentRecord, PageProgress, PaginatedFetcher, RemoteError};

pub const ENROLLMENTS_PATH: &str = "/EpisodeOfCare";

/// Enrollment state of one organization's one program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramStats {
    /// Patient ids actively enrolled. A set, so repeated records of the
    /// same enrollment count once.
    pub active: BTreeSet<String>,
    pub inactive: u32,
}

impl ProgramStats {
    pub fn active_count(&self) -> u32 {
        u32::try_from(self.active.len()).unwrap_or(u32::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.inactive == 0
    }

    /// Move a patient from the active set to the inactive count. Returns
    /// false if the patient was not active here.
    pub fn demote(&mut self, patient_id: &str) -> bool {
        if self.active.remove(patient_id) {
            self.inactive += 1;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnrollmentAggregate {
    pub stats: BTreeMap<(i64, ProgramType), ProgramStats>,
    pub records: usize,
    pub skipped: usize,
}

impl EnrollmentAggregate {
    /// Count one record against the patient's owning organization.
    /// Unindexed patients land under the unassigned organization.
    pub fn ingest(&mut self, record: EnrollmentRecord, index: &PatientIndex) {
        let org_id = index.org_of(&record.patient_id);
        let stats = self.stats.entry((org_id, record.program)).or_default();

        if record.status_active && !index.is_inactive(&record.patient_id) {
            stats.active.insert(record.patient_id);
        } else {
            stats.inactive += 1;
        }
        self.records += 1;
    }

    pub fn get(&self, org_id: i64, program: ProgramType) -> Option<&ProgramStats> {
        self.stats.get(&(org_id, program))
    }

    pub fn get_mut(&mut self, org_id: i64, program: ProgramType) -> Option<&mut ProgramStats> {
        self.stats.get_mut(&(org_id, program))
    }

    pub fn org_ids(&self) -> BTreeSet<i64> {
        self.stats.keys().map(|(org, _)| *org).collect()
    }
}

/// Fold raw enrollment resources. Malformed ones are skipped.
pub fn aggregate_enrollments(resources: Vec<Value>, index: &PatientIndex) -> EnrollmentAggregate {
    let mut aggregate = EnrollmentAggregate::default();
    for resource in resources {
        match EnrollmentRecord::parse(resource) {
            Ok(record) => aggregate.ingest(record, index),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping enrollment record");
                aggregate.skipped += 1;
            }
        }
    }
    aggregate
}

pub fn fetch_enrollments(
    fetcher: &PaginatedFetcher,
    index: &PatientIndex,
    on_page: Option<&dyn Fn(PageProgress)>,
) -> Result<EnrollmentAggregate, RemoteError> {
    let resources = fetcher.fetch_all(ENROLLMENTS_PATH, &[], None, on_page)?;
    let aggregate = aggregate_enrollments(resources, index);
    tracing::info!(
        records = aggregate.records,
        groups = aggregate.stats.len(),
        skipped = aggregate.skipped,
        "Enrollments aggregated"
    );
    Ok(aggregate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mock::{bundle, fetcher, MockTransport};
    use crate::remote::PatientRecord;
    use crate::sync::UNASSIGNED_ORG;
    use serde_json::json;

    fn index() -> PatientIndex {
        let mut index = PatientIndex::default();
        for (id, inactive) in [("p1", false), ("p2", false), ("p3", true)] {
            index.insert(7, PatientRecord { id: id.into(), inactive });
        }
        index
    }

    fn episode(patient: &str, program: &str, status: &str) -> Value {
        json!({
            "patient": { "reference": format!("Patient/{patient}") },
            "type": [{ "coding": [{ "code": program }] }],
            "status": status,
        })
    }

    #[test]
    fn active_and_inactive_are_split() {
        let aggregate = aggregate_enrollments(
            vec![
                episode("p1", "CCM", "active"),
                episode("p2", "CCM", "finished"),
                episode("p3", "CCM", "active"),
            ],
            &index(),
        );

        let ccm = aggregate.get(7, ProgramType::Ccm).unwrap();
        assert_eq!(ccm.active_count(), 1);
        assert!(ccm.active.contains("p1"));
        // p2 ended, p3 is an inactive patient
        assert_eq!(ccm.inactive, 2);
        assert_eq!(aggregate.records, 3);
    }

    #[test]
    fn unindexed_patient_goes_to_unassigned() {
        let aggregate = aggregate_enrollments(vec![episode("stranger", "RPM", "active")], &index());
        let rpm = aggregate.get(UNASSIGNED_ORG, ProgramType::Rpm).unwrap();
        assert_eq!(rpm.active_count(), 1);
        assert_eq!(aggregate.org_ids(), BTreeSet::from([UNASSIGNED_ORG]));
    }

    #[test]
    fn duplicate_active_record_counts_once() {
        let aggregate = aggregate_enrollments(
            vec![episode("p1", "BHI", "active"), episode("p1", "BHI", "active")],
            &index(),
        );
        assert_eq!(aggregate.get(7, ProgramType::Bhi).unwrap().active_count(), 1);
    }

    #[test]
    fn unknown_program_is_skipped() {
        let aggregate = aggregate_enrollments(
            vec![episode("p1", "XYZ", "active"), json!({ "status": "active" })],
            &index(),
        );
        assert_eq!(aggregate.skipped, 2);
        assert!(aggregate.stats.is_empty());
    }

    #[test]
    fn demote_moves_to_inactive() {
        let mut stats = ProgramStats::default();
        stats.active.insert("p1".into());
        assert!(stats.demote("p1"));
        assert!(!stats.demote("p1"));
        assert_eq!(stats.active_count(), 0);
        assert_eq!(stats.inactive, 1);
    }

    #[test]
    fn fetch_walks_all_pages() {
        let mock = MockTransport::new();
        mock.on_page(ENROLLMENTS_PATH, &[], 1, bundle(vec![episode("p1", "CCM", "active")], true, Some(2)));
        mock.on_page(ENROLLMENTS_PATH, &[], 2, bundle(vec![episode("p2", "PCM", "active")], false, None));

        let aggregate = fetch_enrollments(&fetcher(mock), &index(), None).unwrap();
        assert_eq!(aggregate.records, 2);
        assert_eq!(aggregate.get(7, ProgramType::Pcm).unwrap().active_count(), 1);
    }
}
