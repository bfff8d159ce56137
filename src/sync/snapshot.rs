//! Snapshot phase: join enrollment and time data into monthly rows.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{EnrollmentAggregate, PatientIndex, PatientMinutes};
use crate::db::{DatabaseError, SyncStore};
use crate::models::{ProgramSnapshot, ProgramType, SyncPeriod, TimeBucket, TimeBucketCounts, SNAPSHOT_SOURCE};

/// Minutes counted for `program`. Programs sharing CCM minutes fall back to
/// the patient's CCM total when nothing was logged under their own code.
pub fn minutes_for(minutes: &PatientMinutes, patient_id: &str, program: ProgramType) -> Option<u32> {
    minutes.minutes(patient_id, program).or_else(|| {
        if program.shares_ccm_minutes() {
            minutes.minutes(patient_id, ProgramType::Ccm)
        } else {
            None
        }
    })
}

/// Bucket counts over a program's active patients. `mins0` is every active
/// patient without a positive minute total.
pub fn bucket_counts(program: ProgramType, active: &BTreeSet<String>, minutes: &PatientMinutes) -> TimeBucketCounts {
    let mut counts = TimeBucketCounts::default();
    let buckets = TimeBucket::for_program(program);
    let mut with_minutes = 0u32;

    for patient_id in active {
        let Some(total) = minutes_for(minutes, patient_id, program).filter(|m| *m > 0) else {
            continue;
        };
        with_minutes += 1;
        for bucket in buckets.iter().filter(|b| b.contains(total)) {
            counts.increment(*bucket);
        }
    }

    let enrolled = u32::try_from(active.len()).unwrap_or(u32::MAX);
    counts.mins0 = enrolled.saturating_sub(with_minutes);
    counts
}

/// Build one row per (organization, program) with any enrollment.
/// Organizations without a practice, including the unassigned bucket, are
/// left out. Output order is stable for identical input.
pub fn build_snapshots(
    aggregate: &EnrollmentAggregate,
    minutes: &PatientMinutes,
    index: &PatientIndex,
    practice_ids: &BTreeMap<i64, Uuid>,
    period: SyncPeriod,
    synced_at: DateTime<Utc>,
) -> Vec<ProgramSnapshot> {
    let mut rows = Vec::new();
    let mut unmapped = BTreeSet::new();

    for ((org_id, program), stats) in &aggregate.stats {
        if stats.is_empty() {
            continue;
        }
        let Some(practice_id) = practice_ids.get(org_id) else {
            unmapped.insert(*org_id);
            continue;
        };

        let enrolled = stats.active_count();
        let indexed_active = u32::try_from(index.active_patients_in(*org_id)).unwrap_or(u32::MAX);

        rows.push(ProgramSnapshot {
            practice_id: *practice_id,
            program: *program,
            month: period.month(),
            year: period.year(),
            patients_enrolled: enrolled,
            inactive_count: stats.inactive,
            not_enrolled_count: indexed_active.saturating_sub(enrolled),
            buckets: bucket_counts(*program, &stats.active, minutes),
            source: SNAPSHOT_SOURCE.to_string(),
            synced_at,
        });
    }

    if !unmapped.is_empty() {
        tracing::info!(organizations = ?unmapped, "Enrollments without a practice left out of snapshots");
    }
    rows
}

/// Replace the period's rows with `rows`. Returns the number written.
pub fn persist_snapshots(
    store: &dyn SyncStore,
    period: SyncPeriod,
    rows: &[ProgramSnapshot],
) -> Result<usize, DatabaseError> {
    let replaced = store.replace_snapshots_for_period(period.month(), period.year(), rows)?;
    tracing::info!(period = %period, replaced, written = rows.len(), "Snapshots persisted");
    Ok(rows.len())
}
