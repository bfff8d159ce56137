//! Dual-enrollment resolution across the mutually exclusive programs.
//!
//! A patient active in two or more of PCM, APCM, CCCM and CCM within one
//! organization keeps a single primary program. The others are demoted from
//! their active set to their inactive count.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use super::EnrollmentAggregate;
use crate::models::{ProgramType, EXCLUSIVE_PROGRAMS};
use crate::remote::{pause, CarePlanRecord, PaginatedFetcher, RemoteError};

pub const CARE_PLANS_PATH: &str = "/CarePlan";

/// Care-plan lookups in flight at once.
pub const LOOKUP_BATCH_SIZE: usize = 8;

/// Patient-scoped source of active care-plan programs.
pub trait CarePlanLookup: Sync {
    fn active_care_plan_programs(&self, patient_id: &str) -> Result<BTreeSet<ProgramType>, RemoteError>;
}

impl CarePlanLookup for PaginatedFetcher {
    fn active_care_plan_programs(&self, patient_id: &str) -> Result<BTreeSet<ProgramType>, RemoteError> {
        let filters = [
            ("subject", format!("Patient/{patient_id}")),
            ("status", "active".to_string()),
        ];
        let resources = self.fetch_all(CARE_PLANS_PATH, &filters, None, None)?;

        let mut programs = BTreeSet::new();
        for resource in resources {
            match CarePlanRecord::parse(resource) {
                Ok(plan) if plan.active => programs.extend(plan.programs),
                Ok(_) => {}
                Err(e) => tracing::debug!(patient_id, error = %e, "Skipping care plan record"),
            }
        }
        Ok(programs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictCandidate {
    pub org_id: i64,
    pub patient_id: String,
    pub enrolled: BTreeSet<ProgramType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub org_id: i64,
    pub patient_id: String,
    pub primary: ProgramType,
    pub demoted: Vec<ProgramType>,
    /// The primary was chosen because an active care plan backs it.
    pub care_plan_backed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    pub candidates: usize,
    pub resolutions: Vec<Resolution>,
    pub failed_lookups: usize,
}

/// Patients active in two or more exclusive programs of one organization,
/// ordered by organization then patient id.
pub fn find_candidates(aggregate: &EnrollmentAggregate) -> Vec<ConflictCandidate> {
    let mut memberships: BTreeMap<(i64, &str), BTreeSet<ProgramType>> = BTreeMap::new();

    for ((org_id, program), stats) in &aggregate.stats {
        if !program.is_exclusive() {
            continue;
        }
        for patient_id in &stats.active {
            memberships
                .entry((*org_id, patient_id.as_str()))
                .or_default()
                .insert(*program);
        }
    }

    memberships
        .into_iter()
        .filter(|(_, enrolled)| enrolled.len() >= 2)
        .map(|((org_id, patient_id), enrolled)| ConflictCandidate {
            org_id,
            patient_id: patient_id.to_string(),
            enrolled,
        })
        .collect()
}

/// Pick the program a conflicted patient keeps.
///
/// Priority order PCM > APCM > CCCM > CCM, first among programs that are
/// backed by an active care plan, then among enrolled programs alone.
/// Returns the program and whether a care plan backed it, or `None` only
/// when `enrolled` is empty.
pub fn choose_primary(
    enrolled: &BTreeSet<ProgramType>,
    care_plans: &BTreeSet<ProgramType>,
) -> Option<(ProgramType, bool)> {
    if let Some(backed) = EXCLUSIVE_PROGRAMS
        .into_iter()
        .find(|p| enrolled.contains(p) && care_plans.contains(p))
    {
        return Some((backed, true));
    }
    EXCLUSIVE_PROGRAMS
        .into_iter()
        .find(|p| enrolled.contains(p))
        .or_else(|| enrolled.first().copied())
        .map(|p| (p, false))
}

/// Look up care plans for every patient, `LOOKUP_BATCH_SIZE` at a time with
/// `batch_pause` between batches. A failed lookup yields an empty set.
pub fn lookup_care_plans(
    lookup: &dyn CarePlanLookup,
    patient_ids: &[String],
    batch_pause: Duration,
) -> (BTreeMap<String, BTreeSet<ProgramType>>, usize) {
    let mut plans = BTreeMap::new();
    let mut failed = 0usize;

    for (i, batch) in patient_ids.chunks(LOOKUP_BATCH_SIZE).enumerate() {
        if i > 0 {
            pause(batch_pause);
        }

        let results: Vec<(&String, Option<BTreeSet<ProgramType>>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|patient_id| {
                    (
                        patient_id,
                        scope.spawn(move || lookup.active_care_plan_programs(patient_id)),
                    )
                })
                .collect();

            handles
                .into_iter()
                .map(|(patient_id, handle)| match handle.join() {
                    Ok(Ok(programs)) => (patient_id, Some(programs)),
                    Ok(Err(e)) => {
                        tracing::warn!(patient_id = %patient_id, error = %e, "Care plan lookup failed");
                        (patient_id, None)
                    }
                    Err(_) => {
                        tracing::warn!(patient_id = %patient_id, "Care plan lookup panicked");
                        (patient_id, None)
                    }
                })
                .collect()
        });

        for (patient_id, programs) in results {
            if programs.is_none() {
                failed += 1;
            }
            plans.insert(patient_id.clone(), programs.unwrap_or_default());
        }
    }

    (plans, failed)
}

/// Resolve every conflict in place. Only moves patients from active to
/// inactive; no enrollment is created or dropped.
pub fn resolve_conflicts(
    aggregate: &mut EnrollmentAggregate,
    lookup: &dyn CarePlanLookup,
    batch_pause: Duration,
) -> ConflictReport {
    let candidates = find_candidates(aggregate);
    let mut report = ConflictReport {
        candidates: candidates.len(),
        ..Default::default()
    };
    if candidates.is_empty() {
        tracing::info!("No dual enrollments to resolve");
        return report;
    }

    let patient_ids: Vec<String> = candidates
        .iter()
        .map(|c| c.patient_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let (plans, failed) = lookup_care_plans(lookup, &patient_ids, batch_pause);
    report.failed_lookups = failed;

    let no_plans = BTreeSet::new();
    for candidate in candidates {
        let care_plans = plans.get(&candidate.patient_id).unwrap_or(&no_plans);
        let Some((primary, care_plan_backed)) = choose_primary(&candidate.enrolled, care_plans) else {
            continue;
        };

        let mut demoted = Vec::new();
        for program in candidate.enrolled.iter().filter(|p| **p != primary) {
            if let Some(stats) = aggregate.get_mut(candidate.org_id, *program) {
                if stats.demote(&candidate.patient_id) {
                    demoted.push(*program);
                }
            }
        }

        tracing::debug!(
            org_id = candidate.org_id,
            patient_id = %candidate.patient_id,
            primary = %primary,
            care_plan_backed,
            demoted = demoted.len(),
            "Resolved dual enrollment"
        );
        report.resolutions.push(Resolution {
            org_id: candidate.org_id,
            patient_id: candidate.patient_id,
            primary,
            demoted,
            care_plan_backed,
        });
    }

    tracing::info!(
        candidates = report.candidates,
        failed_lookups = report.failed_lookups,
        "Dual enrollments resolved"
    );
    report
}
