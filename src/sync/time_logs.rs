//! Time-log phase: per-patient minutes per program for one month.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::models::{ProgramType, SyncPeriod};
use crate::remote::{PageProgress, PaginatedFetcher, RemoteError, TimeTaskRecord};

pub const TIME_TASKS_PATH: &str = "/Task";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientMinutes {
    by_patient: BTreeMap<String, BTreeMap<ProgramType, u32>>,
    pub records: usize,
    pub skipped: usize,
}

impl PatientMinutes {
    pub fn add(&mut self, task: TimeTaskRecord) {
        let total = self
            .by_patient
            .entry(task.patient_id)
            .or_default()
            .entry(task.program)
            .or_insert(0);
        *total = total.saturating_add(task.minutes);
        self.records += 1;
    }

    /// Recorded minutes, `None` if the patient logged nothing for `program`.
    pub fn minutes(&self, patient_id: &str, program: ProgramType) -> Option<u32> {
        self.by_patient.get(patient_id)?.get(&program).copied()
    }

    pub fn patients(&self) -> usize {
        self.by_patient.len()
    }
}

/// `_lastUpdated` bounds selecting `[month start, next month start)`.
pub fn period_filters(period: SyncPeriod) -> [(&'static str, String); 2] {
    [
        ("_lastUpdated", format!("ge{}", period.start())),
        ("_lastUpdated", format!("lt{}", period.next_start())),
    ]
}

/// Fold raw task resources. Tasks without a patient, a known program code
/// or a derivable duration are skipped.
pub fn aggregate_time_logs(resources: Vec<Value>) -> PatientMinutes {
    let mut minutes = PatientMinutes::default();
    for resource in resources {
        match TimeTaskRecord::parse(resource) {
            Ok(task) => minutes.add(task),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping time task record");
                minutes.skipped += 1;
            }
        }
    }
    minutes
}

pub fn fetch_time_logs(
    fetcher: &PaginatedFetcher,
    period: SyncPeriod,
    on_page: Option<&dyn Fn(PageProgress)>,
) -> Result<PatientMinutes, RemoteError> {
    let resources = fetcher.fetch_all(TIME_TASKS_PATH, &period_filters(period), None, on_page)?;
    let minutes = aggregate_time_logs(resources);
    tracing::info!(
        period = %period,
        records = minutes.records,
        patients = minutes.patients(),
        skipped = minutes.skipped,
        "Time logs aggregated"
    );
    Ok(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mock::{bundle, fetcher, MockTransport};
    use serde_json::json;

    fn task(patient: &str, program: &str, description: &str) -> Value {
        json!({
            "for": { "reference": format!("Patient/{patient}") },
            "code": { "coding": [{ "code": program }] },
            "description": description,
        })
    }

    #[test]
    fn minutes_accumulate_per_program() {
        let minutes = aggregate_time_logs(vec![
            task("p1", "CCM", r#"{"seconds": 600}"#),
            task("p1", "CCM", r#"{"seconds": 900}"#),
            task("p1", "RPM", "1200 seconds"),
            task("p2", "CCM", "seconds=59"),
        ]);

        assert_eq!(minutes.minutes("p1", ProgramType::Ccm), Some(25));
        assert_eq!(minutes.minutes("p1", ProgramType::Rpm), Some(20));
        // 59 seconds floors to zero but the patient still has a log
        assert_eq!(minutes.minutes("p2", ProgramType::Ccm), Some(0));
        assert_eq!(minutes.minutes("p2", ProgramType::Pcm), None);
        assert_eq!(minutes.patients(), 2);
        assert_eq!(minutes.records, 4);
    }

    #[test]
    fn execution_period_used_without_seconds() {
        let minutes = aggregate_time_logs(vec![json!({
            "for": { "reference": "Patient/p9" },
            "code": { "coding": [{ "code": "BHI" }] },
            "description": "Phone follow-up",
            "executionPeriod": { "start": "2026-09-03T10:00:00Z", "end": "2026-09-03T10:21:30Z" },
        })]);
        assert_eq!(minutes.minutes("p9", ProgramType::Bhi), Some(21));
    }

    #[test]
    fn incomplete_tasks_are_skipped() {
        let minutes = aggregate_time_logs(vec![
            json!({ "code": { "coding": [{ "code": "CCM" }] }, "description": "seconds=60" }),
            json!({ "for": { "reference": "Patient/p1" }, "description": "seconds=60" }),
            task("p1", "CCM", "no duration here"),
        ]);
        assert_eq!(minutes.skipped, 3);
        assert_eq!(minutes.patients(), 0);
    }

    #[test]
    fn filters_bound_the_month() {
        let period = SyncPeriod::new(12, 2025).unwrap();
        let [from, to] = period_filters(period);
        assert_eq!(from, ("_lastUpdated", "ge2025-12-01".to_string()));
        assert_eq!(to, ("_lastUpdated", "lt2026-01-01".to_string()));
    }

    #[test]
    fn fetch_requests_month_window() {
        let mock = MockTransport::new();
        mock.on_page(
            TIME_TASKS_PATH,
            &[("_lastUpdated", "ge2026-09-01"), ("_lastUpdated", "lt2026-10-01")],
            1,
            bundle(vec![task("p1", "PCM", "seconds: 2400")], false, None),
        );

        let period = SyncPeriod::new(9, 2026).unwrap();
        let minutes = fetch_time_logs(&fetcher(mock), period, None).unwrap();
        assert_eq!(minutes.minutes("p1", ProgramType::Pcm), Some(40));
    }
}
