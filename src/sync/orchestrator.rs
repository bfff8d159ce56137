//! SyncOrchestrator: single-flight state machine over the sync phases.
//!
//! `idle → running → completed | error`. Progress is published on a
//! `tokio::sync::watch` channel after every phase transition; pollers read
//! the latest value through `progress()` or a `subscribe()`d receiver.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use super::*;
use crate::config::SyncConfig;
use crate::db::SyncStore;
use crate::models::{RunKind, RunStatus, SyncPeriod, SyncRunLog};
use crate::remote::{HttpTransport, PageProgress, PaginatedFetcher, ReqwestTransport, RetryPolicy, TokenManager};

// ═══════════════════════════════════════════════════════════
// Progress state
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Running,
    Completed,
    Error,
}

/// Latest published state of the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncProgress {
    pub status: SyncStatus,
    pub step: String,
    pub progress_percent: u8,
    pub detail: String,
    pub error: Option<String>,
    pub period: Option<SyncPeriod>,
    pub run_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl SyncProgress {
    pub fn idle() -> Self {
        Self {
            status: SyncStatus::Idle,
            step: "idle".into(),
            progress_percent: 0,
            detail: String::new(),
            error: None,
            period: None,
            run_id: None,
            updated_at: Utc::now(),
        }
    }
}

/// Outcome of one successful monthly run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub kind: RunKind,
    pub period: SyncPeriod,
    pub organizations: usize,
    pub patients_indexed: usize,
    /// Organizations whose patients could not be fetched.
    pub index_failures: Vec<i64>,
    pub enrollment_records: usize,
    pub conflicts_resolved: usize,
    pub failed_lookups: usize,
    pub time_records: usize,
    /// Records dropped for a bad shape across all phases.
    pub skipped_records: usize,
    pub snapshots_written: usize,
    pub records_processed: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

// Step names and the percentage reached when each step starts.
const STEP_ORGANIZATIONS: (&str, u8) = ("organizations", 5);
const STEP_PATIENTS: (&str, u8) = ("patients", 15);
const STEP_ENROLLMENTS: (&str, u8) = ("enrollments", 35);
const STEP_CONFLICTS: (&str, u8) = ("conflicts", 55);
const STEP_TIME_LOGS: (&str, u8) = ("time_logs", 70);
const STEP_SNAPSHOTS: (&str, u8) = ("snapshots", 90);

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Clears the running flag when dropped.
struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ═══════════════════════════════════════════════════════════
// SyncOrchestrator
// ═══════════════════════════════════════════════════════════

pub struct SyncOrchestrator {
    fetcher: PaginatedFetcher,
    store: Arc<dyn SyncStore>,
    progress: watch::Sender<SyncProgress>,
    running: Arc<AtomicBool>,
}

impl SyncOrchestrator {
    pub fn new(fetcher: PaginatedFetcher, store: Arc<dyn SyncStore>) -> Self {
        let (progress, _) = watch::channel(SyncProgress::idle());
        Self {
            fetcher,
            store,
            progress,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Production wiring: reqwest transport, token manager on the
    /// configured base URL, default pacing.
    pub fn from_config(config: &SyncConfig, store: Arc<dyn SyncStore>) -> Result<Self, SyncError> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(config.http_timeout_secs)?);
        let tokens = TokenManager::new(
            transport.clone(),
            config.token_url(),
            config.client_id.clone(),
            config.client_secret.clone(),
        );
        let fetcher = PaginatedFetcher::new(&config.api_base_url, transport, tokens, RetryPolicy::default());
        Ok(Self::new(fetcher, store))
    }

    pub fn progress(&self) -> SyncProgress {
        self.progress.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.progress.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run the monthly sync for `period` on the calling thread.
    pub fn run(&self, period: SyncPeriod) -> Result<SyncReport, SyncError> {
        let _guard = self.claim()?;
        self.run_claimed(period, RunKind::Monthly)
    }

    /// Run each period in order, stopping at the first failure. The whole
    /// backfill holds the single-flight slot.
    pub fn run_backfill(&self, periods: &[SyncPeriod]) -> Result<Vec<SyncReport>, SyncError> {
        let _guard = self.claim()?;
        tracing::info!(months = periods.len(), "Backfill started");

        let mut reports = Vec::with_capacity(periods.len());
        for period in periods {
            reports.push(self.run_claimed(*period, RunKind::Backfill)?);
        }
        Ok(reports)
    }

    /// Run the monthly sync on a dedicated thread. A concurrent run is
    /// rejected here, before the thread is spawned.
    pub fn start_background(
        self: &Arc<Self>,
        period: SyncPeriod,
    ) -> Result<JoinHandle<Result<SyncReport, SyncError>>, SyncError> {
        let guard = self.claim()?;
        let this = Arc::clone(self);
        Ok(std::thread::spawn(move || {
            let _guard = guard;
            this.run_claimed(period, RunKind::Monthly)
        }))
    }

    fn claim(&self) -> Result<RunGuard, SyncError> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::AlreadyRunning(Box::new(self.progress())))?;
        Ok(RunGuard {
            flag: Arc::clone(&self.running),
        })
    }

    fn run_claimed(&self, period: SyncPeriod, kind: RunKind) -> Result<SyncReport, SyncError> {
        let run = SyncRunLog::started(kind, format!("{kind} sync for {period}"));
        self.progress.send_replace(SyncProgress {
            status: SyncStatus::Running,
            step: "starting".into(),
            progress_percent: 0,
            detail: format!("Starting {kind} sync for {period}"),
            error: None,
            period: Some(period),
            run_id: Some(run.id),
            updated_at: Utc::now(),
        });

        if let Err(e) = self.store.insert_sync_run_log(&run) {
            return Err(self.fail(None, e.into()));
        }
        tracing::info!(run_id = %run.id, period = %period, kind = %kind, "Sync run started");

        // A panic in a phase still ends the run as `error`.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(&run, period)))
            .unwrap_or_else(|payload| Err(SyncError::Panicked(panic_message(payload.as_ref()))));
        let report = match outcome {
            Ok(report) => report,
            Err(e) => return Err(self.fail(Some(run.id), e)),
        };

        let summary = format!(
            "{} snapshots for {period}, {} conflicts resolved",
            report.snapshots_written, report.conflicts_resolved
        );
        if let Err(e) = self.store.update_sync_run_log(
            &run.id,
            RunStatus::Completed,
            report.completed_at,
            report.records_processed,
            Some(&summary),
        ) {
            return Err(self.fail(Some(run.id), e.into()));
        }

        self.progress.send_modify(|p| {
            p.status = SyncStatus::Completed;
            p.step = "completed".into();
            p.progress_percent = 100;
            p.detail = summary;
            p.updated_at = Utc::now();
        });
        tracing::info!(
            run_id = %run.id,
            records = report.records_processed,
            snapshots = report.snapshots_written,
            "Sync run completed"
        );
        Ok(report)
    }

    fn execute(&self, run: &SyncRunLog, period: SyncPeriod) -> Result<SyncReport, SyncError> {
        let store = self.store.as_ref();

        self.enter(STEP_ORGANIZATIONS, "Fetching organizations");
        let on_page = |p: PageProgress| self.page_detail("organizations", p);
        let orgs = sync_organizations(&self.fetcher, store, Some(&on_page))?;

        self.enter(STEP_PATIENTS, format!("Indexing patients of {} organizations", orgs.org_ids.len()));
        let on_org = |done: usize, total: usize| {
            let (_, base) = STEP_PATIENTS;
            let span = STEP_ENROLLMENTS.1 - base;
            let percent = base + (span as usize * done / total.max(1)) as u8;
            self.progress.send_modify(|p| {
                p.progress_percent = percent;
                p.detail = format!("Indexed {done}/{total} organizations");
                p.updated_at = Utc::now();
            });
        };
        let index = build_patient_index(&self.fetcher, &orgs.org_ids, Some(&on_org));

        self.enter(STEP_ENROLLMENTS, format!("{} patients indexed", index.len()));
        let on_page = |p: PageProgress| self.page_detail("enrollments", p);
        let mut enrollments = fetch_enrollments(&self.fetcher, &index, Some(&on_page))?;

        self.enter(STEP_CONFLICTS, format!("{} enrollment records", enrollments.records));
        let conflicts = resolve_conflicts(&mut enrollments, &self.fetcher, self.fetcher.policy().batch_pause);

        self.enter(STEP_TIME_LOGS, format!("{} dual enrollments resolved", conflicts.resolutions.len()));
        let on_page = |p: PageProgress| self.page_detail("time logs", p);
        let minutes = fetch_time_logs(&self.fetcher, period, Some(&on_page))?;

        self.enter(STEP_SNAPSHOTS, format!("{} time records", minutes.records));
        let synced_at = Utc::now();
        let rows = build_snapshots(&enrollments, &minutes, &index, &orgs.practice_ids, period, synced_at);
        let written = persist_snapshots(store, period, &rows)?;

        let records_processed = orgs.org_ids.len() + index.len() + enrollments.records + minutes.records;
        Ok(SyncReport {
            run_id: run.id,
            kind: run.kind,
            period,
            organizations: orgs.org_ids.len(),
            patients_indexed: index.len(),
            index_failures: index.failures.iter().map(|f| f.org_id).collect(),
            enrollment_records: enrollments.records,
            conflicts_resolved: conflicts.resolutions.len(),
            failed_lookups: conflicts.failed_lookups,
            time_records: minutes.records,
            skipped_records: orgs.skipped + index.skipped + enrollments.skipped + minutes.skipped,
            snapshots_written: written,
            records_processed: records_processed as u64,
            started_at: run.started_at,
            completed_at: Utc::now(),
        })
    }

    fn enter(&self, (step, percent): (&str, u8), detail: impl Into<String>) {
        let detail = detail.into();
        tracing::info!(step, percent, detail = %detail, "Sync phase");
        self.progress.send_modify(|p| {
            p.step = step.to_string();
            p.progress_percent = percent;
            p.detail = detail;
            p.updated_at = Utc::now();
        });
    }

    fn page_detail(&self, label: &str, page: PageProgress) {
        let detail = match page.estimated_total {
            Some(total) => format!("{label}: page {}/{total}, {} records", page.page, page.records),
            None => format!("{label}: page {}, {} records", page.page, page.records),
        };
        self.progress.send_modify(|p| {
            p.detail = detail;
            p.updated_at = Utc::now();
        });
    }

    /// Mark the run failed in the log and the published state.
    fn fail(&self, run_id: Option<Uuid>, error: SyncError) -> SyncError {
        let message = error.to_string();
        tracing::error!(run_id = ?run_id, error = %message, "Sync run failed");

        if let Some(id) = run_id {
            if let Err(e) = self
                .store
                .update_sync_run_log(&id, RunStatus::Error, Utc::now(), 0, Some(&message))
            {
                tracing::error!(run_id = %id, error = %e, "Failed to record sync failure");
            }
        }

        self.progress.send_modify(|p| {
            p.status = SyncStatus::Error;
            p.error = Some(message);
            p.updated_at = Utc::now();
        });
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteSyncStore;
    use crate::db::DatabaseError;
    use crate::models::{Practice, PracticeUpsert, ProgramSnapshot, ProgramType};
    use crate::remote::mock::{bundle, fetcher, MockTransport};
    use crate::remote::{HttpResponse, RemoteError};
    use serde_json::{json, Value};

    fn episode(patient: &str, program: &str) -> Value {
        json!({
            "patient": { "reference": format!("Patient/{patient}") },
            "type": [{ "coding": [{ "code": program }] }],
            "status": "active",
        })
    }

    fn task(patient: &str, program: &str, seconds: u32) -> Value {
        json!({
            "for": { "reference": format!("Patient/{patient}") },
            "code": { "coding": [{ "code": program }] },
            "description": format!("{{\"seconds\": {seconds}}}"),
        })
    }

    fn period() -> SyncPeriod {
        SyncPeriod::new(9, 2026).unwrap()
    }

    fn month_filters(period: SyncPeriod) -> (String, String) {
        (format!("ge{}", period.start()), format!("lt{}", period.next_start()))
    }

    /// Organization 1 with 10 CCM and 4 PCM patients, two shared. s1 has a
    /// PCM care plan, s2 has none.
    fn scripted_platform(periods: &[SyncPeriod]) -> Arc<MockTransport> {
        let mock = MockTransport::new();
        mock.on_page(
            ORGANIZATIONS_PATH,
            &[],
            1,
            bundle(vec![json!({ "id": "1", "name": "Summit Primary Care" })], false, None),
        );

        let ccm = ["c1", "c2", "c3", "c4", "c5", "c6", "c7", "c8", "s1", "s2"];
        let pcm = ["p1", "p2", "s1", "s2"];
        let mut patients: Vec<Value> = ccm.iter().map(|id| json!({ "id": id })).collect();
        patients.extend(["p1", "p2"].iter().map(|id| json!({ "id": id })));
        mock.on_page(PATIENTS_PATH, &[("organization", "1")], 1, bundle(patients, false, None));

        let mut episodes: Vec<Value> = ccm.iter().map(|p| episode(p, "CCM")).collect();
        mock.on_page(ENROLLMENTS_PATH, &[], 1, bundle(episodes.drain(..6).collect(), true, Some(2)));
        episodes.extend(pcm.iter().map(|p| episode(p, "PCM")));
        mock.on_page(ENROLLMENTS_PATH, &[], 2, bundle(episodes, false, None));

        mock.on_page(
            CARE_PLANS_PATH,
            &[("subject", "Patient/s1"), ("status", "active")],
            1,
            bundle(
                vec![json!({ "status": "active", "category": [{ "coding": [{ "code": "PCM" }] }] })],
                false,
                None,
            ),
        );
        mock.on_page(
            CARE_PLANS_PATH,
            &[("subject", "Patient/s2"), ("status", "active")],
            1,
            bundle(vec![], false, None),
        );

        for period in periods {
            let (from, to) = month_filters(*period);
            mock.on_page(
                TIME_TASKS_PATH,
                &[("_lastUpdated", from.as_str()), ("_lastUpdated", to.as_str())],
                1,
                bundle(
                    vec![task("c1", "CCM", 1500), task("s1", "CCM", 2700), task("p1", "PCM", 300)],
                    false,
                    None,
                ),
            );
        }
        mock
    }

    fn orchestrator(mock: Arc<MockTransport>) -> (SyncOrchestrator, Arc<SqliteSyncStore>) {
        let store = Arc::new(SqliteSyncStore::open_in_memory().unwrap());
        (SyncOrchestrator::new(fetcher(mock), store.clone()), store)
    }

    #[test]
    fn starts_idle() {
        let (orchestrator, _) = orchestrator(MockTransport::new());
        let progress = orchestrator.progress();
        assert_eq!(progress.status, SyncStatus::Idle);
        assert!(!orchestrator.is_running());
    }

    #[test]
    fn end_to_end_monthly_sync() {
        let (orchestrator, store) = orchestrator(scripted_platform(&[period()]));

        let report = orchestrator.run(period()).unwrap();

        assert_eq!(report.organizations, 1);
        assert_eq!(report.patients_indexed, 12);
        assert_eq!(report.enrollment_records, 14);
        assert_eq!(report.conflicts_resolved, 2);
        assert_eq!(report.time_records, 3);
        assert_eq!(report.snapshots_written, 2);
        assert_eq!(report.records_processed, 1 + 12 + 14 + 3);

        let rows = store.snapshots_for_period(9, 2026).unwrap();
        let ccm = rows.iter().find(|r| r.program == ProgramType::Ccm).unwrap();
        let pcm = rows.iter().find(|r| r.program == ProgramType::Pcm).unwrap();
        assert_eq!((ccm.patients_enrolled, ccm.inactive_count), (8, 2));
        assert_eq!((pcm.patients_enrolled, pcm.inactive_count), (4, 0));
        assert_eq!(ccm.not_enrolled_count, 4);
        // c1 has 25 minutes, s1 moved to PCM
        assert_eq!(ccm.buckets.mins20_plus, 1);
        assert_eq!(ccm.buckets.mins0, 7);
        // s1 falls back to its 45 CCM minutes, p1 logged 5 PCM minutes
        assert_eq!(pcm.buckets.mins40_59, 1);
        assert_eq!(pcm.buckets.mins1_9, 1);
        assert_eq!(pcm.buckets.mins0, 2);

        let progress = orchestrator.progress();
        assert_eq!(progress.status, SyncStatus::Completed);
        assert_eq!(progress.progress_percent, 100);
        assert_eq!(progress.run_id, Some(report.run_id));
        assert!(!orchestrator.is_running());

        let runs = store.recent_sync_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Completed);
        assert_eq!(runs[0].records_processed, report.records_processed);
    }

    #[test]
    fn rerun_replaces_snapshots() {
        let (orchestrator, store) = orchestrator(scripted_platform(&[period()]));

        orchestrator.run(period()).unwrap();
        let first: Vec<_> = store
            .snapshots_for_period(9, 2026)
            .unwrap()
            .into_iter()
            .map(|r| (r.program, r.patients_enrolled, r.inactive_count, r.buckets))
            .collect();
        orchestrator.run(period()).unwrap();
        let second: Vec<_> = store
            .snapshots_for_period(9, 2026)
            .unwrap()
            .into_iter()
            .map(|r| (r.program, r.patients_enrolled, r.inactive_count, r.buckets))
            .collect();

        assert_eq!(first, second);
        assert_eq!(store.list_practices().unwrap().len(), 1);
        assert_eq!(store.recent_sync_runs(10).unwrap().len(), 2);
    }

    #[test]
    fn remote_failure_marks_run_error() {
        let mock = MockTransport::new();
        mock.on_page(ORGANIZATIONS_PATH, &[], 1, HttpResponse::new(500, "maintenance"));
        let (orchestrator, store) = orchestrator(mock.clone());

        let err = orchestrator.run(period()).unwrap_err();

        assert!(matches!(err, SyncError::Remote(RemoteError::Api { status: 500, .. })));
        let progress = orchestrator.progress();
        assert_eq!(progress.status, SyncStatus::Error);
        assert_eq!(progress.step, "organizations");
        assert!(progress.error.unwrap().contains("500"));

        let runs = store.recent_sync_runs(1).unwrap();
        assert_eq!(runs[0].status, RunStatus::Error);
        assert!(runs[0].detail.as_deref().unwrap().contains("500"));
        // later phases never ran
        assert_eq!(mock.request_count(ENROLLMENTS_PATH), 0);
        assert!(store.snapshots_for_period(9, 2026).unwrap().is_empty());
        assert!(!orchestrator.is_running());
    }

    #[test]
    fn concurrent_start_is_rejected() {
        let (orchestrator, _) = orchestrator(scripted_platform(&[period()]));

        let guard = orchestrator.claim().unwrap();
        let before = orchestrator.progress();
        let err = orchestrator.run(period()).unwrap_err();
        match err {
            SyncError::AlreadyRunning(progress) => assert_eq!(*progress, before),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(orchestrator.progress(), before);

        drop(guard);
        assert!(orchestrator.run(period()).is_ok());
    }

    #[test]
    fn background_run_publishes_progress() {
        let (orchestrator, _) = orchestrator(scripted_platform(&[period()]));
        let orchestrator = Arc::new(orchestrator);
        let receiver = orchestrator.subscribe();

        let handle = orchestrator.start_background(period()).unwrap();
        let report = handle.join().unwrap().unwrap();

        assert_eq!(report.kind, RunKind::Monthly);
        assert_eq!(receiver.borrow().status, SyncStatus::Completed);
        assert!(!orchestrator.is_running());
    }

    /// Delegates to SQLite but panics on the first practice upsert.
    struct PanickingStore(SqliteSyncStore);

    impl SyncStore for PanickingStore {
        fn upsert_practice(&self, _: &PracticeUpsert) -> Result<Practice, DatabaseError> {
            panic!("practice table unavailable");
        }
        fn list_practices(&self) -> Result<Vec<Practice>, DatabaseError> {
            self.0.list_practices()
        }
        fn replace_snapshots_for_period(
            &self,
            month: u32,
            year: i32,
            rows: &[ProgramSnapshot],
        ) -> Result<usize, DatabaseError> {
            self.0.replace_snapshots_for_period(month, year, rows)
        }
        fn snapshots_for_period(&self, month: u32, year: i32) -> Result<Vec<ProgramSnapshot>, DatabaseError> {
            self.0.snapshots_for_period(month, year)
        }
        fn insert_sync_run_log(&self, run: &SyncRunLog) -> Result<(), DatabaseError> {
            self.0.insert_sync_run_log(run)
        }
        fn update_sync_run_log(
            &self,
            id: &Uuid,
            status: RunStatus,
            completed_at: DateTime<Utc>,
            records_processed: u64,
            detail: Option<&str>,
        ) -> Result<(), DatabaseError> {
            self.0.update_sync_run_log(id, status, completed_at, records_processed, detail)
        }
        fn recent_sync_runs(&self, limit: u32) -> Result<Vec<SyncRunLog>, DatabaseError> {
            self.0.recent_sync_runs(limit)
        }
    }

    #[test]
    fn panicking_background_run_ends_in_error() {
        let store = Arc::new(PanickingStore(SqliteSyncStore::open_in_memory().unwrap()));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            fetcher(scripted_platform(&[period()])),
            store.clone(),
        ));

        let handle = orchestrator.start_background(period()).unwrap();
        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(&err, SyncError::Panicked(msg) if msg.contains("practice table unavailable")));

        let progress = orchestrator.progress();
        assert_eq!(progress.status, SyncStatus::Error);
        assert!(progress.error.unwrap().contains("practice table unavailable"));
        let runs = store.recent_sync_runs(1).unwrap();
        assert_eq!(runs[0].status, RunStatus::Error);
        assert!(!orchestrator.is_running());
    }

    #[test]
    fn backfill_runs_months_in_order() {
        let periods = period().trailing(2);
        let (orchestrator, store) = orchestrator(scripted_platform(&periods));

        let reports = orchestrator.run_backfill(&periods).unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].period, periods[0]);
        assert_eq!(reports[1].period, period());
        let runs = store.recent_sync_runs(10).unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.kind == RunKind::Backfill));
        assert_eq!(store.snapshots_for_period(8, 2026).unwrap().len(), 2);
    }

    #[test]
    fn backfill_stops_at_first_failure() {
        // Only September has a time-log route; August fails with 404.
        let periods = period().trailing(2);
        let (orchestrator, store) = orchestrator(scripted_platform(&[period()]));

        let err = orchestrator.run_backfill(&periods).unwrap_err();

        assert!(matches!(err, SyncError::Remote(RemoteError::Api { status: 404, .. })));
        let runs = store.recent_sync_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Error);
        assert!(store.snapshots_for_period(9, 2026).unwrap().is_empty());
    }
}
