use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration, Utc};

use super::common::*;
use crate::workflows::enrollment::curriculum::InMemoryCurriculumCatalog;
use crate::workflows::enrollment::domain::{
    AcademicYear, EnrolledStudent, EnrollmentRequest, IdentityTuple, LedgerEntryId, LedgerStatus,
    MigrationStatus, NewEnrolledStudent, RequestId, RequestStatus,
};
use crate::workflows::enrollment::memory::{InMemoryLedger, InMemoryRequestRepository};
use crate::workflows::enrollment::migration::{
    DuplicateKind, ExactIdPolicy, MigrationConfig, MigrationEngine, MigrationError,
};
use crate::workflows::enrollment::notifications::NotificationStage;
use crate::workflows::enrollment::requests::RequestServiceError;
use crate::workflows::enrollment::repository::{
    LedgerRepository, Offering, RepositoryError, RequestFilter, RequestRepository,
};
use crate::workflows::enrollment::workflow::{EnrollmentWorkflow, InMemoryHandles, WorkflowSettings};

fn assert_unique_active(ledger: &dyn LedgerRepository) {
    let mut seen: HashSet<IdentityTuple> = HashSet::new();
    for row in ledger.active_rows().expect("ledger readable") {
        assert!(seen.insert(row.identity()), "duplicate active row for {}", row.identity());
    }
    let mut per_request: HashMap<RequestId, usize> = HashMap::new();
    for row in ledger.list(None).expect("ledger readable") {
        *per_request.entry(row.enrollment_request_id).or_default() += 1;
    }
    assert!(per_request.values().all(|count| *count == 1));
}

fn stored(harness: &Harness, id: RequestId) -> EnrollmentRequest {
    harness
        .handles
        .requests
        .fetch(id)
        .expect("request store readable")
        .expect("request exists")
}

#[test]
fn approved_request_is_migrated_into_the_current_academic_year() {
    let harness = harness();
    let request = harness.approved("2021-0100");

    let summary = harness.workflow.migration.migrate_approved().expect("run succeeds");

    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.migrated_count, 1);
    assert_eq!(summary.duplicates_prevented, 0);
    assert_eq!(summary.error_count, 0);
    assert_eq!(summary.academic_year, AcademicYear("2025-2026".to_string()));

    let rows = harness.handles.ledger.list(None).unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.enrollment_request_id, request.id);
    assert_eq!(row.academic_year.0, "2025-2026");
    assert_eq!(row.status, LedgerStatus::Active);
    assert_eq!(row.enrollment_date, request.created_at);
    assert_eq!(row.subjects, request.subjects);
    assert_eq!(row.total_fees, request.total_fees);
    assert_eq!(summary.migrated[0].ledger_entry_id, row.id);

    assert_eq!(stored(&harness, request.id).migration_status, MigrationStatus::Migrated);
}

#[test]
fn second_run_is_a_no_op() {
    let harness = harness();
    harness.approved("2021-0101");
    harness.approved("2021-0202");

    let first = harness.workflow.migration.migrate_approved().unwrap();
    assert_eq!(first.migrated_count, 2);
    let before = harness.handles.ledger.list(None).unwrap();

    let second = harness.workflow.migration.migrate_approved().unwrap();
    assert_eq!(second.scanned, 0);
    assert_eq!(second.migrated_count, 0);
    assert_eq!(harness.handles.ledger.list(None).unwrap(), before);
}

#[test]
fn resubmitted_identity_is_prevented_while_enrollment_is_active() {
    let harness = harness();
    harness.approved("2021-0103");
    harness.workflow.migration.migrate_approved().unwrap();
    let existing = harness.handles.ledger.list(None).unwrap().remove(0);

    advance(&harness, 3_600);
    let again = harness.approved("2021-0103");
    let summary = harness.workflow.migration.migrate_approved().unwrap();

    assert_eq!(summary.migrated_count, 0);
    assert_eq!(summary.duplicates_prevented, 1);
    let duplicate = &summary.duplicates[0];
    assert_eq!(duplicate.request_id, again.id);
    assert_eq!(duplicate.kind, DuplicateKind::ActiveEnrollment);
    assert_eq!(duplicate.existing_entry, Some(existing.id));
    assert!(duplicate.reason.contains("already has active enrollment"));
    assert_eq!(duplicate.identity, existing.identity());

    assert_eq!(stored(&harness, again.id).migration_status, MigrationStatus::NotMigrated);
    let rerun = harness.workflow.migration.migrate_approved().unwrap();
    assert_eq!(rerun.duplicates_prevented, 1, "duplicates stay visible on later runs");
    assert_eq!(harness.handles.ledger.list(None).unwrap().len(), 1);
}

#[test]
fn dropped_enrollment_frees_the_identity() {
    let harness = harness();
    harness.approved("2021-0104");
    harness.workflow.migration.migrate_approved().unwrap();
    let existing = harness.handles.ledger.list(None).unwrap().remove(0);
    harness
        .workflow
        .ledger
        .set_status(existing.id, "dropped")
        .expect("drop succeeds");

    let again = harness.approved("2021-0104");
    let summary = harness.workflow.migration.migrate_approved().unwrap();
    assert_eq!(summary.migrated_count, 1);
    assert_eq!(summary.migrated[0].request_id, again.id);
    assert_unique_active(&*harness.handles.ledger);
}

#[test]
fn dash_suffixed_student_id_is_prevented_as_variant() {
    let harness = harness();
    harness.approved("2021-0001");
    harness.workflow.migration.migrate_approved().unwrap();

    let variant = harness.approved("2021-0001-A");
    let summary = harness.workflow.migration.migrate_approved().unwrap();

    assert_eq!(summary.migrated_count, 0);
    let duplicate = &summary.duplicates[0];
    assert_eq!(duplicate.request_id, variant.id);
    assert_eq!(duplicate.kind, DuplicateKind::StudentIdVariant);
    assert_eq!(duplicate.identity.student_id, "2021-0001");
    assert!(duplicate.reason.contains("dash-prefix"));
}

#[test]
fn exact_policy_lets_suffixed_ids_through() {
    let settings = WorkflowSettings {
        variant_policy: Arc::new(ExactIdPolicy),
        ..WorkflowSettings::default()
    };
    let harness = harness_with(InMemoryLedger::default(), settings);
    harness.approved("2021-0001");
    harness.approved("2021-0001-A");

    let summary = harness.workflow.migration.migrate_approved().unwrap();
    assert_eq!(summary.migrated_count, 2);
    assert_eq!(summary.duplicates_prevented, 0);
}

#[test]
fn earlier_request_wins_within_one_batch() {
    let harness = harness();
    let earlier = harness.approved("2021-0105");
    advance(&harness, 10);
    let later = harness.approved("2021-0105");

    let summary = harness.workflow.migration.migrate_approved().unwrap();

    assert_eq!(summary.migrated_count, 1);
    assert_eq!(summary.migrated[0].request_id, earlier.id);
    assert_eq!(summary.duplicates_prevented, 1);
    let duplicate = &summary.duplicates[0];
    assert_eq!(duplicate.request_id, later.id);
    assert_eq!(duplicate.existing_request, Some(earlier.id));
    assert!(duplicate.reason.contains(&format!("request #{}", earlier.id)));
    assert_unique_active(&*harness.handles.ledger);
}

#[test]
fn creation_time_outranks_request_id() {
    let harness = harness();
    let first_id = harness.approved("2021-0106");
    let second_id = harness.approved("2021-0106");

    let mut relabeled = stored(&harness, first_id.id);
    relabeled.created_at = relabeled.created_at + Duration::seconds(30);
    harness.handles.requests.update(relabeled).unwrap();

    let summary = harness.workflow.migration.migrate_approved().unwrap();
    assert_eq!(summary.migrated[0].request_id, second_id.id);
    assert_eq!(summary.duplicates[0].request_id, first_id.id);
}

#[test]
fn equal_timestamps_fall_back_to_lower_id() {
    let harness = harness();
    let first = harness.approved("2021-0107");
    let second = harness.approved("2021-0107");
    assert_eq!(first.created_at, second.created_at);

    let summary = harness.workflow.migration.migrate_approved().unwrap();
    assert_eq!(summary.migrated[0].request_id, first.id);
    assert_eq!(summary.duplicates[0].request_id, second.id);
}

#[test]
fn requests_outside_the_lookback_window_are_left_alone() {
    let harness = harness();
    let stale = harness.approved("2021-0108");
    harness.clock.advance(Duration::days(31));

    let summary = harness.workflow.migration.migrate_approved().unwrap();
    assert_eq!(summary.scanned, 0);
    assert_eq!(stored(&harness, stale.id).migration_status, MigrationStatus::NotMigrated);

    let settings = WorkflowSettings {
        migration: MigrationConfig {
            lookback: Duration::days(45),
        },
        ..WorkflowSettings::default()
    };
    let widened = EnrollmentWorkflow::assemble(
        harness
            .handles
            .backends(Arc::new(catalog()), harness.clock.clone()),
        settings,
    );
    assert_eq!(widened.migration.migrate_approved().unwrap().migrated_count, 1);
}

#[test]
fn pending_and_rejected_requests_are_not_candidates() {
    let harness = harness();
    harness
        .workflow
        .requests
        .create(submission("2021-0109"))
        .unwrap();
    let rejected = harness
        .workflow
        .requests
        .create(submission("2021-0110"))
        .unwrap();
    harness
        .workflow
        .requests
        .update_status(rejected.id, "rejected", None)
        .unwrap();

    let summary = harness.workflow.migration.migrate_approved().unwrap();
    assert_eq!(summary.scanned, 0);
    assert!(harness.handles.ledger.list(None).unwrap().is_empty());
}

#[test]
fn enrolled_notification_follows_confirmed_insert() {
    let harness = harness();
    harness.approved(LINKED_STUDENT);
    harness.approved("2099-0042");

    let summary = harness.workflow.migration.migrate_approved().unwrap();
    assert_eq!(summary.migrated_count, 2);
    assert_eq!(summary.notifications.sent, 1);
    assert_eq!(summary.notifications.skipped, 1);
    assert_eq!(summary.notifications.failed, 0);

    let enrolled: Vec<_> = harness
        .handles
        .notifications
        .all()
        .into_iter()
        .filter(|record| record.stage == NotificationStage::Enrolled)
        .collect();
    assert_eq!(enrolled.len(), 1);
    assert_eq!(enrolled[0].user_id, LINKED_USER);
    assert!(enrolled[0].message.contains("1st Term 2025-2026"));
    assert!(enrolled[0].delivered);

    let pushed = harness.handles.connections.sent();
    assert_eq!(pushed.len(), 2, "approval and enrollment pushes");
    assert_eq!(pushed[1].1["notification"]["stage"], "enrolled");
}

#[test]
fn offline_student_still_gets_a_stored_notification() {
    let harness = harness();
    harness.handles.connections.disconnect(LINKED_USER);
    harness.approved(LINKED_STUDENT);

    let summary = harness.workflow.migration.migrate_approved().unwrap();
    assert_eq!(summary.notifications.sent, 1);
    assert!(harness.handles.connections.sent().is_empty());
    assert!(harness
        .handles
        .notifications
        .all()
        .iter()
        .all(|record| !record.delivered));
}

#[test]
fn concurrent_runs_never_duplicate_active_rows() {
    let harness = harness();
    for round in 0..3 {
        for student in 0..4 {
            harness.approved(&format!("3030{student:04}"));
        }
        advance(&harness, round + 1);
    }

    let engine = harness.workflow.migration.clone();
    let migrated: usize = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                scope.spawn(move || engine.migrate_approved().expect("run succeeds").migrated_count)
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("worker finished"))
            .sum()
    });

    assert_eq!(migrated, 4);
    assert_eq!(harness.handles.ledger.list(None).unwrap().len(), 4);
    assert_unique_active(&*harness.handles.ledger);

    let in_flight = harness
        .handles
        .requests
        .list(&RequestFilter::default())
        .unwrap()
        .into_iter()
        .filter(|request| request.migration_status == MigrationStatus::Migrating)
        .count();
    assert_eq!(in_flight, 0, "no claim is left dangling");
    assert_eq!(harness.workflow.migration.migrate_approved().unwrap().migrated_count, 0);
}

/// Ledger that hides active rows from reads, or fails inserts for one student.
struct ScriptedLedger {
    inner: InMemoryLedger,
    blind_reads: bool,
    failing_student: Option<String>,
}

impl LedgerRepository for ScriptedLedger {
    fn insert(&self, entry: NewEnrolledStudent) -> Result<EnrolledStudent, RepositoryError> {
        if self.failing_student.as_deref() == Some(entry.student_id.as_str()) {
            return Err(RepositoryError::Unavailable("write timeout".to_string()));
        }
        self.inner.insert(entry)
    }

    fn fetch(&self, id: LedgerEntryId) -> Result<Option<EnrolledStudent>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn find_by_request(
        &self,
        request_id: RequestId,
    ) -> Result<Option<EnrolledStudent>, RepositoryError> {
        self.inner.find_by_request(request_id)
    }

    fn referenced_requests(
        &self,
        request_ids: &[RequestId],
    ) -> Result<HashSet<RequestId>, RepositoryError> {
        self.inner.referenced_requests(request_ids)
    }

    fn find_active(
        &self,
        identity: &IdentityTuple,
    ) -> Result<Option<EnrolledStudent>, RepositoryError> {
        if self.blind_reads {
            return Ok(None);
        }
        self.inner.find_active(identity)
    }

    fn active_for_offering(
        &self,
        offering: &Offering,
    ) -> Result<Vec<EnrolledStudent>, RepositoryError> {
        if self.blind_reads {
            return Ok(Vec::new());
        }
        self.inner.active_for_offering(offering)
    }

    fn active_rows(&self) -> Result<Vec<EnrolledStudent>, RepositoryError> {
        self.inner.active_rows()
    }

    fn list(&self, student_id: Option<&str>) -> Result<Vec<EnrolledStudent>, RepositoryError> {
        self.inner.list(student_id)
    }

    fn set_status(
        &self,
        id: LedgerEntryId,
        status: LedgerStatus,
    ) -> Result<EnrolledStudent, RepositoryError> {
        self.inner.set_status(id, status)
    }

    fn remove(&self, ids: &[LedgerEntryId]) -> Result<usize, RepositoryError> {
        self.inner.remove(ids)
    }
}

fn scripted_workflow(ledger: Arc<ScriptedLedger>) -> (EnrollmentWorkflow, InMemoryHandles) {
    let handles = InMemoryHandles::new();
    let clock = Arc::new(crate::workflows::enrollment::clock::FixedClock::new(now()));
    let mut backends = handles.backends(Arc::new(InMemoryCurriculumCatalog::default()), clock);
    backends.ledger = ledger;
    (
        EnrollmentWorkflow::assemble(backends, WorkflowSettings::default()),
        handles,
    )
}

fn approve(workflow: &EnrollmentWorkflow, student_id: &str) -> EnrollmentRequest {
    let request = workflow.requests.create(submission(student_id)).unwrap();
    workflow
        .requests
        .update_status(request.id, "approved", None)
        .unwrap()
        .request
}

#[test]
fn storage_constraint_rejection_counts_as_prevented_duplicate() {
    let ledger = Arc::new(ScriptedLedger {
        inner: InMemoryLedger::default(),
        blind_reads: true,
        failing_student: None,
    });
    let (workflow, handles) = scripted_workflow(ledger.clone());
    approve(&workflow, "2021-0200");
    workflow.migration.migrate_approved().unwrap();

    let again = approve(&workflow, "2021-0200");
    let summary = workflow.migration.migrate_approved().unwrap();

    assert_eq!(summary.migrated_count, 0);
    assert_eq!(summary.error_count, 0);
    assert_eq!(summary.duplicates[0].kind, DuplicateKind::StorageConstraint);
    assert_eq!(summary.duplicates[0].request_id, again.id);
    assert_eq!(ledger.inner.list(None).unwrap().len(), 1);

    let released = handles.requests.fetch(again.id).unwrap().unwrap();
    assert_eq!(released.migration_status, MigrationStatus::NotMigrated);
}

#[test]
fn one_failing_candidate_does_not_abort_the_batch() {
    let ledger = Arc::new(ScriptedLedger {
        inner: InMemoryLedger::default(),
        blind_reads: false,
        failing_student: Some("2021-0301".to_string()),
    });
    let (workflow, handles) = scripted_workflow(ledger);
    let failing = approve(&workflow, "2021-0301");
    approve(&workflow, "2021-0302");

    let summary = workflow.migration.migrate_approved().unwrap();
    assert_eq!(summary.migrated_count, 1);
    assert_eq!(summary.error_count, 1);
    assert_eq!(summary.errors[0].request_id, failing.id);
    assert!(summary.errors[0].message.contains("write timeout"));

    let retried = handles.requests.fetch(failing.id).unwrap().unwrap();
    assert_eq!(retried.migration_status, MigrationStatus::NotMigrated);
}

struct OfflineRequests;

impl RequestRepository for OfflineRequests {
    fn insert(&self, _request: EnrollmentRequest) -> Result<EnrollmentRequest, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _request: EnrollmentRequest) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: RequestId) -> Result<Option<EnrollmentRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self, _filter: &RequestFilter) -> Result<Vec<EnrollmentRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete(&self, _id: RequestId) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn approved_unmigrated_since(
        &self,
        _since: DateTime<Utc>,
    ) -> Result<Vec<EnrollmentRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn transition_migration(
        &self,
        _id: RequestId,
        _from: MigrationStatus,
        _to: MigrationStatus,
    ) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[test]
fn unreadable_candidate_set_is_fatal() {
    let handles = InMemoryHandles::new();
    let clock = Arc::new(crate::workflows::enrollment::clock::FixedClock::new(now()));
    let mut backends = handles.backends(Arc::new(InMemoryCurriculumCatalog::default()), clock);
    backends.requests = Arc::new(OfflineRequests);
    let workflow = EnrollmentWorkflow::assemble(backends, WorkflowSettings::default());

    let err = workflow.migration.migrate_approved().unwrap_err();
    assert!(matches!(
        err,
        MigrationError::FatalBatch(RepositoryError::Unavailable(_))
    ));
}

/// Runs a full migration right after the next armed read, so a reviewer's
/// status write lands on a request that was migrated after it was loaded.
struct MigrationDuringReview {
    inner: Arc<InMemoryRequestRepository>,
    engine: OnceLock<Arc<MigrationEngine>>,
    armed: AtomicBool,
}

impl RequestRepository for MigrationDuringReview {
    fn insert(&self, request: EnrollmentRequest) -> Result<EnrollmentRequest, RepositoryError> {
        self.inner.insert(request)
    }

    fn update(&self, request: EnrollmentRequest) -> Result<(), RepositoryError> {
        self.inner.update(request)
    }

    fn fetch(&self, id: RequestId) -> Result<Option<EnrollmentRequest>, RepositoryError> {
        let current = self.inner.fetch(id)?;
        if self.armed.swap(false, Ordering::SeqCst) {
            let engine = self.engine.get().expect("engine wired");
            let summary = engine.migrate_approved().expect("interleaved run succeeds");
            assert_eq!(summary.migrated_count, 1);
        }
        Ok(current)
    }

    fn list(&self, filter: &RequestFilter) -> Result<Vec<EnrollmentRequest>, RepositoryError> {
        self.inner.list(filter)
    }

    fn delete(&self, id: RequestId) -> Result<bool, RepositoryError> {
        self.inner.delete(id)
    }

    fn approved_unmigrated_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<EnrollmentRequest>, RepositoryError> {
        self.inner.approved_unmigrated_since(since)
    }

    fn transition_migration(
        &self,
        id: RequestId,
        from: MigrationStatus,
        to: MigrationStatus,
    ) -> Result<bool, RepositoryError> {
        self.inner.transition_migration(id, from, to)
    }
}

#[test]
fn rejection_loaded_before_a_migration_cannot_undo_it() {
    let handles = InMemoryHandles::new();
    let clock = Arc::new(crate::workflows::enrollment::clock::FixedClock::new(now()));
    let requests = Arc::new(MigrationDuringReview {
        inner: handles.requests.clone(),
        engine: OnceLock::new(),
        armed: AtomicBool::new(false),
    });
    let mut backends = handles.backends(Arc::new(catalog()), clock);
    backends.requests = requests.clone();
    let workflow = EnrollmentWorkflow::assemble(backends, WorkflowSettings::default());
    assert!(requests.engine.set(workflow.migration.clone()).is_ok());

    let request = approve(&workflow, "2021-0310");
    requests.armed.store(true, Ordering::SeqCst);

    let err = workflow
        .requests
        .update_status(request.id, "rejected", Some("incomplete payment".to_string()))
        .unwrap_err();
    assert!(matches!(err, RequestServiceError::AlreadyMigrated(id) if id == request.id));

    let stored = handles.requests.fetch(request.id).unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Approved);
    assert_eq!(stored.migration_status, MigrationStatus::Migrated);
    assert_eq!(stored.remarks, None);
    let row = handles.ledger.find_by_request(request.id).unwrap();
    assert_eq!(row.map(|row| row.enrollment_request_id), Some(request.id));
}

#[test]
fn stale_request_write_is_refused_after_migration() {
    let harness = harness();
    let request = harness.approved("2021-0311");
    let stale = stored(&harness, request.id);

    harness.workflow.migration.migrate_approved().unwrap();

    let mut rejected = stale;
    rejected.status = RequestStatus::Rejected;
    assert!(matches!(
        harness.handles.requests.update(rejected),
        Err(RepositoryError::Conflict(_))
    ));
    assert_eq!(
        stored(&harness, request.id).migration_status,
        MigrationStatus::Migrated
    );
}

#[test]
fn claim_requires_request_to_still_be_approved() {
    let harness = harness();
    let request = harness.approved("2021-0312");
    harness
        .workflow
        .requests
        .update_status(request.id, "rejected", None)
        .unwrap();

    let claimed = harness
        .handles
        .requests
        .transition_migration(request.id, MigrationStatus::NotMigrated, MigrationStatus::Migrating)
        .unwrap();
    assert!(!claimed);
    assert!(harness.handles.ledger.list(None).unwrap().is_empty());
}
