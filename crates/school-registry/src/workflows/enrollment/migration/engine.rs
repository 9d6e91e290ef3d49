use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};

use super::{
    DuplicateKind, DuplicateSkipped, MigratedEntry, MigrationError, MigrationSummary,
    PerCandidateError, StudentIdVariantPolicy,
};
use crate::workflows::enrollment::clock::Clock;
use crate::workflows::enrollment::domain::{
    AcademicYear, EnrollmentRequest, IdentityTuple, LedgerEntryId, MigrationStatus,
    NewEnrolledStudent, RequestId,
};
use crate::workflows::enrollment::notifications::{
    NotificationStage, NotifyOutcome, StudentNotifier,
};
use crate::workflows::enrollment::repository::{
    LedgerRepository, Offering, RepositoryError, RequestRepository,
};

pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Only requests created within this window are scanned.
    pub lookback: Duration,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::days(DEFAULT_LOOKBACK_DAYS),
        }
    }
}

enum Screening {
    Accepted,
    AlreadyMigrated,
    Duplicate(DuplicateSkipped),
}

enum Commit {
    Inserted(MigratedEntry),
    InFlight,
    Duplicate(DuplicateSkipped),
}

/// Moves approved requests into the ledger at most once per request and identity tuple.
pub struct MigrationEngine {
    requests: Arc<dyn RequestRepository>,
    ledger: Arc<dyn LedgerRepository>,
    notifier: Arc<StudentNotifier>,
    policy: Arc<dyn StudentIdVariantPolicy>,
    clock: Arc<dyn Clock>,
    config: MigrationConfig,
}

impl MigrationEngine {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        ledger: Arc<dyn LedgerRepository>,
        notifier: Arc<StudentNotifier>,
        policy: Arc<dyn StudentIdVariantPolicy>,
        clock: Arc<dyn Clock>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            requests,
            ledger,
            notifier,
            policy,
            clock,
            config,
        }
    }

    /// Migrate every approved, unmigrated request in the recency window, oldest first.
    ///
    /// Only a failure to read the candidate set aborts the run; per-candidate
    /// problems are itemized in the summary.
    pub fn migrate_approved(&self) -> Result<MigrationSummary, MigrationError> {
        let now = self.clock.now();
        let academic_year = AcademicYear::containing(now);
        let since = now - self.config.lookback;

        let mut candidates = self
            .requests
            .approved_unmigrated_since(since)
            .map_err(MigrationError::FatalBatch)?;
        let candidate_ids: Vec<_> = candidates.iter().map(|request| request.id).collect();
        let referenced = self
            .ledger
            .referenced_requests(&candidate_ids)
            .map_err(MigrationError::FatalBatch)?;
        candidates.retain(|request| !referenced.contains(&request.id));
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        info!(
            candidates = candidates.len(),
            academic_year = %academic_year,
            "starting enrollment migration"
        );
        let mut summary = MigrationSummary::new(academic_year.clone(), candidates.len());
        let mut reserved: HashMap<IdentityTuple, (LedgerEntryId, RequestId)> = HashMap::new();

        for candidate in &candidates {
            let outcome = self
                .screen(candidate, &academic_year, &reserved)
                .and_then(|screening| match screening {
                    Screening::Accepted => self.commit(candidate, &academic_year),
                    Screening::AlreadyMigrated => Ok(Commit::InFlight),
                    Screening::Duplicate(duplicate) => Ok(Commit::Duplicate(duplicate)),
                });

            match outcome {
                Ok(Commit::Inserted(entry)) => {
                    reserved.insert(
                        candidate.identity_for(&academic_year),
                        (entry.ledger_entry_id, entry.request_id),
                    );
                    self.notify_enrolled(candidate, &academic_year, &mut summary);
                    summary.record_migrated(entry);
                }
                Ok(Commit::InFlight) => summary.skipped_in_flight += 1,
                Ok(Commit::Duplicate(duplicate)) => {
                    info!(
                        request_id = %duplicate.request_id,
                        kind = ?duplicate.kind,
                        reason = %duplicate.reason,
                        "duplicate enrollment prevented"
                    );
                    summary.record_duplicate(duplicate);
                }
                Err(err) => {
                    warn!(
                        request_id = %candidate.id,
                        student_id = %candidate.student_id,
                        error = %err,
                        "enrollment migration failed for candidate"
                    );
                    summary.record_error(PerCandidateError {
                        request_id: candidate.id,
                        student_id: candidate.student_id.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        info!(
            migrated = summary.migrated_count,
            duplicates = summary.duplicates_prevented,
            errors = summary.error_count,
            in_flight = summary.skipped_in_flight,
            "enrollment migration finished"
        );
        Ok(summary)
    }

    fn screen(
        &self,
        candidate: &EnrollmentRequest,
        academic_year: &AcademicYear,
        reserved: &HashMap<IdentityTuple, (LedgerEntryId, RequestId)>,
    ) -> Result<Screening, RepositoryError> {
        if self.ledger.find_by_request(candidate.id)?.is_some() {
            return Ok(Screening::AlreadyMigrated);
        }

        let identity = candidate.identity_for(academic_year);
        if let Some((entry, request)) = reserved.get(&identity) {
            return Ok(Screening::Duplicate(DuplicateSkipped {
                request_id: candidate.id,
                kind: DuplicateKind::ActiveEnrollment,
                reason: format!(
                    "request #{request} already enrolled student {} as #{entry} earlier in this run",
                    candidate.student_id
                ),
                existing_entry: Some(*entry),
                existing_request: Some(*request),
                identity,
            }));
        }
        if let Some(existing) = self.ledger.find_active(&identity)? {
            return Ok(Screening::Duplicate(DuplicateSkipped {
                request_id: candidate.id,
                kind: DuplicateKind::ActiveEnrollment,
                reason: format!(
                    "student {} already has active enrollment #{} (from request #{}) for {} {} {} in {}",
                    candidate.student_id,
                    existing.id,
                    existing.enrollment_request_id,
                    identity.program,
                    identity.year_level,
                    identity.semester,
                    identity.academic_year
                ),
                existing_entry: Some(existing.id),
                existing_request: Some(existing.enrollment_request_id),
                identity,
            }));
        }

        if self.policy.applies_to(&candidate.student_id) {
            let offering = Offering::from(&identity);
            let variant = self
                .ledger
                .active_for_offering(&offering)?
                .into_iter()
                .find(|entry| {
                    entry.student_id != candidate.student_id
                        && self.policy.is_variant(&candidate.student_id, &entry.student_id)
                });
            if let Some(existing) = variant {
                return Ok(Screening::Duplicate(DuplicateSkipped {
                    request_id: candidate.id,
                    kind: DuplicateKind::StudentIdVariant,
                    reason: format!(
                        "student id {} matches {} ({} policy), which already has active enrollment #{} for the same term",
                        candidate.student_id,
                        existing.student_id,
                        self.policy.name(),
                        existing.id
                    ),
                    existing_entry: Some(existing.id),
                    existing_request: Some(existing.enrollment_request_id),
                    identity: identity.with_student_id(existing.student_id),
                }));
            }
        }

        Ok(Screening::Accepted)
    }

    fn commit(
        &self,
        candidate: &EnrollmentRequest,
        academic_year: &AcademicYear,
    ) -> Result<Commit, RepositoryError> {
        let claimed = self.requests.transition_migration(
            candidate.id,
            MigrationStatus::NotMigrated,
            MigrationStatus::Migrating,
        )?;
        if !claimed {
            debug!(request_id = %candidate.id, "request claimed elsewhere or no longer approved");
            return Ok(Commit::InFlight);
        }

        if self.ledger.find_by_request(candidate.id)?.is_some() {
            self.set_migration_status(candidate, MigrationStatus::Migrating, MigrationStatus::Migrated);
            return Ok(Commit::InFlight);
        }

        let draft = NewEnrolledStudent::from_request(candidate, academic_year.clone());
        let identity = draft.identity();
        match self.ledger.insert(draft) {
            Ok(entry) => {
                self.set_migration_status(candidate, MigrationStatus::Migrating, MigrationStatus::Migrated);
                info!(
                    request_id = %candidate.id,
                    ledger_entry_id = %entry.id,
                    student_id = %entry.student_id,
                    "enrollment request migrated"
                );
                Ok(Commit::Inserted(MigratedEntry {
                    request_id: candidate.id,
                    ledger_entry_id: entry.id,
                    student_id: entry.student_id,
                }))
            }
            Err(RepositoryError::Conflict(reason)) => {
                self.set_migration_status(candidate, MigrationStatus::Migrating, MigrationStatus::NotMigrated);
                Ok(Commit::Duplicate(DuplicateSkipped {
                    request_id: candidate.id,
                    kind: DuplicateKind::StorageConstraint,
                    identity,
                    existing_entry: None,
                    existing_request: None,
                    reason: format!("ledger rejected the insert: {reason}"),
                }))
            }
            Err(err) => {
                self.set_migration_status(candidate, MigrationStatus::Migrating, MigrationStatus::NotMigrated);
                Err(err)
            }
        }
    }

    fn set_migration_status(
        &self,
        candidate: &EnrollmentRequest,
        from: MigrationStatus,
        to: MigrationStatus,
    ) {
        match self.requests.transition_migration(candidate.id, from, to) {
            Ok(true) => {}
            Ok(false) => warn!(request_id = %candidate.id, ?from, ?to, "migration status changed underneath the engine"),
            Err(err) => warn!(request_id = %candidate.id, ?to, error = %err, "could not record migration status"),
        }
    }

    fn notify_enrolled(
        &self,
        candidate: &EnrollmentRequest,
        academic_year: &AcademicYear,
        summary: &mut MigrationSummary,
    ) {
        let outcome = self.notifier.notify_student(
            &candidate.student_id,
            NotificationStage::Enrolled,
            &candidate.program,
            &candidate.semester_label(Some(academic_year)),
            candidate.id,
        );
        match outcome {
            NotifyOutcome::Sent { .. } => summary.notifications.sent += 1,
            NotifyOutcome::SkippedNoAccount => summary.notifications.skipped += 1,
            NotifyOutcome::Failed { .. } => summary.notifications.failed += 1,
        }
    }
}
