//! Exactly-once migration of approved requests into the enrolled-student ledger.

mod cleanup;
mod engine;
mod policy;

pub use cleanup::{cleanup_duplicates, CleanupSummary, DuplicateGroup};
pub use engine::{MigrationConfig, MigrationEngine};
pub use policy::{DashPrefixPolicy, ExactIdPolicy, StudentIdVariantPolicy};

use serde::Serialize;

use super::domain::{AcademicYear, IdentityTuple, LedgerEntryId, RequestId};
use super::repository::RepositoryError;

/// Why a candidate was judged a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
    ActiveEnrollment,
    StudentIdVariant,
    StorageConstraint,
}

/// Candidate intentionally left unmigrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateSkipped {
    pub request_id: RequestId,
    pub kind: DuplicateKind,
    pub identity: IdentityTuple,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_entry: Option<LedgerEntryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_request: Option<RequestId>,
    pub reason: String,
}

/// Unexpected failure migrating a single candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerCandidateError {
    pub request_id: RequestId,
    pub student_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigratedEntry {
    pub request_id: RequestId,
    pub ledger_entry_id: LedgerEntryId,
    pub student_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationTally {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Structured result of one migration run; every skip and error is itemized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub academic_year: AcademicYear,
    pub scanned: usize,
    pub migrated_count: usize,
    pub migrated: Vec<MigratedEntry>,
    pub duplicates_prevented: usize,
    pub duplicates: Vec<DuplicateSkipped>,
    pub error_count: usize,
    pub errors: Vec<PerCandidateError>,
    /// Candidates another run claimed or finished first.
    pub skipped_in_flight: usize,
    pub notifications: NotificationTally,
}

impl MigrationSummary {
    fn new(academic_year: AcademicYear, scanned: usize) -> Self {
        Self {
            academic_year,
            scanned,
            migrated_count: 0,
            migrated: Vec::new(),
            duplicates_prevented: 0,
            duplicates: Vec::new(),
            error_count: 0,
            errors: Vec::new(),
            skipped_in_flight: 0,
            notifications: NotificationTally::default(),
        }
    }

    fn record_migrated(&mut self, entry: MigratedEntry) {
        self.migrated_count += 1;
        self.migrated.push(entry);
    }

    fn record_duplicate(&mut self, duplicate: DuplicateSkipped) {
        self.duplicates_prevented += 1;
        self.duplicates.push(duplicate);
    }

    fn record_error(&mut self, error: PerCandidateError) {
        self.error_count += 1;
        self.errors.push(error);
    }

    pub fn headline(&self) -> String {
        format!(
            "migrated {} of {} approved request(s); {} duplicate(s) prevented; {} error(s)",
            self.migrated_count, self.scanned, self.duplicates_prevented, self.error_count
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("could not load approved enrollment requests: {0}")]
    FatalBatch(#[source] RepositoryError),
}
