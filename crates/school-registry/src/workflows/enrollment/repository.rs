use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::domain::{
    AcademicYear, EnrolledStudent, EnrollmentRequest, IdentityTuple, LedgerEntryId, LedgerStatus,
    MigrationStatus, NewEnrolledStudent, ProgramCode, RequestId, RequestStatus, Semester, YearLevel,
};

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record conflicts with existing data: {0}")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Listing filter for request queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub student_id: Option<String>,
}

/// Storage for submitted enrollment requests.
pub trait RequestRepository: Send + Sync {
    /// Persist a new request; the repository assigns `id`.
    fn insert(&self, request: EnrollmentRequest) -> Result<EnrollmentRequest, RepositoryError>;
    /// Replace a stored request. Fails with `Conflict` when the stored
    /// `migration_status` no longer matches the one on `request`, so a write
    /// based on a stale read cannot undo a migration.
    fn update(&self, request: EnrollmentRequest) -> Result<(), RepositoryError>;
    fn fetch(&self, id: RequestId) -> Result<Option<EnrollmentRequest>, RepositoryError>;
    /// Newest first.
    fn list(&self, filter: &RequestFilter) -> Result<Vec<EnrollmentRequest>, RepositoryError>;
    fn delete(&self, id: RequestId) -> Result<bool, RepositoryError>;
    /// Approved, not yet migrated requests created at or after `since`.
    fn approved_unmigrated_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<EnrollmentRequest>, RepositoryError>;
    /// Atomically move `migration_status` from `from` to `to`; false when the
    /// stored value was not `from`, or when claiming into `Migrating` a request
    /// that is no longer approved.
    fn transition_migration(
        &self,
        id: RequestId,
        from: MigrationStatus,
        to: MigrationStatus,
    ) -> Result<bool, RepositoryError>;
}

/// Enrolled-student ledger. Implementations must reject a second active row for
/// the same identity tuple and a second row for the same request.
pub trait LedgerRepository: Send + Sync {
    fn insert(&self, entry: NewEnrolledStudent) -> Result<EnrolledStudent, RepositoryError>;
    fn fetch(&self, id: LedgerEntryId) -> Result<Option<EnrolledStudent>, RepositoryError>;
    fn find_by_request(
        &self,
        request_id: RequestId,
    ) -> Result<Option<EnrolledStudent>, RepositoryError>;
    fn referenced_requests(
        &self,
        request_ids: &[RequestId],
    ) -> Result<HashSet<RequestId>, RepositoryError>;
    fn find_active(
        &self,
        identity: &IdentityTuple,
    ) -> Result<Option<EnrolledStudent>, RepositoryError>;
    /// Active rows for an offering regardless of student id, oldest first.
    fn active_for_offering(
        &self,
        offering: &Offering,
    ) -> Result<Vec<EnrolledStudent>, RepositoryError>;
    fn active_rows(&self) -> Result<Vec<EnrolledStudent>, RepositoryError>;
    fn list(&self, student_id: Option<&str>) -> Result<Vec<EnrolledStudent>, RepositoryError>;
    fn set_status(
        &self,
        id: LedgerEntryId,
        status: LedgerStatus,
    ) -> Result<EnrolledStudent, RepositoryError>;
    fn remove(&self, ids: &[LedgerEntryId]) -> Result<usize, RepositoryError>;
}

/// Program/year/semester/academic-year slice of an identity tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Offering {
    pub program: ProgramCode,
    pub year_level: YearLevel,
    pub semester: Semester,
    pub academic_year: AcademicYear,
}

impl From<&IdentityTuple> for Offering {
    fn from(identity: &IdentityTuple) -> Self {
        Self {
            program: identity.program.clone(),
            year_level: identity.year_level,
            semester: identity.semester.clone(),
            academic_year: identity.academic_year.clone(),
        }
    }
}

impl Offering {
    pub fn contains(&self, entry: &EnrolledStudent) -> bool {
        entry.program == self.program
            && entry.year_level == self.year_level
            && entry.semester == self.semester
            && entry.academic_year == self.academic_year
    }
}
