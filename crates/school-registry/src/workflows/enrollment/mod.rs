//! Enrollment request lifecycle: submission, reviewer decisions, fee quotes,
//! and exactly-once migration into the enrolled-student ledger.

pub mod clock;
pub mod curriculum;
pub mod domain;
pub mod fees;
pub mod ledger;
pub mod memory;
pub mod migration;
pub mod money;
pub(crate) mod normalizer;
pub mod notifications;
pub mod receipts;
pub mod repository;
pub mod requests;
pub mod router;
pub mod workflow;

#[cfg(test)]
mod tests;

pub use clock::{Clock, FixedClock, SystemClock};
pub use curriculum::{
    CurriculumCatalog, CurriculumEntry, CurriculumResolution, CurriculumResolver,
    InMemoryCurriculumCatalog,
};
pub use domain::{
    AcademicYear, EnrolledStudent, EnrollmentRequest, IdentityTuple, LedgerEntryId, LedgerStatus,
    MigrationStatus, ProgramCode, ReceiptMetadata, RequestId, RequestStatus, Semester,
    StudentType, SubjectRecord, UserId, YearLevel,
};
pub use fees::{FeeBreakdown, FeeCalculator, FeeSchedule, UnitsSource};
pub use ledger::{LedgerService, LedgerServiceError};
pub use migration::{
    CleanupSummary, DashPrefixPolicy, DuplicateKind, ExactIdPolicy, MigrationConfig,
    MigrationEngine, MigrationError, MigrationSummary, StudentIdVariantPolicy,
};
pub use money::Money;
pub use requests::{EnrollmentRequestService, NewEnrollmentRequest, RequestServiceError};
pub use router::enrollment_router;
pub use workflow::{EnrollmentBackends, EnrollmentWorkflow, InMemoryHandles, WorkflowSettings};
