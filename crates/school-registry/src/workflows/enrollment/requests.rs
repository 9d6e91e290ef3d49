use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::clock::Clock;
use super::curriculum::{CatalogError, CurriculumResolver};
use super::domain::{
    EnrollmentRequest, MigrationStatus, ProgramCode, ReceiptMetadata, RequestId, RequestStatus,
    Semester, StudentType, SubjectRecord, YearLevel,
};
use super::fees::FeeCalculator;
use super::money::Money;
use super::notifications::{NotificationStage, NotifyOutcome, StudentNotifier};
use super::repository::{RepositoryError, RequestFilter, RequestRepository};

/// Submission payload as received from clients, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEnrollmentRequest {
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub student_type: Option<String>,
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub year_level: String,
    #[serde(default, alias = "term")]
    pub semester: String,
    #[serde(default)]
    pub subjects: Vec<SubjectRecord>,
    #[serde(default)]
    pub total_fees: Option<Money>,
    #[serde(default)]
    pub payment_receipt: Option<ReceiptMetadata>,
}

#[derive(Debug, thiserror::Error)]
pub enum RequestServiceError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("status '{0}' is not one of pending, approved, rejected")]
    InvalidStatus(String),
    #[error("enrollment request {0} not found")]
    NotFound(RequestId),
    #[error("enrollment request {0} is already enrolled and can no longer change status")]
    AlreadyMigrated(RequestId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Updated request plus the notification side effect, if one was attempted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub request: EnrollmentRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotifyOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub id: RequestId,
    pub reason: String,
}

/// Per-id results of a bulk operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub affected: Vec<RequestId>,
    pub not_found: Vec<RequestId>,
    pub failed: Vec<BulkFailure>,
}

/// Enrollment request store: validation, reviewer transitions, and bulk maintenance.
pub struct EnrollmentRequestService {
    requests: Arc<dyn RequestRepository>,
    curriculum: Arc<CurriculumResolver>,
    fees: Arc<FeeCalculator>,
    notifier: Arc<StudentNotifier>,
    clock: Arc<dyn Clock>,
}

impl EnrollmentRequestService {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        curriculum: Arc<CurriculumResolver>,
        fees: Arc<FeeCalculator>,
        notifier: Arc<StudentNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            requests,
            curriculum,
            fees,
            notifier,
            clock,
        }
    }

    /// Validate and persist a submission with status `pending`.
    pub fn create(
        &self,
        submission: NewEnrollmentRequest,
    ) -> Result<EnrollmentRequest, RequestServiceError> {
        let student_id = required("student_id", &submission.student_id)?;
        required("program", &submission.program)?;
        required("year_level", &submission.year_level)?;
        required("semester", &submission.semester)?;

        let program = ProgramCode::parse(&submission.program)
            .map_err(|err| RequestServiceError::Validation(err.to_string()))?;
        let year_level = YearLevel::parse(&submission.year_level)
            .map_err(|err| RequestServiceError::Validation(err.to_string()))?;
        let semester = Semester::parse(&submission.semester)
            .map_err(|err| RequestServiceError::Validation(err.to_string()))?;
        let student_type = match submission.student_type.as_deref().map(str::trim) {
            None | Some("") => StudentType::default(),
            Some(raw) => raw
                .parse::<StudentType>()
                .map_err(|err| RequestServiceError::Validation(err.to_string()))?,
        };

        let payment_receipt = match submission.payment_receipt {
            Some(receipt) if !receipt.reference.0.trim().is_empty() => receipt,
            _ => {
                return Err(RequestServiceError::Validation(
                    "payment receipt is required".to_string(),
                ))
            }
        };

        if let Some(subject) = submission
            .subjects
            .iter()
            .find(|subject| subject.code.trim().is_empty())
        {
            return Err(RequestServiceError::Validation(format!(
                "subject '{}' is missing a code",
                subject.name
            )));
        }

        let subjects = self.enrich(&program, submission.subjects);
        let selected_units = subjects
            .iter()
            .try_fold(0u32, |total, subject| total.checked_add(subject.units))
            .ok_or_else(|| {
                RequestServiceError::Validation(
                    "selected subject units exceed the supported total".to_string(),
                )
            })?;
        let total_fees = match submission.total_fees {
            Some(amount) if amount < Money::ZERO => {
                return Err(RequestServiceError::Validation(
                    "total fees cannot be negative".to_string(),
                ))
            }
            Some(amount) => amount,
            None => {
                let override_units = (selected_units > 0).then_some(selected_units);
                self.fees
                    .calculate_fees(
                        &program,
                        year_level,
                        semester.as_str(),
                        student_type,
                        override_units,
                    )
                    .total
            }
        };

        let now = self.clock.now();
        let request = EnrollmentRequest {
            id: RequestId(0),
            student_id,
            student_type,
            program,
            year_level,
            semester,
            subjects,
            total_fees,
            payment_receipt,
            status: RequestStatus::Pending,
            remarks: None,
            migration_status: MigrationStatus::NotMigrated,
            created_at: now,
            updated_at: now,
        };

        let stored = self.requests.insert(request)?;
        info!(
            request_id = %stored.id,
            student_id = %stored.student_id,
            program = %stored.program,
            "enrollment request submitted"
        );
        Ok(stored)
    }

    pub fn get_by_id(&self, id: RequestId) -> Result<EnrollmentRequest, RequestServiceError> {
        self.requests
            .fetch(id)?
            .ok_or(RequestServiceError::NotFound(id))
    }

    pub fn list_by_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<EnrollmentRequest>, RequestServiceError> {
        let filter = RequestFilter {
            status: None,
            student_id: Some(student_id.trim().to_string()),
        };
        Ok(self.requests.list(&filter)?)
    }

    pub fn list_all(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<EnrollmentRequest>, RequestServiceError> {
        let filter = RequestFilter {
            status,
            student_id: None,
        };
        Ok(self.requests.list(&filter)?)
    }

    /// Record a reviewer decision. Migration is a separate, explicitly triggered step.
    pub fn update_status(
        &self,
        id: RequestId,
        status: &str,
        remarks: Option<String>,
    ) -> Result<StatusUpdate, RequestServiceError> {
        let status = parse_status(status)?;
        self.apply_status(id, status, remarks)
    }

    pub fn delete(&self, id: RequestId) -> Result<(), RequestServiceError> {
        if self.requests.delete(id)? {
            info!(request_id = %id, "enrollment request deleted");
            Ok(())
        } else {
            Err(RequestServiceError::NotFound(id))
        }
    }

    pub fn bulk_update_status(
        &self,
        ids: &[RequestId],
        status: &str,
        remarks: Option<String>,
    ) -> Result<BulkOutcome, RequestServiceError> {
        let status = parse_status(status)?;
        let mut outcome = BulkOutcome::default();

        for id in ids {
            match self.apply_status(*id, status, remarks.clone()) {
                Ok(_) => outcome.affected.push(*id),
                Err(RequestServiceError::NotFound(_)) => outcome.not_found.push(*id),
                Err(err) => outcome.failed.push(BulkFailure {
                    id: *id,
                    reason: err.to_string(),
                }),
            }
        }

        info!(
            status = status.label(),
            updated = outcome.affected.len(),
            not_found = outcome.not_found.len(),
            failed = outcome.failed.len(),
            "bulk status update finished"
        );
        Ok(outcome)
    }

    pub fn bulk_delete(&self, ids: &[RequestId]) -> Result<BulkOutcome, RequestServiceError> {
        let mut outcome = BulkOutcome::default();
        for id in ids {
            match self.requests.delete(*id) {
                Ok(true) => outcome.affected.push(*id),
                Ok(false) => outcome.not_found.push(*id),
                Err(err) => outcome.failed.push(BulkFailure {
                    id: *id,
                    reason: err.to_string(),
                }),
            }
        }
        info!(
            deleted = outcome.affected.len(),
            not_found = outcome.not_found.len(),
            "bulk delete finished"
        );
        Ok(outcome)
    }

    fn apply_status(
        &self,
        id: RequestId,
        status: RequestStatus,
        remarks: Option<String>,
    ) -> Result<StatusUpdate, RequestServiceError> {
        let mut request = self.get_by_id(id)?;
        if request.migration_status != MigrationStatus::NotMigrated && request.status != status {
            return Err(RequestServiceError::AlreadyMigrated(id));
        }

        let previous = request.status;
        request.status = status;
        if let Some(remarks) = remarks {
            let trimmed = remarks.trim();
            request.remarks = (!trimmed.is_empty()).then(|| trimmed.to_string());
        }
        request.updated_at = self.clock.now();
        self.requests.update(request.clone()).map_err(|err| match err {
            RepositoryError::Conflict(_) => RequestServiceError::AlreadyMigrated(id),
            RepositoryError::NotFound => RequestServiceError::NotFound(id),
            other => RequestServiceError::Repository(other),
        })?;

        info!(
            request_id = %id,
            from = previous.label(),
            to = status.label(),
            "enrollment request status updated"
        );

        let stage = match status {
            _ if status == previous => None,
            RequestStatus::Approved => Some(NotificationStage::Approved),
            RequestStatus::Rejected => Some(NotificationStage::Rejected),
            RequestStatus::Pending => None,
        };
        let notification = stage.map(|stage| {
            self.notifier.notify_student(
                &request.student_id,
                stage,
                &request.program,
                &request.semester_label(None),
                request.id,
            )
        });

        Ok(StatusUpdate {
            request,
            notification,
        })
    }

    fn enrich(&self, program: &ProgramCode, subjects: Vec<SubjectRecord>) -> Vec<SubjectRecord> {
        if subjects.is_empty() {
            return subjects;
        }
        match self.curriculum.enrich_subjects(program, subjects.clone()) {
            Ok(enriched) => enriched,
            Err(CatalogError::Unavailable(reason)) => {
                warn!(program = %program, reason = %reason, "curriculum unavailable; keeping submitted subject details");
                subjects
            }
        }
    }
}

fn required(field: &str, value: &str) -> Result<String, RequestServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(RequestServiceError::Validation(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}

fn parse_status(raw: &str) -> Result<RequestStatus, RequestServiceError> {
    raw.parse::<RequestStatus>()
        .map_err(|_| RequestServiceError::InvalidStatus(raw.trim().to_string()))
}
