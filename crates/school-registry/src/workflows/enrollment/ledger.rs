use std::sync::Arc;

use tracing::info;

use super::domain::{EnrolledStudent, LedgerEntryId, LedgerStatus};
use super::migration::{cleanup_duplicates, CleanupSummary};
use super::repository::{LedgerRepository, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum LedgerServiceError {
    #[error("ledger entry {0} not found")]
    NotFound(LedgerEntryId),
    #[error("status '{0}' is not one of active, dropped, graduated")]
    InvalidStatus(String),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for LedgerServiceError {
    fn from(value: RepositoryError) -> Self {
        Self::Repository(value)
    }
}

/// Administrative access to the enrolled-student ledger.
pub struct LedgerService {
    ledger: Arc<dyn LedgerRepository>,
}

impl LedgerService {
    pub fn new(ledger: Arc<dyn LedgerRepository>) -> Self {
        Self { ledger }
    }

    pub fn list(&self, student_id: Option<&str>) -> Result<Vec<EnrolledStudent>, LedgerServiceError> {
        Ok(self.ledger.list(student_id)?)
    }

    pub fn get(&self, id: LedgerEntryId) -> Result<EnrolledStudent, LedgerServiceError> {
        self.ledger
            .fetch(id)?
            .ok_or(LedgerServiceError::NotFound(id))
    }

    /// Drop, graduate, or reactivate a row. Reactivation still honors the
    /// unique active identity constraint.
    pub fn set_status(
        &self,
        id: LedgerEntryId,
        status: &str,
    ) -> Result<EnrolledStudent, LedgerServiceError> {
        let status: LedgerStatus = status
            .parse()
            .map_err(|_| LedgerServiceError::InvalidStatus(status.trim().to_string()))?;
        let row = self.ledger.set_status(id, status).map_err(|err| match err {
            RepositoryError::NotFound => LedgerServiceError::NotFound(id),
            other => LedgerServiceError::Repository(other),
        })?;
        info!(ledger_entry_id = %id, status = status.label(), "ledger entry status changed");
        Ok(row)
    }

    pub fn cleanup_duplicates(&self) -> Result<CleanupSummary, LedgerServiceError> {
        Ok(cleanup_duplicates(self.ledger.as_ref())?)
    }
}
