//! In-process adapters for the repository traits, used by the API binary and tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::domain::{
    EnrolledStudent, EnrollmentRequest, IdentityTuple, LedgerEntryId, LedgerStatus,
    MigrationStatus, NewEnrolledStudent, RequestId, RequestStatus, UserId,
};
use super::notifications::{
    ConnectionRegistry, IdentityError, NewNotification, NotificationError, NotificationRecord,
    NotificationStore, StudentProfile, UserDirectory,
};
use super::receipts::{ReceiptError, ReceiptStorage};
use super::repository::{
    LedgerRepository, Offering, RepositoryError, RequestFilter, RequestRepository,
};

#[derive(Debug, Default)]
struct RequestState {
    next_id: u64,
    records: BTreeMap<RequestId, EnrollmentRequest>,
}

#[derive(Debug, Default)]
pub struct InMemoryRequestRepository {
    state: Mutex<RequestState>,
}

impl InMemoryRequestRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, RequestState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("request store lock poisoned".to_string()))
    }
}

impl RequestRepository for InMemoryRequestRepository {
    fn insert(&self, mut request: EnrollmentRequest) -> Result<EnrollmentRequest, RepositoryError> {
        let mut guard = self.lock()?;
        guard.next_id += 1;
        request.id = RequestId(guard.next_id);
        guard.records.insert(request.id, request.clone());
        Ok(request)
    }

    fn update(&self, request: EnrollmentRequest) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        let slot = guard.records.get_mut(&request.id).ok_or(RepositoryError::NotFound)?;
        if slot.migration_status != request.migration_status {
            return Err(RepositoryError::Conflict(format!(
                "request {} migration status changed to {:?}",
                request.id, slot.migration_status
            )));
        }
        *slot = request;
        Ok(())
    }

    fn fetch(&self, id: RequestId) -> Result<Option<EnrollmentRequest>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.records.get(&id).cloned())
    }

    fn list(&self, filter: &RequestFilter) -> Result<Vec<EnrollmentRequest>, RepositoryError> {
        let guard = self.lock()?;
        let mut records: Vec<EnrollmentRequest> = guard
            .records
            .values()
            .filter(|record| filter.status.map_or(true, |status| record.status == status))
            .filter(|record| {
                filter
                    .student_id
                    .as_deref()
                    .map_or(true, |student_id| record.student_id == student_id.trim())
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    fn delete(&self, id: RequestId) -> Result<bool, RepositoryError> {
        let mut guard = self.lock()?;
        Ok(guard.records.remove(&id).is_some())
    }

    fn approved_unmigrated_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<EnrollmentRequest>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .records
            .values()
            .filter(|record| record.status == RequestStatus::Approved)
            .filter(|record| record.migration_status == MigrationStatus::NotMigrated)
            .filter(|record| record.created_at >= since)
            .cloned()
            .collect())
    }

    fn transition_migration(
        &self,
        id: RequestId,
        from: MigrationStatus,
        to: MigrationStatus,
    ) -> Result<bool, RepositoryError> {
        let mut guard = self.lock()?;
        let record = guard.records.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if record.migration_status != from {
            return Ok(false);
        }
        if to == MigrationStatus::Migrating && record.status != RequestStatus::Approved {
            return Ok(false);
        }
        record.migration_status = to;
        Ok(true)
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    next_id: u64,
    rows: BTreeMap<LedgerEntryId, EnrolledStudent>,
}

impl LedgerState {
    fn active_matching(&self, identity: &IdentityTuple) -> Option<&EnrolledStudent> {
        self.rows
            .values()
            .find(|row| row.status == LedgerStatus::Active && row.identity() == *identity)
    }
}

/// Ledger table with a unique index on request id and on the active identity tuple.
#[derive(Debug)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    enforce_unique_active: bool,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            enforce_unique_active: true,
        }
    }
}

impl InMemoryLedger {
    /// A ledger lacking the active-tuple index, mirroring tables created before it existed.
    pub fn without_unique_active_index() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            enforce_unique_active: false,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LedgerState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("ledger lock poisoned".to_string()))
    }
}

impl LedgerRepository for InMemoryLedger {
    fn insert(&self, entry: NewEnrolledStudent) -> Result<EnrolledStudent, RepositoryError> {
        let mut guard = self.lock()?;

        if guard
            .rows
            .values()
            .any(|row| row.enrollment_request_id == entry.enrollment_request_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "request {} is already in the ledger",
                entry.enrollment_request_id
            )));
        }

        if self.enforce_unique_active {
            if let Some(existing) = guard.active_matching(&entry.identity()) {
                return Err(RepositoryError::Conflict(format!(
                    "active enrollment {} already holds {}",
                    existing.id,
                    entry.identity()
                )));
            }
        }

        guard.next_id += 1;
        let row = EnrolledStudent {
            id: LedgerEntryId(guard.next_id),
            enrollment_request_id: entry.enrollment_request_id,
            student_id: entry.student_id,
            student_type: entry.student_type,
            program: entry.program,
            year_level: entry.year_level,
            semester: entry.semester,
            subjects: entry.subjects,
            total_fees: entry.total_fees,
            enrollment_date: entry.enrollment_date,
            academic_year: entry.academic_year,
            status: LedgerStatus::Active,
        };
        guard.rows.insert(row.id, row.clone());
        Ok(row)
    }

    fn fetch(&self, id: LedgerEntryId) -> Result<Option<EnrolledStudent>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.rows.get(&id).cloned())
    }

    fn find_by_request(
        &self,
        request_id: RequestId,
    ) -> Result<Option<EnrolledStudent>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .rows
            .values()
            .find(|row| row.enrollment_request_id == request_id)
            .cloned())
    }

    fn referenced_requests(
        &self,
        request_ids: &[RequestId],
    ) -> Result<HashSet<RequestId>, RepositoryError> {
        let wanted: HashSet<RequestId> = request_ids.iter().copied().collect();
        let guard = self.lock()?;
        Ok(guard
            .rows
            .values()
            .map(|row| row.enrollment_request_id)
            .filter(|id| wanted.contains(id))
            .collect())
    }

    fn find_active(
        &self,
        identity: &IdentityTuple,
    ) -> Result<Option<EnrolledStudent>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.active_matching(identity).cloned())
    }

    fn active_for_offering(
        &self,
        offering: &Offering,
    ) -> Result<Vec<EnrolledStudent>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .rows
            .values()
            .filter(|row| row.status == LedgerStatus::Active && offering.contains(row))
            .cloned()
            .collect())
    }

    fn active_rows(&self) -> Result<Vec<EnrolledStudent>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .rows
            .values()
            .filter(|row| row.status == LedgerStatus::Active)
            .cloned()
            .collect())
    }

    fn list(&self, student_id: Option<&str>) -> Result<Vec<EnrolledStudent>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .rows
            .values()
            .filter(|row| student_id.map_or(true, |wanted| row.student_id == wanted.trim()))
            .cloned()
            .collect())
    }

    fn set_status(
        &self,
        id: LedgerEntryId,
        status: LedgerStatus,
    ) -> Result<EnrolledStudent, RepositoryError> {
        let mut guard = self.lock()?;
        let identity = guard
            .rows
            .get(&id)
            .map(EnrolledStudent::identity)
            .ok_or(RepositoryError::NotFound)?;

        if status == LedgerStatus::Active && self.enforce_unique_active {
            if let Some(existing) = guard.active_matching(&identity) {
                if existing.id != id {
                    return Err(RepositoryError::Conflict(format!(
                        "active enrollment {} already holds {}",
                        existing.id, identity
                    )));
                }
            }
        }

        let row = guard.rows.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        row.status = status;
        Ok(row.clone())
    }

    fn remove(&self, ids: &[LedgerEntryId]) -> Result<usize, RepositoryError> {
        let mut guard = self.lock()?;
        let mut removed = 0;
        for id in ids {
            if guard.rows.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    users: BTreeMap<UserId, String>,
    profiles: Vec<StudentProfile>,
}

/// Accounts and student profiles held in memory.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    state: Mutex<DirectoryState>,
}

impl InMemoryUserDirectory {
    pub fn add_user(&self, id: UserId, email: &str) {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.users.insert(id, email.trim().to_string());
    }

    pub fn add_profile(&self, profile: StudentProfile) {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.profiles.push(profile);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, DirectoryState>, IdentityError> {
        self.state
            .lock()
            .map_err(|_| IdentityError::Unavailable("directory lock poisoned".to_string()))
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn user_exists(&self, id: UserId) -> Result<bool, IdentityError> {
        Ok(self.lock()?.users.contains_key(&id))
    }

    fn find_student_profile(&self, key: &str) -> Result<Option<StudentProfile>, IdentityError> {
        let guard = self.lock()?;
        let key = key.trim();
        let by_number = guard
            .profiles
            .iter()
            .find(|profile| profile.student_number == key);
        let by_id = || {
            key.parse::<u64>().ok().and_then(|id| {
                guard
                    .profiles
                    .iter()
                    .find(|profile| profile.profile_id == id)
            })
        };
        Ok(by_number.or_else(by_id).cloned())
    }

    fn user_id_for_email(&self, email: &str) -> Result<Option<UserId>, IdentityError> {
        let guard = self.lock()?;
        Ok(guard
            .users
            .iter()
            .find(|(_, stored)| stored.eq_ignore_ascii_case(email.trim()))
            .map(|(id, _)| *id))
    }
}

#[derive(Debug, Default)]
struct NotificationState {
    next_id: u64,
    records: Vec<NotificationRecord>,
}

#[derive(Debug, Default)]
pub struct InMemoryNotificationStore {
    state: Mutex<NotificationState>,
}

impl InMemoryNotificationStore {
    pub fn all(&self) -> Vec<NotificationRecord> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .records
            .clone()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, NotificationState>, NotificationError> {
        self.state
            .lock()
            .map_err(|_| NotificationError::Store("notification lock poisoned".to_string()))
    }
}

impl NotificationStore for InMemoryNotificationStore {
    fn persist(&self, notification: NewNotification) -> Result<NotificationRecord, NotificationError> {
        let mut guard = self.lock()?;
        guard.next_id += 1;
        let record = NotificationRecord {
            id: guard.next_id,
            user_id: notification.user_id,
            stage: notification.stage,
            title: notification.title,
            message: notification.message,
            request_id: notification.request_id,
            created_at: notification.created_at,
            read: false,
            delivered: false,
        };
        guard.records.push(record.clone());
        Ok(record)
    }

    fn mark_delivered(&self, id: u64) -> Result<(), NotificationError> {
        let mut guard = self.lock()?;
        if let Some(record) = guard.records.iter_mut().find(|record| record.id == id) {
            record.delivered = true;
        }
        Ok(())
    }

    fn list_for_user(&self, user_id: UserId) -> Result<Vec<NotificationRecord>, NotificationError> {
        let guard = self.lock()?;
        Ok(guard
            .records
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// Connection registry that records pushes to users marked as connected.
#[derive(Debug, Default)]
pub struct InMemoryConnectionRegistry {
    connected: Mutex<HashSet<UserId>>,
    sent: Mutex<Vec<(UserId, serde_json::Value)>>,
}

impl InMemoryConnectionRegistry {
    pub fn connect(&self, user_id: UserId) {
        self.connected
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(user_id);
    }

    pub fn disconnect(&self, user_id: UserId) {
        self.connected
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&user_id);
    }

    pub fn sent(&self) -> Vec<(UserId, serde_json::Value)> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ConnectionRegistry for InMemoryConnectionRegistry {
    fn send(&self, user_id: UserId, payload: &serde_json::Value) -> bool {
        let Ok(connected) = self.connected.lock() else {
            return false;
        };
        if !connected.contains(&user_id) {
            return false;
        }
        match self.sent.lock() {
            Ok(mut sent) => {
                sent.push((user_id, payload.clone()));
                true
            }
            Err(_) => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryReceiptStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryReceiptStorage {
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_empty()
    }
}

impl ReceiptStorage for InMemoryReceiptStorage {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ReceiptError> {
        let mut guard = self
            .objects
            .lock()
            .map_err(|_| ReceiptError::Storage("receipt lock poisoned".to_string()))?;
        guard.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::enrollment::domain::{
        AcademicYear, ProgramCode, Semester, StudentType, YearLevel,
    };
    use crate::workflows::enrollment::money::Money;
    use chrono::TimeZone;

    fn draft(request_id: u64, student_id: &str) -> NewEnrolledStudent {
        NewEnrolledStudent {
            enrollment_request_id: RequestId(request_id),
            student_id: student_id.to_string(),
            student_type: StudentType::Regular,
            program: ProgramCode::parse("BSIT").unwrap(),
            year_level: YearLevel::First,
            semester: Semester::parse("1st Term").unwrap(),
            subjects: Vec::new(),
            total_fees: Money::from_major(9_000),
            enrollment_date: Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap(),
            academic_year: AcademicYear::starting_in(2025),
        }
    }

    #[test]
    fn ledger_rejects_second_active_row_for_identity() {
        let ledger = InMemoryLedger::default();
        ledger.insert(draft(1, "2021-0001")).expect("first insert");

        match ledger.insert(draft(2, "2021-0001")) {
            Err(RepositoryError::Conflict(message)) => assert!(message.contains("active")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn ledger_rejects_second_row_for_request() {
        let ledger = InMemoryLedger::without_unique_active_index();
        ledger.insert(draft(1, "2021-0001")).expect("first insert");
        assert!(matches!(
            ledger.insert(draft(1, "2021-0002")),
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[test]
    fn dropped_rows_free_the_identity() {
        let ledger = InMemoryLedger::default();
        let first = ledger.insert(draft(1, "2021-0001")).expect("first insert");
        ledger
            .set_status(first.id, LedgerStatus::Dropped)
            .expect("drop succeeds");
        ledger
            .insert(draft(2, "2021-0001"))
            .expect("identity is free again");

        assert!(matches!(
            ledger.set_status(first.id, LedgerStatus::Active),
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[test]
    fn migration_transition_is_conditional() {
        let repository = InMemoryRequestRepository::default();
        assert!(matches!(
            repository.transition_migration(
                RequestId(9),
                MigrationStatus::NotMigrated,
                MigrationStatus::Migrating
            ),
            Err(RepositoryError::NotFound)
        ));
    }
}
