use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::workflows::enrollment::clock::Clock;
use crate::workflows::enrollment::domain::{ProgramCode, RequestId, UserId};

/// Point in the enrollment lifecycle a notification announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStage {
    Approved,
    Enrolled,
    Rejected,
}

impl NotificationStage {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationStage::Approved => "approved",
            NotificationStage::Enrolled => "enrolled",
            NotificationStage::Rejected => "rejected",
        }
    }

    pub const fn title(self) -> &'static str {
        match self {
            NotificationStage::Approved => "Enrollment Request Approved",
            NotificationStage::Enrolled => "Enrollment Confirmed",
            NotificationStage::Rejected => "Enrollment Request Rejected",
        }
    }

    pub fn message(self, program: &ProgramCode, semester_label: &str) -> String {
        match self {
            NotificationStage::Approved => format!(
                "Your enrollment request for {program} ({semester_label}) was approved and is awaiting final enrollment."
            ),
            NotificationStage::Enrolled => format!(
                "You are now officially enrolled in {program} for {semester_label}."
            ),
            NotificationStage::Rejected => format!(
                "Your enrollment request for {program} ({semester_label}) was not approved. Please contact the registrar."
            ),
        }
    }
}

/// Notification row before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: UserId,
    pub stage: NotificationStage,
    pub title: String,
    pub message: String,
    pub request_id: RequestId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: u64,
    pub user_id: UserId,
    pub stage: NotificationStage,
    pub title: String,
    pub message: String,
    pub request_id: RequestId,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    /// Whether a live connection accepted the push.
    pub delivered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("notification store unavailable: {0}")]
    Store(String),
}

pub trait NotificationStore: Send + Sync {
    fn persist(&self, notification: NewNotification) -> Result<NotificationRecord, NotificationError>;
    fn mark_delivered(&self, id: u64) -> Result<(), NotificationError>;
    fn list_for_user(&self, user_id: UserId) -> Result<Vec<NotificationRecord>, NotificationError>;
}

/// Live channels keyed by user; `send` reports whether a channel accepted the payload.
pub trait ConnectionRegistry: Send + Sync {
    fn send(&self, user_id: UserId, payload: &serde_json::Value) -> bool;
}

/// Consumer-facing contract used by the request store and migration engine.
pub trait EnrollmentNotifier: Send + Sync {
    fn notify_enrollment(
        &self,
        user_id: UserId,
        stage: NotificationStage,
        program: &ProgramCode,
        semester_label: &str,
        request_id: RequestId,
    ) -> Result<NotificationRecord, NotificationError>;
}

/// Persists the notification, then attempts a real-time push.
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    registry: Arc<dyn ConnectionRegistry>,
    clock: Arc<dyn Clock>,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        registry: Arc<dyn ConnectionRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
        }
    }
}

impl EnrollmentNotifier for NotificationDispatcher {
    fn notify_enrollment(
        &self,
        user_id: UserId,
        stage: NotificationStage,
        program: &ProgramCode,
        semester_label: &str,
        request_id: RequestId,
    ) -> Result<NotificationRecord, NotificationError> {
        let mut record = self.store.persist(NewNotification {
            user_id,
            stage,
            title: stage.title().to_string(),
            message: stage.message(program, semester_label),
            request_id,
            created_at: self.clock.now(),
        })?;

        let payload = json!({
            "type": "enrollment",
            "notification": &record,
        });

        if self.registry.send(user_id, &payload) {
            record.delivered = true;
            if let Err(err) = self.store.mark_delivered(record.id) {
                warn!(error = %err, notification_id = record.id, "could not flag notification as delivered");
            }
        } else {
            debug!(%user_id, stage = stage.label(), "no live connection; notification stored only");
        }

        Ok(record)
    }
}
