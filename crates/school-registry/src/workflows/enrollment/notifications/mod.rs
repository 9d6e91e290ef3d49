//! Lifecycle notifications: identity resolution, persistence, and best-effort push.

mod dispatcher;
mod identity;

pub use dispatcher::{
    ConnectionRegistry, EnrollmentNotifier, NewNotification, NotificationDispatcher,
    NotificationError, NotificationRecord, NotificationStage, NotificationStore,
};
pub use identity::{
    DirectoryIdentityResolver, IdentityError, IdentityResolver, StudentProfile, UserDirectory,
};

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::domain::{ProgramCode, RequestId, UserId};

/// Result of trying to notify a student; never an error for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotifyOutcome {
    Sent { user_id: UserId, notification_id: u64 },
    SkippedNoAccount,
    Failed { reason: String },
}

/// Pairs identity resolution with the dispatcher and swallows every failure.
pub struct StudentNotifier {
    identities: Arc<dyn IdentityResolver>,
    notifier: Arc<dyn EnrollmentNotifier>,
}

impl StudentNotifier {
    pub fn new(identities: Arc<dyn IdentityResolver>, notifier: Arc<dyn EnrollmentNotifier>) -> Self {
        Self {
            identities,
            notifier,
        }
    }

    pub fn notify_student(
        &self,
        student_id: &str,
        stage: NotificationStage,
        program: &ProgramCode,
        semester_label: &str,
        request_id: RequestId,
    ) -> NotifyOutcome {
        let user_id = match self.identities.resolve_notifiable_user_id(student_id) {
            Ok(Some(user_id)) => user_id,
            Ok(None) => {
                info!(
                    student_id,
                    %request_id,
                    stage = stage.label(),
                    "no account linked to student; notification skipped"
                );
                return NotifyOutcome::SkippedNoAccount;
            }
            Err(err) => {
                warn!(student_id, %request_id, error = %err, "identity resolution failed");
                return NotifyOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };

        match self
            .notifier
            .notify_enrollment(user_id, stage, program, semester_label, request_id)
        {
            Ok(record) => NotifyOutcome::Sent {
                user_id,
                notification_id: record.id,
            },
            Err(err) => {
                warn!(%user_id, %request_id, error = %err, "notification dispatch failed");
                NotifyOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }
}
