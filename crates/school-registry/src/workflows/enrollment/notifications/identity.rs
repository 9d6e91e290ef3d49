use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::workflows::enrollment::domain::UserId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
}

/// Maps a student identifier to the account that should receive notifications.
pub trait IdentityResolver: Send + Sync {
    fn resolve_notifiable_user_id(&self, student_id: &str) -> Result<Option<UserId>, IdentityError>;
}

/// Student profile as kept by the profile management subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub profile_id: u64,
    pub student_number: String,
    pub email: Option<String>,
}

/// Read access to user accounts and student profiles.
pub trait UserDirectory: Send + Sync {
    fn user_exists(&self, id: UserId) -> Result<bool, IdentityError>;
    /// Profile whose student number or profile id equals `key`.
    fn find_student_profile(&self, key: &str) -> Result<Option<StudentProfile>, IdentityError>;
    fn user_id_for_email(&self, email: &str) -> Result<Option<UserId>, IdentityError>;
}

/// Resolves through the directory: numeric user id first, then profile email.
pub struct DirectoryIdentityResolver {
    directory: Arc<dyn UserDirectory>,
}

impl DirectoryIdentityResolver {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }
}

impl IdentityResolver for DirectoryIdentityResolver {
    fn resolve_notifiable_user_id(&self, student_id: &str) -> Result<Option<UserId>, IdentityError> {
        let student_id = student_id.trim();
        if student_id.is_empty() {
            return Ok(None);
        }

        if let Ok(numeric) = student_id.parse::<u64>() {
            let candidate = UserId(numeric);
            if self.directory.user_exists(candidate)? {
                return Ok(Some(candidate));
            }
        }

        let Some(profile) = self.directory.find_student_profile(student_id)? else {
            return Ok(None);
        };
        match profile.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => self.directory.user_id_for_email(email),
            _ => Ok(None),
        }
    }
}
