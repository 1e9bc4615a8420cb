use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;

pub const DEFAULT_EXTENSION_HOURS: i64 = 24;
pub const MAX_EXTENSION_HOURS: i64 = 72;

/// Anonymous patient session. Doctors and portal users are managed by the
/// identity provider, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSession {
    pub session_id: Uuid,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
}

impl PatientSession {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtendSessionRequest {
    pub hours: Option<i64>,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Patient session not found")]
    NotFound,

    #[error("Patient session is no longer active")]
    Expired,

    #[error("Extension must be between 1 and {MAX_EXTENSION_HOURS} hours")]
    InvalidExtension,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound | SessionError::Expired => AppError::Unauthorized(err.to_string()),
            SessionError::InvalidExtension => AppError::Validation(err.to_string()),
            SessionError::Store(e) => e.into(),
        }
    }
}
