// =====================================================================================
// NOTIFICATION MODELS
// =====================================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;
use shared_models::ServiceType;

/// Who a notification is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTarget {
    /// Doctor or portal user.
    User(Uuid),
    /// Anonymous patient session.
    Session(Uuid),
    /// Every verified, available doctor serving the tier.
    Doctors(ServiceType),
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub target: NotificationTarget,
    pub title: String,
    pub body: String,
    pub kind: String,
    pub metadata: Value,
}

impl Notification {
    pub fn new(target: NotificationTarget, title: &str, body: impl Into<String>, kind: &str) -> Self {
        Self {
            target,
            title: title.to_string(),
            body: body.into(),
            kind: kind.to_string(),
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Resolved single recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    User(Uuid),
    Session(Uuid),
}

impl Recipient {
    pub fn column(&self) -> &'static str {
        match self {
            Recipient::User(_) => "recipient_user_id",
            Recipient::Session(_) => "recipient_session_id",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Recipient::User(id) | Recipient::Session(id) => *id,
        }
    }
}

/// Persisted in-app notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub recipient_user_id: Option<Uuid>,
    pub recipient_session_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub notification_type: String,
    #[serde(default)]
    pub metadata: Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushTokenRow {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PushMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    pub data: Value,
    pub sound: &'static str,
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Push provider rejected request: {0}")]
    Provider(String),

    #[error("Push request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Store error: {0}")]
    Store(#[from] shared_database::StoreError),

    #[error("{failed} of {attempted} in-app records were not written")]
    Undelivered { attempted: usize, failed: usize },

    #[error("Delivery timed out")]
    TimedOut,

    #[error("Notification not found")]
    NotFound,
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::NotFound => AppError::NotFound("Notification not found".to_string()),
            NotificationError::Store(e) => e.into(),
            other => AppError::Upstream(other.to_string()),
        }
    }
}
