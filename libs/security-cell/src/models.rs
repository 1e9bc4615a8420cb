// =====================================================================================
// SECURITY CELL MODELS
// =====================================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use shared_models::error::ErrorRecord;

// =====================================================================================
// RATE LIMIT MODELS
// =====================================================================================

/// Named admission budgets. Every route declares which one it draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitProfile {
    Payment,
    Sensitive,
    Notification,
    Read,
    Default,
}

impl RateLimitProfile {
    pub fn name(&self) -> &'static str {
        match self {
            RateLimitProfile::Payment => "payment",
            RateLimitProfile::Sensitive => "sensitive",
            RateLimitProfile::Notification => "notification",
            RateLimitProfile::Read => "read",
            RateLimitProfile::Default => "default",
        }
    }

    pub fn limit(&self) -> u32 {
        match self {
            RateLimitProfile::Payment => 10,
            RateLimitProfile::Sensitive => 5,
            RateLimitProfile::Notification => 20,
            RateLimitProfile::Read => 120,
            RateLimitProfile::Default => 30,
        }
    }

    pub fn window_secs(&self) -> u64 {
        60
    }

    pub fn bucket_key(&self, identity_key: &str) -> String {
        format!("rl:{}:{}", self.name(), identity_key)
    }
}

#[derive(Error, Debug)]
pub enum RateLimitStoreError {
    #[error("Counter store unavailable: {0}")]
    Unavailable(String),

    #[error("Counter store command failed: {0}")]
    Command(#[from] redis::RedisError),
}

// =====================================================================================
// EVENT LOG MODELS
// =====================================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

/// Row written to `event_logs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub function_name: String,
    pub level: EventLevel,
    pub action: String,
    pub identity: Option<String>,
    pub metadata: Value,
}

impl EventLogEntry {
    pub fn new(function_name: impl Into<String>, level: EventLevel, action: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            level,
            action: action.into(),
            identity: None,
            metadata: Value::Null,
        }
    }

    pub fn with_identity(mut self, identity: Option<String>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Entry for an error response: server errors are logged at `error`,
    /// caller errors at `warn`.
    pub fn from_error(function_name: &str, identity: Option<String>, record: &ErrorRecord) -> Self {
        let level = if record.status.is_server_error() {
            EventLevel::Error
        } else {
            EventLevel::Warn
        };

        Self::new(function_name, level, record.code)
            .with_identity(identity)
            .with_metadata(serde_json::json!({
                "status": record.status.as_u16(),
                "message": record.message,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn profiles_have_expected_budgets() {
        assert_eq!(RateLimitProfile::Payment.limit(), 10);
        assert_eq!(RateLimitProfile::Sensitive.limit(), 5);
        assert_eq!(RateLimitProfile::Notification.limit(), 20);
        assert!(RateLimitProfile::Read.limit() > RateLimitProfile::Default.limit());
        assert_eq!(RateLimitProfile::Payment.bucket_key("abc"), "rl:payment:abc");
    }

    #[test]
    fn error_entries_pick_level_from_status() {
        let record = ErrorRecord {
            code: "CONFLICT",
            message: "already bound".to_string(),
            status: StatusCode::CONFLICT,
        };
        let entry = EventLogEntry::from_error("/auth/devices/bind", Some("u1".to_string()), &record);
        assert_eq!(entry.level, EventLevel::Warn);
        assert_eq!(entry.action, "CONFLICT");
        assert_eq!(entry.metadata["status"], 409);

        let record = ErrorRecord {
            code: "INTERNAL_ERROR",
            message: "boom".to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        };
        assert_eq!(EventLogEntry::from_error("/x", None, &record).level, EventLevel::Error);
    }
}
