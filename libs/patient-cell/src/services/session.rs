use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{filter_timestamp, SupabaseClient};

use crate::models::{PatientSession, SessionError, MAX_EXTENSION_HOURS};

pub struct SessionService {
    supabase: SupabaseClient,
}

impl SessionService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get(&self, session_id: Uuid) -> Result<Option<PatientSession>, SessionError> {
        let path = format!("/rest/v1/patient_sessions?session_id=eq.{}", session_id);
        Ok(self.supabase.select_one(&path).await?)
    }

    pub async fn require_active(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<PatientSession, SessionError> {
        let session = self.get(session_id).await?.ok_or(SessionError::NotFound)?;

        if !session.is_live_at(now) {
            debug!("Session {} inactive or expired at {}", session_id, session.expires_at);
            return Err(SessionError::Expired);
        }

        Ok(session)
    }

    /// Pushes the expiry to `now + hours`. Only a session that is still live
    /// can be extended; the filter makes this a single conditional update.
    pub async fn extend(&self, session_id: Uuid, hours: i64, now: DateTime<Utc>) -> Result<PatientSession, SessionError> {
        if !(1..=MAX_EXTENSION_HOURS).contains(&hours) {
            return Err(SessionError::InvalidExtension);
        }

        let path = format!(
            "/rest/v1/patient_sessions?session_id=eq.{}&is_active=eq.true&expires_at=gt.{}",
            session_id,
            filter_timestamp(now)
        );
        let expires_at = now + Duration::hours(hours);

        let rows: Vec<PatientSession> = self
            .supabase
            .update(&path, json!({ "expires_at": expires_at.to_rfc3339() }))
            .await?;

        let session = rows.into_iter().next().ok_or(SessionError::Expired)?;
        info!("Extended session {} until {}", session_id, session.expires_at);
        Ok(session)
    }
}
