use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use notification_cell::{Notification, NotificationTarget, Notifier};
use shared_config::AppConfig;
use shared_database::{filter_timestamp, SupabaseClient};
use shared_models::ServiceType;

use crate::models::{Doctor, DoctorError};

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, DoctorError> {
        debug!("Fetching doctor {}", doctor_id);
        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        Ok(self.supabase.select_one(&path).await?)
    }

    /// Loads the doctor and checks it may take a consultation of `service_type`.
    pub async fn verify_can_serve(&self, doctor_id: Uuid, service_type: ServiceType) -> Result<Doctor, DoctorError> {
        let doctor = self.get_doctor(doctor_id).await?.ok_or(DoctorError::NotFound)?;

        if !doctor.is_verified {
            return Err(DoctorError::NotVerified);
        }
        if doctor.is_suspended {
            return Err(DoctorError::Suspended);
        }
        if !doctor.serves(service_type) {
            return Err(DoctorError::DoesNotServe(service_type));
        }

        Ok(doctor)
    }

    /// Reinstates every doctor whose suspension has run out, in one
    /// conditional update, and tells each of them.
    #[instrument(skip(self, notifier))]
    pub async fn lift_expired_suspensions(
        &self,
        now: DateTime<Utc>,
        notifier: &dyn Notifier,
    ) -> Result<Vec<Doctor>, DoctorError> {
        let path = format!(
            "/rest/v1/doctors?is_suspended=eq.true&suspended_until=lt.{}",
            filter_timestamp(now)
        );
        let lifted: Vec<Doctor> = self
            .supabase
            .update(
                &path,
                json!({
                    "is_suspended": false,
                    "suspended_until": null,
                    "updated_at": now.to_rfc3339(),
                }),
            )
            .await?;

        for doctor in &lifted {
            notifier
                .notify(
                    Notification::new(
                        NotificationTarget::User(doctor.id),
                        "Account Reinstated",
                        "Your suspension has ended. You can accept consultations again.",
                        "account",
                    )
                    .with_metadata(json!({ "doctor_id": doctor.id })),
                )
                .await;
        }

        info!("Lifted {} expired suspensions", lifted.len());
        Ok(lifted)
    }
}
