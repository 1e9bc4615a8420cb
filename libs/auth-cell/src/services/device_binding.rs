// =====================================================================================
// DEVICE BINDING GUARD - ONE DEVICE PER DOCTOR, ONE DOCTOR PER DEVICE
// =====================================================================================

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{StoreError, SupabaseClient};
use shared_models::auth::Identity;

use crate::models::{DeviceBinding, DeviceBindingError, DeviceCheck, MAX_FINGERPRINT_LEN};

const TABLE: &str = "doctor_devices";
const DOCTOR_CONSTRAINT: &str = "doctor_devices_pkey";

/// Names the constraint a concurrent bind tripped over. The 23505 body
/// carries the constraint name and the offending key.
fn lost_race(conflict: &str) -> DeviceBindingError {
    if conflict.contains(DOCTOR_CONSTRAINT) || conflict.contains("Key (doctor_id)") {
        DeviceBindingError::DoctorAlreadyBound
    } else {
        DeviceBindingError::FingerprintTaken
    }
}

pub struct DeviceBindingService {
    supabase: SupabaseClient,
}

impl DeviceBindingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn binding_for_doctor(&self, doctor_id: Uuid) -> Result<Option<DeviceBinding>, DeviceBindingError> {
        let path = format!("/rest/v1/{}?doctor_id=eq.{}&is_active=eq.true", TABLE, doctor_id);
        Ok(self.supabase.select_one(&path).await?)
    }

    async fn binding_for_fingerprint(&self, fingerprint: &str) -> Result<Option<DeviceBinding>, DeviceBindingError> {
        let path = format!(
            "/rest/v1/{}?device_fingerprint=eq.{}&is_active=eq.true",
            TABLE,
            urlencoding::encode(fingerprint)
        );
        Ok(self.supabase.select_one(&path).await?)
    }

    /// Binds the caller's own device. Unique constraints on `doctor_id` and
    /// `device_fingerprint` are the real guard; the lookups only produce a
    /// clearer error and make re-binding the same device idempotent.
    #[instrument(skip(self, identity, fingerprint))]
    pub async fn bind(
        &self,
        identity: &Identity,
        doctor_id: Uuid,
        fingerprint: &str,
    ) -> Result<DeviceBinding, DeviceBindingError> {
        if !identity.is_doctor(doctor_id) {
            return Err(DeviceBindingError::NotOwner);
        }

        let fingerprint = fingerprint.trim();
        if fingerprint.is_empty() || fingerprint.len() > MAX_FINGERPRINT_LEN {
            return Err(DeviceBindingError::InvalidFingerprint);
        }

        if let Some(existing) = self.binding_for_fingerprint(fingerprint).await? {
            if existing.doctor_id != doctor_id {
                warn!("Fingerprint already bound to a different doctor");
                return Err(DeviceBindingError::FingerprintTaken);
            }
            debug!("Device already bound to doctor {}", doctor_id);
            return Ok(existing);
        }

        if self.binding_for_doctor(doctor_id).await?.is_some() {
            return Err(DeviceBindingError::DoctorAlreadyBound);
        }

        let binding: DeviceBinding = self
            .supabase
            .insert(
                TABLE,
                json!({
                    "doctor_id": doctor_id,
                    "device_fingerprint": fingerprint,
                    "bound_at": Utc::now().to_rfc3339(),
                    "is_active": true,
                }),
            )
            .await
            .map_err(|e| match e {
                StoreError::Conflict(body) => lost_race(&body),
                other => DeviceBindingError::Store(other),
            })?;

        info!("Bound device for doctor {}", doctor_id);
        Ok(binding)
    }

    pub async fn check(&self, doctor_id: Uuid, fingerprint: &str) -> Result<DeviceCheck, DeviceBindingError> {
        let check = match self.binding_for_doctor(doctor_id).await? {
            None => DeviceCheck { bound: false, matches: false },
            Some(binding) => DeviceCheck {
                bound: true,
                matches: binding.device_fingerprint == fingerprint.trim(),
            },
        };
        Ok(check)
    }

    /// Admin override for lost devices.
    #[instrument(skip(self, identity))]
    pub async fn deauthorize(&self, identity: &Identity, doctor_id: Uuid) -> Result<usize, DeviceBindingError> {
        if !identity.is_admin() {
            return Err(DeviceBindingError::NotAdmin);
        }

        let removed = self
            .supabase
            .delete(&format!("/rest/v1/{}?doctor_id=eq.{}", TABLE, doctor_id))
            .await?;

        info!("Deauthorized {} device binding(s) for doctor {}", removed, doctor_id);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_attributed_to_the_violated_constraint() {
        let doctor = r#"{"code":"23505","details":"Key (doctor_id)=(7c9e...) already exists.","message":"duplicate key value violates unique constraint \"doctor_devices_pkey\""}"#;
        let fingerprint = r#"{"code":"23505","details":"Key (device_fingerprint)=(phone-a) already exists.","message":"duplicate key value violates unique constraint \"doctor_devices_device_fingerprint_key\""}"#;

        assert!(matches!(lost_race(doctor), DeviceBindingError::DoctorAlreadyBound));
        assert!(matches!(lost_race(fingerprint), DeviceBindingError::FingerprintTaken));
    }
}
