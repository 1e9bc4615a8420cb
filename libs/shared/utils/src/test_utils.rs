use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Identity, Role};

pub const TEST_JWT_SECRET: &str = "test-secret-key-for-jwt-validation-must-be-long-enough";
pub const TEST_CRON_SECRET: &str = "test-cron-secret";

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub service_role_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: TEST_JWT_SECRET.to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            service_role_key: "test-service-role-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_role_key: self.service_role_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            redis_url: None,
            cron_secret: TEST_CRON_SECRET.to_string(),
            mpesa_base_url: "http://localhost:9999".to_string(),
            mpesa_consumer_key: "test-consumer-key".to_string(),
            mpesa_consumer_secret: "test-consumer-secret".to_string(),
            mpesa_shortcode: "174379".to_string(),
            mpesa_passkey: "test-passkey".to_string(),
            mpesa_callback_url: "https://api.test/payments/mpesa/callback".to_string(),
            push_api_url: "http://localhost:9998/push".to_string(),
            push_access_token: None,
            video_app_id: "test-video-app".to_string(),
            video_app_secret: "test-video-secret".to_string(),
            video_domain: "video.test".to_string(),
            http_timeout_secs: 5,
            service_access_hours: 24,
            payment_reconcile_after_minutes: 10,
            bind_addr: "127.0.0.1:0".to_string(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestIdentity {
    pub role: String,
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
}

impl TestIdentity {
    pub fn patient() -> Self {
        Self {
            role: "patient".to_string(),
            user_id: None,
            session_id: Some(Uuid::new_v4()),
        }
    }

    pub fn doctor() -> Self {
        Self::with_role("doctor")
    }

    pub fn admin() -> Self {
        Self::with_role("admin")
    }

    pub fn with_role(role: &str) -> Self {
        Self {
            role: role.to_string(),
            user_id: Some(Uuid::new_v4()),
            session_id: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.session_id.or(self.user_id).unwrap_or_else(Uuid::nil)
    }

    pub fn to_identity(&self) -> Identity {
        let role = Role::parse(&self.role).expect("test identity has a known role");
        Identity::from_parts(role, self.user_id, self.session_id).expect("test identity is complete")
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(identity: &TestIdentity, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let mut payload = json!({
            "role": "authenticated",
            "app_metadata": { "role": identity.role },
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });
        if let Some(user_id) = identity.user_id {
            payload["sub"] = json!(user_id.to_string());
        }
        if let Some(session_id) = identity.session_id {
            payload["session_id"] = json!(session_id.to_string());
        }

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn bearer(identity: &TestIdentity) -> String {
        format!("Bearer {}", Self::create_test_token(identity, TEST_JWT_SECRET, Some(1)))
    }

    pub fn create_expired_token(identity: &TestIdentity, secret: &str) -> String {
        Self::create_test_token(identity, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(identity: &TestIdentity) -> String {
        Self::create_test_token(identity, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Row shapes as PostgREST returns them.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn patient_session(session_id: Uuid, expires_at: DateTime<Utc>) -> Value {
        json!({
            "session_id": session_id,
            "is_active": true,
            "expires_at": expires_at.to_rfc3339(),
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn doctor(doctor_id: Uuid, service_types: &[&str]) -> Value {
        json!({
            "id": doctor_id,
            "full_name": "Dr. Test",
            "is_verified": true,
            "is_available": true,
            "service_types": service_types,
            "is_suspended": false,
            "suspended_until": null
        })
    }

    pub fn consultation(
        consultation_id: Uuid,
        session_id: Uuid,
        doctor_id: Option<Uuid>,
        service_type: &str,
        consultation_type: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": consultation_id,
            "patient_session_id": session_id,
            "doctor_id": doctor_id,
            "service_type": service_type,
            "consultation_type": consultation_type,
            "status": status,
            "chief_complaint": "Persistent headache for three days",
            "remaining_call_minutes": 0,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn appointment(
        appointment_id: Uuid,
        doctor_id: Uuid,
        session_id: Uuid,
        scheduled_at: DateTime<Utc>,
        status: &str,
        reminders_sent: &[&str],
    ) -> Value {
        json!({
            "id": appointment_id,
            "doctor_id": doctor_id,
            "patient_session_id": session_id,
            "consultation_id": null,
            "scheduled_at": scheduled_at.to_rfc3339(),
            "grace_period_minutes": 15,
            "status": status,
            "reminders_sent": reminders_sent,
            "superseded_by": null,
            "reschedule_reason": null,
            "notes": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn service_access_payment(
        payment_id: Uuid,
        session_id: Uuid,
        checkout_request_id: Option<&str>,
        status: &str,
    ) -> Value {
        json!({
            "id": payment_id,
            "payment_type": "service_access",
            "patient_session_id": session_id,
            "consultation_id": null,
            "service_type": "nurse",
            "package_id": null,
            "additional_minutes": null,
            "amount": 500,
            "phone_number": "254712345678",
            "status": status,
            "idempotency_key": "abc12345",
            "mpesa_checkout_request_id": checkout_request_id,
            "transaction_id": null,
            "failure_reason": null,
            "grant_applied": false,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn service_access_grant(session_id: Uuid, service_type: &str, expires_at: DateTime<Utc>) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "payment_id": Uuid::new_v4(),
            "patient_session_id": session_id,
            "service_type": service_type,
            "amount": 500,
            "expires_at": expires_at.to_rfc3339(),
            "access_granted": true,
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "message": message,
            "code": code,
            "details": null,
            "hint": null
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert!(app_config.is_configured());
        assert!(app_config.is_mpesa_configured());
    }

    #[test]
    fn test_identity_creation() {
        let patient = TestIdentity::patient();
        assert!(patient.session_id.is_some());
        assert!(matches!(patient.to_identity(), Identity::Patient { .. }));

        let doctor = TestIdentity::doctor();
        assert_eq!(doctor.to_identity().user_id(), doctor.user_id);
    }

    #[test]
    fn test_jwt_token_creation() {
        let token = JwtTestUtils::create_test_token(&TestIdentity::admin(), "test-secret", Some(1));
        assert_eq!(token.split('.').count(), 3);
    }
}
