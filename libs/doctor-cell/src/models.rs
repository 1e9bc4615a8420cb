use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::ServiceType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub full_name: String,
    pub is_verified: bool,
    pub is_available: bool,
    #[serde(default)]
    pub service_types: Vec<String>,
    #[serde(default)]
    pub is_suspended: bool,
    pub suspended_until: Option<DateTime<Utc>>,
}

impl Doctor {
    pub fn serves(&self, service_type: ServiceType) -> bool {
        self.service_types.iter().any(|s| s == service_type.as_str())
    }
}

#[derive(Error, Debug)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Doctor is not verified")]
    NotVerified,

    #[error("Doctor is suspended")]
    Suspended,

    #[error("Doctor does not offer {0} consultations")]
    DoesNotServe(ServiceType),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::Store(e) => e.into(),
            // Picking an unsuitable doctor is a caller input problem.
            other => AppError::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_matches_tier_names() {
        let doctor = Doctor {
            id: Uuid::nil(),
            full_name: "Dr. A".to_string(),
            is_verified: true,
            is_available: true,
            service_types: vec!["gp".to_string(), "clinical_officer".to_string()],
            is_suspended: false,
            suspended_until: None,
        };
        assert!(doctor.serves(ServiceType::ClinicalOfficer));
        assert!(!doctor.serves(ServiceType::Psychologist));
    }
}
