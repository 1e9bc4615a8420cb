use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;

pub const MAX_FINGERPRINT_LEN: usize = 512;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceBinding {
    pub doctor_id: Uuid,
    pub device_fingerprint: String,
    pub bound_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct BindDeviceRequest {
    pub doctor_id: Uuid,
    pub device_fingerprint: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckDeviceRequest {
    pub doctor_id: Uuid,
    pub device_fingerprint: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct DeviceCheck {
    pub bound: bool,
    pub matches: bool,
}

#[derive(Error, Debug)]
pub enum DeviceBindingError {
    #[error("Doctors may only bind their own device")]
    NotOwner,

    #[error("Only administrators may deauthorize devices")]
    NotAdmin,

    #[error("Device fingerprint must be between 1 and {MAX_FINGERPRINT_LEN} characters")]
    InvalidFingerprint,

    #[error("Device is already bound to another doctor")]
    FingerprintTaken,

    #[error("Another device is already bound to this doctor")]
    DoctorAlreadyBound,

    #[error("No device bound to this doctor")]
    NotBound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<DeviceBindingError> for AppError {
    fn from(err: DeviceBindingError) -> Self {
        match err {
            DeviceBindingError::NotOwner | DeviceBindingError::NotAdmin => AppError::Forbidden(err.to_string()),
            DeviceBindingError::InvalidFingerprint => AppError::Validation(err.to_string()),
            DeviceBindingError::FingerprintTaken | DeviceBindingError::DoctorAlreadyBound => {
                AppError::Conflict(err.to_string())
            }
            DeviceBindingError::NotBound => AppError::NotFound(err.to_string()),
            DeviceBindingError::Store(e) => e.into(),
        }
    }
}
