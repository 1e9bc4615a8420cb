// =====================================================================================
// CONSULTATION MODELS
// =====================================================================================

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use doctor_cell::DoctorError;
use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::ServiceType;

pub const MIN_COMPLAINT_LEN: usize = 10;
pub const MAX_COMPLAINT_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationType {
    Chat,
    Video,
    Both,
}

impl ConsultationType {
    pub fn has_video(&self) -> bool {
        matches!(self, ConsultationType::Video | ConsultationType::Both)
    }
}

impl FromStr for ConsultationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(ConsultationType::Chat),
            "video" => Ok(ConsultationType::Video),
            "both" => Ok(ConsultationType::Both),
            other => Err(format!("Unknown consultation type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    Pending,
    Active,
    InProgress,
    Completed,
    Cancelled,
}

impl ConsultationStatus {
    /// Statuses that count towards the one-open-consultation-per-session rule.
    pub const OPEN: [ConsultationStatus; 3] = [
        ConsultationStatus::Pending,
        ConsultationStatus::Active,
        ConsultationStatus::InProgress,
    ];

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }
}

impl fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsultationStatus::Pending => "pending",
            ConsultationStatus::Active => "active",
            ConsultationStatus::InProgress => "in_progress",
            ConsultationStatus::Completed => "completed",
            ConsultationStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consultation {
    pub id: Uuid,
    pub patient_session_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub service_type: ServiceType,
    pub consultation_type: ConsultationType,
    pub status: ConsultationStatus,
    pub chief_complaint: String,
    #[serde(default)]
    pub remaining_call_minutes: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateConsultationRequest {
    pub service_type: String,
    pub consultation_type: String,
    pub chief_complaint: String,
    pub doctor_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelConsultationRequest {
    pub reason: Option<String>,
}

/// Validated form of [`CreateConsultationRequest`].
#[derive(Debug, Clone)]
pub struct NewConsultation {
    pub service_type: ServiceType,
    pub consultation_type: ConsultationType,
    pub chief_complaint: String,
    pub doctor_id: Option<Uuid>,
}

impl TryFrom<CreateConsultationRequest> for NewConsultation {
    type Error = ConsultationError;

    fn try_from(request: CreateConsultationRequest) -> Result<Self, Self::Error> {
        let service_type = request
            .service_type
            .parse::<ServiceType>()
            .map_err(ConsultationError::Invalid)?;
        let consultation_type = request
            .consultation_type
            .parse::<ConsultationType>()
            .map_err(ConsultationError::Invalid)?;

        let chief_complaint = request.chief_complaint.trim().to_string();
        let len = chief_complaint.chars().count();
        if !(MIN_COMPLAINT_LEN..=MAX_COMPLAINT_LEN).contains(&len) {
            return Err(ConsultationError::Invalid(format!(
                "Chief complaint must be between {} and {} characters",
                MIN_COMPLAINT_LEN, MAX_COMPLAINT_LEN
            )));
        }

        Ok(Self {
            service_type,
            consultation_type,
            chief_complaint,
            doctor_id: request.doctor_id,
        })
    }
}

/// Result of `create`: either the new row or the session's existing open one.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub consultation: Consultation,
    pub created: bool,
}

#[derive(Error, Debug)]
pub enum ConsultationError {
    #[error("{0}")]
    Invalid(String),

    #[error("No active access for {0} consultations")]
    NoActiveAccess(ServiceType),

    #[error(transparent)]
    Doctor(#[from] DoctorError),

    #[error("Consultation not found")]
    NotFound,

    #[error("Not a participant in this consultation")]
    NotParticipant,

    #[error("Consultation is {0} and cannot move to {1}")]
    InvalidTransition(ConsultationStatus, ConsultationStatus),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ConsultationError> for AppError {
    fn from(err: ConsultationError) -> Self {
        match err {
            ConsultationError::Invalid(_) | ConsultationError::NoActiveAccess(_) => {
                AppError::Validation(err.to_string())
            }
            ConsultationError::Doctor(e) => e.into(),
            ConsultationError::NotFound => AppError::NotFound(err.to_string()),
            ConsultationError::NotParticipant => AppError::Forbidden(err.to_string()),
            ConsultationError::InvalidTransition(..) => AppError::Conflict(err.to_string()),
            ConsultationError::Store(e) => e.into(),
        }
    }
}
