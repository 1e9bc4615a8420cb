// libs/video-conferencing-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use consultation_cell::{ConsultationError, ConsultationStatus};
use shared_models::error::AppError;

// ==============================================================================
// VIDEO ROOM MODELS
// ==============================================================================

pub const TOKEN_AUDIENCE: &str = "jitsi";
pub const TOKEN_TTL_MINUTES: i64 = 120;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VideoRole {
    /// Assigned doctor: may mute, kick and end the room.
    Moderator,
    /// Patient: join only.
    Participant,
}

impl VideoRole {
    pub fn is_moderator(&self) -> bool {
        matches!(self, VideoRole::Moderator)
    }
}

pub fn room_name(consultation_id: Uuid) -> String {
    format!("consultation-{}", consultation_id)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomUser {
    pub id: String,
    pub name: String,
    pub moderator: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomContext {
    pub user: RoomUser,
}

/// Claims understood by the video provider's token authentication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomClaims {
    pub aud: String,
    pub iss: String,
    pub sub: String,
    pub room: String,
    pub nbf: i64,
    pub exp: i64,
    pub moderator: bool,
    pub context: RoomContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoToken {
    pub token: String,
    pub room: String,
    pub domain: String,
    pub join_url: String,
    pub role: VideoRole,
    pub expires_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Video conferencing not configured")]
    NotConfigured,

    #[error("Consultation does not include video")]
    NoVideo,

    #[error("Video is only available while the consultation is active, not {0}")]
    NotLive(ConsultationStatus),

    #[error("Only the patient and the assigned doctor may join this room")]
    NotParticipant,

    #[error(transparent)]
    Consultation(#[from] ConsultationError),

    #[error("Failed to sign room token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

impl From<VideoError> for AppError {
    fn from(err: VideoError) -> Self {
        match err {
            VideoError::NotConfigured | VideoError::Signing(_) => AppError::Internal(err.to_string()),
            VideoError::NoVideo => AppError::Validation(err.to_string()),
            VideoError::NotLive(_) => AppError::Conflict(err.to_string()),
            VideoError::NotParticipant => AppError::Forbidden(err.to_string()),
            VideoError::Consultation(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_is_named_after_consultation() {
        let id = Uuid::nil();
        assert_eq!(room_name(id), "consultation-00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn error_mapping() {
        assert!(matches!(AppError::from(VideoError::NotParticipant), AppError::Forbidden(_)));
        assert!(matches!(
            AppError::from(VideoError::NotLive(ConsultationStatus::Pending)),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(VideoError::Consultation(ConsultationError::NotFound)),
            AppError::NotFound(_)
        ));
    }
}
