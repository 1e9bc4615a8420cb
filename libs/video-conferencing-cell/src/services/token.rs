// =====================================================================================
// VIDEO ROOM TOKENS
// =====================================================================================

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use consultation_cell::{Consultation, ConsultationService, ConsultationStatus};
use notification_cell::Notifier;
use shared_config::AppConfig;
use shared_models::auth::Identity;

use crate::models::{
    room_name, RoomClaims, RoomContext, RoomUser, VideoError, VideoRole, VideoToken, TOKEN_AUDIENCE,
    TOKEN_TTL_MINUTES,
};

pub struct VideoTokenService {
    app_id: String,
    app_secret: String,
    domain: String,
    consultations: ConsultationService,
}

impl VideoTokenService {
    pub fn new(config: &AppConfig, notifier: Arc<dyn Notifier>) -> Result<Self, VideoError> {
        if !config.is_video_configured() {
            return Err(VideoError::NotConfigured);
        }

        Ok(Self {
            app_id: config.video_app_id.clone(),
            app_secret: config.video_app_secret.clone(),
            domain: config.video_domain.clone(),
            consultations: ConsultationService::new(config, notifier),
        })
    }

    /// Only the two parties of the consultation get into the room.
    fn role_for(identity: &Identity, consultation: &Consultation) -> Result<VideoRole, VideoError> {
        match identity {
            Identity::Patient { session_id } if consultation.patient_session_id == *session_id => {
                Ok(VideoRole::Participant)
            }
            Identity::Doctor { user_id } if consultation.doctor_id == Some(*user_id) => Ok(VideoRole::Moderator),
            _ => Err(VideoError::NotParticipant),
        }
    }

    #[instrument(skip(self, identity), fields(consultation_id = %consultation_id))]
    pub async fn issue(
        &self,
        identity: &Identity,
        consultation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<VideoToken, VideoError> {
        let consultation = self.consultations.get(consultation_id).await?;
        let role = Self::role_for(identity, &consultation)?;

        if !consultation.consultation_type.has_video() {
            return Err(VideoError::NoVideo);
        }
        if !matches!(
            consultation.status,
            ConsultationStatus::Active | ConsultationStatus::InProgress
        ) {
            return Err(VideoError::NotLive(consultation.status));
        }

        let token = self.sign(identity, consultation_id, role, now)?;
        info!("Issued {:?} room token for consultation {}", role, consultation_id);
        Ok(token)
    }

    pub fn sign(
        &self,
        identity: &Identity,
        consultation_id: Uuid,
        role: VideoRole,
        now: DateTime<Utc>,
    ) -> Result<VideoToken, VideoError> {
        let room = room_name(consultation_id);
        let expires_at = now + Duration::minutes(TOKEN_TTL_MINUTES);
        let name = match role {
            VideoRole::Moderator => "Doctor",
            VideoRole::Participant => "Patient",
        };

        let claims = RoomClaims {
            aud: TOKEN_AUDIENCE.to_string(),
            iss: self.app_id.clone(),
            sub: self.domain.clone(),
            room: room.clone(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            moderator: role.is_moderator(),
            context: RoomContext {
                user: RoomUser {
                    id: identity.tenant_key(),
                    name: name.to_string(),
                    moderator: role.is_moderator(),
                },
            },
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.app_secret.as_bytes()),
        )?;
        debug!("Signed token for room {}", room);

        Ok(VideoToken {
            token,
            join_url: format!("https://{}/{}", self.domain, room),
            domain: self.domain.clone(),
            room,
            role,
            expires_at,
        })
    }
}
