// libs/video-conferencing-cell/src/handlers.rs
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use shared_models::auth::Identity;
use shared_models::error::AppError;
use shared_models::response::ok;

use crate::router::VideoState;
use crate::services::VideoTokenService;

#[axum::debug_handler]
pub async fn issue_video_token(
    State(state): State<VideoState>,
    Extension(identity): Extension<Identity>,
    Path(consultation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = VideoTokenService::new(&state.config, state.notifier.clone())?;
    let token = service.issue(&identity, consultation_id, Utc::now()).await?;
    Ok(ok(token))
}
