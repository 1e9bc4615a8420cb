use axum::{
    extract::State,
    Extension, Json,
};
use chrono::Utc;
use serde_json::Value;

use shared_models::auth::Identity;
use shared_models::error::AppError;
use shared_models::response::ok;

use crate::models::{ExtendSessionRequest, DEFAULT_EXTENSION_HOURS};
use crate::router::SessionState;
use crate::services::SessionService;

#[axum::debug_handler]
pub async fn extend_session(
    State(state): State<SessionState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<ExtendSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let session_id = identity
        .session_id()
        .ok_or_else(|| AppError::Forbidden("Only patient sessions can be extended".to_string()))?;
    let hours = request.hours.unwrap_or(DEFAULT_EXTENSION_HOURS);

    let service = SessionService::new(&state.config);
    let session = service.extend(session_id, hours, Utc::now()).await?;

    Ok(ok(session))
}
