use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::Identity;
use shared_models::error::AppError;
use shared_models::response::ok;

use crate::models::{BindDeviceRequest, CheckDeviceRequest};
use crate::router::AuthState;
use crate::services::DeviceBindingService;

#[axum::debug_handler]
pub async fn whoami(Extension(identity): Extension<Identity>) -> Result<Json<Value>, AppError> {
    debug!("Resolving identity for {}", identity.tenant_key());
    Ok(ok(json!({
        "role": identity.role(),
        "user_id": identity.user_id(),
        "session_id": identity.session_id(),
    })))
}

#[axum::debug_handler]
pub async fn bind_device(
    State(state): State<AuthState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<BindDeviceRequest>,
) -> Result<Json<Value>, AppError> {
    let service = DeviceBindingService::new(&state.config);

    let binding = service
        .bind(&identity, request.doctor_id, &request.device_fingerprint)
        .await?;
    Ok(ok(binding))
}

#[axum::debug_handler]
pub async fn check_device(
    State(state): State<AuthState>,
    Json(request): Json<CheckDeviceRequest>,
) -> Result<Json<Value>, AppError> {
    let service = DeviceBindingService::new(&state.config);

    let check = service.check(request.doctor_id, &request.device_fingerprint).await?;
    Ok(ok(check))
}

#[axum::debug_handler]
pub async fn deauthorize_device(
    State(state): State<AuthState>,
    Extension(identity): Extension<Identity>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = DeviceBindingService::new(&state.config);

    let removed = service.deauthorize(&identity, doctor_id).await?;
    Ok(ok(json!({ "doctor_id": doctor_id, "removed": removed })))
}
