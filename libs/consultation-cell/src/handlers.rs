use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use shared_models::auth::Identity;
use shared_models::error::AppError;
use shared_models::response::ok;

use crate::models::{CancelConsultationRequest, CreateConsultationRequest};
use crate::router::ConsultationState;
use crate::services::ConsultationService;

fn service(state: &ConsultationState) -> ConsultationService {
    ConsultationService::new(&state.config, state.notifier.clone())
}

#[axum::debug_handler]
pub async fn create_consultation(
    State(state): State<ConsultationState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<CreateConsultationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let session_id = identity
        .session_id()
        .ok_or_else(|| AppError::Forbidden("Only patients can request consultations".to_string()))?;

    let outcome = service(&state).create(session_id, request, Utc::now()).await?;
    let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, ok(outcome)))
}

#[axum::debug_handler]
pub async fn get_consultation(
    State(state): State<ConsultationState>,
    Extension(identity): Extension<Identity>,
    Path(consultation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let consultation = service(&state).get_for(&identity, consultation_id).await?;
    Ok(ok(consultation))
}

#[axum::debug_handler]
pub async fn accept_consultation(
    State(state): State<ConsultationState>,
    Extension(identity): Extension<Identity>,
    Path(consultation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let consultation = service(&state).accept(&identity, consultation_id).await?;
    Ok(ok(consultation))
}

#[axum::debug_handler]
pub async fn start_consultation(
    State(state): State<ConsultationState>,
    Extension(identity): Extension<Identity>,
    Path(consultation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let consultation = service(&state).start(&identity, consultation_id, Utc::now()).await?;
    Ok(ok(consultation))
}

#[axum::debug_handler]
pub async fn complete_consultation(
    State(state): State<ConsultationState>,
    Extension(identity): Extension<Identity>,
    Path(consultation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let consultation = service(&state).complete(&identity, consultation_id, Utc::now()).await?;
    Ok(ok(consultation))
}

#[axum::debug_handler]
pub async fn cancel_consultation(
    State(state): State<ConsultationState>,
    Extension(identity): Extension<Identity>,
    Path(consultation_id): Path<Uuid>,
    Json(request): Json<CancelConsultationRequest>,
) -> Result<Json<Value>, AppError> {
    let consultation = service(&state)
        .cancel(&identity, consultation_id, request.reason, Utc::now())
        .await?;
    Ok(ok(consultation))
}
