// libs/appointment-cell/src/handlers.rs
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

use crate::models::{CancelAppointmentRequest, CreateAppointmentRequest, RescheduleAppointmentRequest};
use crate::router::{AppointmentCronState, AppointmentState};
use crate::services::{AppointmentService, AppointmentSweeper};

fn service(state: &AppointmentState) -> AppointmentService {
    AppointmentService::new(&state.config, state.notifier.clone())
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<AppointmentState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let appointment = service(&state).create(&identity, request, Utc::now()).await?;
    Ok((StatusCode::CREATED, ok(appointment)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Extension(identity): Extension<Identity>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = service(&state).get_for(&identity, appointment_id).await?;
    Ok(ok(appointment))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<AppointmentState>,
    Extension(identity): Extension<Identity>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = service(&state).confirm(&identity, appointment_id).await?;
    Ok(ok(appointment))
}

#[axum::debug_handler]
pub async fn start_appointment(
    State(state): State<AppointmentState>,
    Extension(identity): Extension<Identity>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = service(&state).start(&identity, appointment_id, Utc::now()).await?;
    Ok(ok(appointment))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<AppointmentState>,
    Extension(identity): Extension<Identity>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = service(&state).complete(&identity, appointment_id).await?;
    Ok(ok(appointment))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppointmentState>,
    Extension(identity): Extension<Identity>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = service(&state)
        .cancel(&identity, appointment_id, request.reason)
        .await?;
    Ok(ok(appointment))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<AppointmentState>,
    Extension(identity): Extension<Identity>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = service(&state)
        .reschedule(&identity, appointment_id, request, Utc::now())
        .await?;
    Ok(ok(outcome))
}

// ==============================================================================
// CRON
// ==============================================================================

#[axum::debug_handler]
pub async fn sweep_missed_appointments(State(state): State<AppointmentCronState>) -> Result<Json<Value>, AppError> {
    let report = AppointmentSweeper::new(&state.config, state.notifier.clone())
        .mark_missed(Utc::now())
        .await?;
    Ok(ok(report))
}

#[axum::debug_handler]
pub async fn sweep_appointment_reminders(
    State(state): State<AppointmentCronState>,
) -> Result<Json<Value>, AppError> {
    let report = AppointmentSweeper::new(&state.config, state.notifier.clone())
        .send_reminders(Utc::now())
        .await?;
    Ok(ok(report))
}
