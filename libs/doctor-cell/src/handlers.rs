use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use shared_models::error::AppError;
use shared_models::response::ok;

use crate::router::DoctorState;
use crate::services::DoctorService;

#[axum::debug_handler]
pub async fn lift_expired_suspensions(State(state): State<DoctorState>) -> Result<Json<Value>, AppError> {
    let service = DoctorService::new(&state.config);

    let lifted = service
        .lift_expired_suspensions(Utc::now(), state.notifier.as_ref())
        .await?;

    Ok(ok(json!({
        "lifted": lifted.len(),
        "doctor_ids": lifted.iter().map(|d| d.id).collect::<Vec<_>>(),
    })))
}
