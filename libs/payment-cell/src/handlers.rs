use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use security_cell::{EventLevel, EventLogEntry, EventLogService};
use shared_models::auth::Identity;
use shared_models::error::AppError;
use shared_models::response::ok;

use crate::models::{callback_ack, CheckoutResult, InitiatePaymentRequest, StkCallbackEnvelope};
use crate::router::{PaymentCronState, PaymentState};
use crate::services::PaymentService;

fn service(state: &PaymentState) -> PaymentService {
    PaymentService::new(&state.config, state.gateway.clone(), state.notifier.clone())
}

fn patient_session(identity: &Identity) -> Result<uuid::Uuid, AppError> {
    identity
        .session_id()
        .ok_or_else(|| AppError::Forbidden("Only patients can make payments".to_string()))
}

#[axum::debug_handler]
pub async fn initiate_payment(
    State(state): State<PaymentState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let session_id = patient_session(&identity)?;

    let outcome = service(&state).initiate(session_id, request, Utc::now()).await?;
    let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        ok(json!({
            "payment_id": outcome.payment.id,
            "checkout_request_id": outcome.payment.mpesa_checkout_request_id,
            "status": outcome.payment.status,
            "amount": outcome.payment.amount,
            "created": outcome.created,
        })),
    ))
}

#[axum::debug_handler]
pub async fn payment_status(
    State(state): State<PaymentState>,
    Extension(identity): Extension<Identity>,
    Path(checkout_request_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session_id = patient_session(&identity)?;

    let payment = service(&state).status(session_id, &checkout_request_id).await?;
    Ok(ok(payment))
}

/// Gateway callback. Always acknowledged so the sender never retries;
/// anything that went wrong is logged and left to the reconciliation sweep.
#[axum::debug_handler]
pub async fn mpesa_callback(State(state): State<PaymentState>, body: Bytes) -> Json<Value> {
    let events = EventLogService::new(&state.config);

    let envelope: StkCallbackEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Unreadable payment callback: {}", e);
            events.record_detached(
                EventLogEntry::new("payments/mpesa/callback", EventLevel::Warn, "invalid_payload")
                    .with_metadata(json!({ "error": e.to_string() })),
            );
            return Json(callback_ack());
        }
    };

    let result = CheckoutResult::from(envelope.body.stk_callback);
    let checkout_request_id = result.checkout_request_id.clone();

    match service(&state).reconcile(result, Utc::now()).await {
        Ok(outcome) => info!("Callback for {} handled: {:?}", checkout_request_id, outcome),
        Err(e) => {
            error!("Callback for {} failed: {}", checkout_request_id, e);
            events.record_detached(
                EventLogEntry::new("payments/mpesa/callback", EventLevel::Error, "reconcile_failed").with_metadata(
                    json!({ "checkout_request_id": checkout_request_id, "error": e.to_string() }),
                ),
            );
        }
    }

    Json(callback_ack())
}

#[axum::debug_handler]
pub async fn reconcile_payments(State(state): State<PaymentCronState>) -> Result<Json<Value>, AppError> {
    let report = PaymentService::new(&state.config, state.gateway.clone(), state.notifier.clone())
        .reconcile_pending(Utc::now())
        .await?;
    Ok(ok(report))
}
