use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use notification_cell::Notifier;
use security_cell::{admitted, AdmissionGate, AdmissionPolicy, RateLimitProfile};
use shared_config::AppConfig;
use shared_models::auth::Role;

use crate::handlers::*;

#[derive(Clone)]
pub struct ConsultationState {
    pub config: Arc<AppConfig>,
    pub gate: Arc<AdmissionGate>,
    pub notifier: Arc<dyn Notifier>,
}

pub fn consultation_routes(state: ConsultationState) -> Router {
    let request = admitted(
        Router::new().route("/", post(create_consultation)),
        &state.gate,
        AdmissionPolicy::authenticated(RateLimitProfile::Default).require(&[Role::Patient]),
    );

    let read = admitted(
        Router::new().route("/{consultation_id}", get(get_consultation)),
        &state.gate,
        AdmissionPolicy::authenticated(RateLimitProfile::Read),
    );

    let claim = admitted(
        Router::new().route("/{consultation_id}/accept", post(accept_consultation)),
        &state.gate,
        AdmissionPolicy::authenticated(RateLimitProfile::Default).require(&[Role::Doctor]),
    );

    let lifecycle = admitted(
        Router::new()
            .route("/{consultation_id}/start", post(start_consultation))
            .route("/{consultation_id}/complete", post(complete_consultation))
            .route("/{consultation_id}/cancel", post(cancel_consultation)),
        &state.gate,
        AdmissionPolicy::authenticated(RateLimitProfile::Default),
    );

    Router::new()
        .merge(request)
        .merge(read)
        .merge(claim)
        .merge(lifecycle)
        .with_state(state)
}
