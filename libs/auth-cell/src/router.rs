use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};

use security_cell::{admitted, AdmissionGate, AdmissionPolicy, RateLimitProfile};
use shared_config::AppConfig;
use shared_models::auth::Role;

use crate::handlers;

#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<AppConfig>,
    pub gate: Arc<AdmissionGate>,
}

pub fn auth_routes(state: AuthState) -> Router {
    let gate = &state.gate;

    // Pre-login lookup, keyed by client address.
    let public_routes = admitted(
        Router::new().route("/devices/check", post(handlers::check_device)),
        gate,
        AdmissionPolicy::anonymous(RateLimitProfile::Read),
    );

    let identity_routes = admitted(
        Router::new().route("/me", get(handlers::whoami)),
        gate,
        AdmissionPolicy::authenticated(RateLimitProfile::Read),
    );

    let doctor_routes = admitted(
        Router::new().route("/devices/bind", post(handlers::bind_device)),
        gate,
        AdmissionPolicy::authenticated(RateLimitProfile::Sensitive).require(&[Role::Doctor]),
    );

    let admin_routes = admitted(
        Router::new().route("/devices/{doctor_id}", delete(handlers::deauthorize_device)),
        gate,
        AdmissionPolicy::authenticated(RateLimitProfile::Sensitive).require(&[Role::Admin]),
    );

    Router::new()
        .merge(public_routes)
        .merge(identity_routes)
        .merge(doctor_routes)
        .merge(admin_routes)
        .with_state(state)
}
