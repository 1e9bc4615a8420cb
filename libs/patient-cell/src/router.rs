use std::sync::Arc;

use axum::{routing::post, Router};

use security_cell::{admitted, AdmissionGate, AdmissionPolicy, RateLimitProfile};
use shared_config::AppConfig;
use shared_models::auth::Role;

use crate::handlers::*;

#[derive(Clone)]
pub struct SessionState {
    pub config: Arc<AppConfig>,
    pub gate: Arc<AdmissionGate>,
}

pub fn session_routes(state: SessionState) -> Router {
    let routes = Router::new().route("/extend", post(extend_session));

    admitted(
        routes,
        &state.gate,
        AdmissionPolicy::authenticated(RateLimitProfile::Default).require(&[Role::Patient]),
    )
    .with_state(state)
}
