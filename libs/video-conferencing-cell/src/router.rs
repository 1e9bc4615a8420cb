// libs/video-conferencing-cell/src/router.rs
use std::sync::Arc;

use axum::{routing::post, Router};

use notification_cell::Notifier;
use security_cell::{admitted, AdmissionGate, AdmissionPolicy, RateLimitProfile};
use shared_config::AppConfig;
use shared_models::auth::Role;

use crate::handlers::*;

#[derive(Clone)]
pub struct VideoState {
    pub config: Arc<AppConfig>,
    pub gate: Arc<AdmissionGate>,
    pub notifier: Arc<dyn Notifier>,
}

pub fn video_routes(state: VideoState) -> Router {
    let routes = Router::new().route("/consultations/{consultation_id}/token", post(issue_video_token));

    admitted(
        routes,
        &state.gate,
        AdmissionPolicy::authenticated(RateLimitProfile::Default).require(&[Role::Patient, Role::Doctor]),
    )
    .with_state(state)
}
