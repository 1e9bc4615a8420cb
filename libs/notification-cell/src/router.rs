use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use security_cell::{admitted, AdmissionGate, AdmissionPolicy, RateLimitProfile};
use shared_config::AppConfig;

use crate::handlers::*;
use crate::services::PushProvider;

#[derive(Clone)]
pub struct NotificationState {
    pub config: Arc<AppConfig>,
    pub gate: Arc<AdmissionGate>,
    pub push: Arc<dyn PushProvider>,
}

pub fn notification_routes(state: NotificationState) -> Router {
    let routes = Router::new()
        .route("/", get(list_notifications))
        .route("/{notification_id}/read", post(mark_notification_read));

    admitted(
        routes,
        &state.gate,
        AdmissionPolicy::authenticated(RateLimitProfile::Notification),
    )
    .with_state(state)
}
