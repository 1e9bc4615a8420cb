use std::sync::Arc;

use axum::{routing::post, Router};

use notification_cell::Notifier;
use security_cell::{cron_guarded, CronGuard};
use shared_config::AppConfig;

use crate::handlers::*;

#[derive(Clone)]
pub struct DoctorState {
    pub config: Arc<AppConfig>,
    pub notifier: Arc<dyn Notifier>,
    pub cron: CronGuard,
}

/// Scheduler-triggered doctor maintenance, mounted under `/cron/doctors`.
pub fn doctor_cron_routes(state: DoctorState) -> Router {
    let routes = Router::new().route("/suspensions", post(lift_expired_suspensions));

    cron_guarded(routes, state.cron.clone()).with_state(state)
}
