// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use notification_cell::Notifier;
use security_cell::{admitted, cron_guarded, AdmissionGate, AdmissionPolicy, CronGuard, RateLimitProfile};
use shared_config::AppConfig;
use shared_models::auth::Role;

use crate::handlers;

#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub gate: Arc<AdmissionGate>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Clone)]
pub struct AppointmentCronState {
    pub config: Arc<AppConfig>,
    pub notifier: Arc<dyn Notifier>,
    pub cron: CronGuard,
}

pub fn appointment_routes(state: AppointmentState) -> Router {
    let booking = admitted(
        Router::new().route("/", post(handlers::create_appointment)),
        &state.gate,
        AdmissionPolicy::authenticated(RateLimitProfile::Default).require(&[Role::Patient, Role::Doctor]),
    );

    let read = admitted(
        Router::new().route("/{appointment_id}", get(handlers::get_appointment)),
        &state.gate,
        AdmissionPolicy::authenticated(RateLimitProfile::Read),
    );

    let lifecycle = admitted(
        Router::new()
            .route("/{appointment_id}/confirm", post(handlers::confirm_appointment))
            .route("/{appointment_id}/start", post(handlers::start_appointment))
            .route("/{appointment_id}/complete", post(handlers::complete_appointment))
            .route("/{appointment_id}/cancel", post(handlers::cancel_appointment)),
        &state.gate,
        AdmissionPolicy::authenticated(RateLimitProfile::Default),
    );

    let reschedule = admitted(
        Router::new().route("/{appointment_id}/reschedule", post(handlers::reschedule_appointment)),
        &state.gate,
        AdmissionPolicy::authenticated(RateLimitProfile::Default).require(&[Role::Doctor]),
    );

    Router::new()
        .merge(booking)
        .merge(read)
        .merge(lifecycle)
        .merge(reschedule)
        .with_state(state)
}

/// Scheduler-triggered sweeps, mounted under `/cron/appointments`.
pub fn appointment_cron_routes(state: AppointmentCronState) -> Router {
    let routes = Router::new()
        .route("/missed", post(handlers::sweep_missed_appointments))
        .route("/reminders", post(handlers::sweep_appointment_reminders));

    cron_guarded(routes, state.cron.clone()).with_state(state)
}
