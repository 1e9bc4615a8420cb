use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use appointment_cell::{appointment_cron_routes, appointment_routes, AppointmentCronState, AppointmentState};
use auth_cell::{auth_routes, AuthState};
use consultation_cell::{consultation_routes, ConsultationState};
use doctor_cell::{doctor_cron_routes, DoctorState};
use notification_cell::{notification_routes, NotificationState, Notifier, PushProvider};
use patient_cell::{session_routes, SessionState};
use payment_cell::{payment_cron_routes, payment_routes, PaymentCronState, PaymentGateway, PaymentState};
use security_cell::{AdmissionGate, CronGuard, RateLimiter};
use shared_config::AppConfig;
use video_conferencing_cell::{video_routes, VideoState};

/// Process-wide collaborators shared by every cell.
pub struct Services {
    pub limiter: RateLimiter,
    pub gateway: Arc<dyn PaymentGateway>,
    pub push: Arc<dyn PushProvider>,
    pub notifier: Arc<dyn Notifier>,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn create_router(config: Arc<AppConfig>, services: Services) -> Router {
    let gate = Arc::new(AdmissionGate::new(&config, services.limiter));
    let cron = CronGuard::new(&config);
    let notifier = services.notifier;

    let cron_routes = Router::new()
        .nest(
            "/appointments",
            appointment_cron_routes(AppointmentCronState {
                config: config.clone(),
                notifier: notifier.clone(),
                cron: cron.clone(),
            }),
        )
        .nest(
            "/doctors",
            doctor_cron_routes(DoctorState {
                config: config.clone(),
                notifier: notifier.clone(),
                cron: cron.clone(),
            }),
        )
        .nest(
            "/payments",
            payment_cron_routes(PaymentCronState {
                config: config.clone(),
                gateway: services.gateway.clone(),
                notifier: notifier.clone(),
                cron,
            }),
        );

    Router::new()
        .route("/", get(|| async { "Telehealth API is running!" }))
        .route("/health", get(health))
        .nest(
            "/auth",
            auth_routes(AuthState {
                config: config.clone(),
                gate: gate.clone(),
            }),
        )
        .nest(
            "/sessions",
            session_routes(SessionState {
                config: config.clone(),
                gate: gate.clone(),
            }),
        )
        .nest(
            "/consultations",
            consultation_routes(ConsultationState {
                config: config.clone(),
                gate: gate.clone(),
                notifier: notifier.clone(),
            }),
        )
        .nest(
            "/appointments",
            appointment_routes(AppointmentState {
                config: config.clone(),
                gate: gate.clone(),
                notifier: notifier.clone(),
            }),
        )
        .nest(
            "/payments",
            payment_routes(PaymentState {
                config: config.clone(),
                gate: gate.clone(),
                gateway: services.gateway,
                notifier: notifier.clone(),
            }),
        )
        .nest(
            "/notifications",
            notification_routes(NotificationState {
                config: config.clone(),
                gate: gate.clone(),
                push: services.push,
            }),
        )
        .nest(
            "/video",
            video_routes(VideoState {
                config,
                gate,
                notifier,
            }),
        )
        .nest("/cron", cron_routes)
}
