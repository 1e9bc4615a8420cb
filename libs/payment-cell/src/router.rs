use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use notification_cell::Notifier;
use security_cell::{admitted, cron_guarded, AdmissionGate, AdmissionPolicy, CronGuard, RateLimitProfile};
use shared_config::AppConfig;
use shared_models::auth::Role;

use crate::handlers::*;
use crate::services::PaymentGateway;

#[derive(Clone)]
pub struct PaymentState {
    pub config: Arc<AppConfig>,
    pub gate: Arc<AdmissionGate>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Clone)]
pub struct PaymentCronState {
    pub config: Arc<AppConfig>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub cron: CronGuard,
}

pub fn payment_routes(state: PaymentState) -> Router {
    let initiate = admitted(
        Router::new().route("/initiate", post(initiate_payment)),
        &state.gate,
        AdmissionPolicy::authenticated(RateLimitProfile::Payment).require(&[Role::Patient]),
    );

    let poll = admitted(
        Router::new().route("/checkout/{checkout_request_id}", get(payment_status)),
        &state.gate,
        AdmissionPolicy::authenticated(RateLimitProfile::Read).require(&[Role::Patient]),
    );

    // Reachable only from the gateway's addresses in production.
    let webhook = Router::new().route("/mpesa/callback", post(mpesa_callback));

    Router::new()
        .merge(initiate)
        .merge(poll)
        .merge(webhook)
        .with_state(state)
}

/// Mounted under `/cron/payments`.
pub fn payment_cron_routes(state: PaymentCronState) -> Router {
    let routes = Router::new().route("/reconcile", post(reconcile_payments));

    cron_guarded(routes, state.cron.clone()).with_state(state)
}
