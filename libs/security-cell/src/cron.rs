use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};
use tracing::warn;

use shared_config::AppConfig;
use shared_models::error::{AppError, ErrorRecord};

use crate::admission::function_name;
use crate::models::EventLogEntry;
use crate::services::EventLogService;

pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Shared-secret check for scheduler-triggered sweeps.
#[derive(Clone)]
pub struct CronGuard {
    secret: String,
    events: EventLogService,
}

impl CronGuard {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            secret: config.cron_secret.clone(),
            events: EventLogService::new(config),
        }
    }

    pub fn verify(&self, supplied: Option<&str>) -> Result<(), AppError> {
        if self.secret.is_empty() {
            return Err(AppError::Unauthorized("Cron secret is not configured".to_string()));
        }

        match supplied {
            Some(value) if constant_time_eq(value.as_bytes(), self.secret.as_bytes()) => Ok(()),
            Some(_) => Err(AppError::Unauthorized("Invalid cron secret".to_string())),
            None => Err(AppError::Unauthorized("Missing cron secret".to_string())),
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn cron_guarded<S>(router: Router<S>, guard: CronGuard) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(axum::middleware::from_fn_with_state(guard, cron_secret_middleware))
}

pub async fn cron_secret_middleware(
    State(guard): State<CronGuard>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let function = function_name(&request);
    let supplied = request
        .headers()
        .get(CRON_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());

    let response = match guard.verify(supplied) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            warn!("Rejected cron call to {}", function);
            e.into_response()
        }
    };

    if let Some(record) = response.extensions().get::<ErrorRecord>() {
        guard
            .events
            .record_detached(EventLogEntry::from_error(&function, Some("cron".to_string()), record));
    }

    response
}
