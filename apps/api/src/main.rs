use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use notification_cell::{ExpoPushClient, NotificationDispatcher, NotificationService, Notifier, PushProvider};
use payment_cell::{MpesaClient, PaymentError, PaymentGateway, UnconfiguredGateway};
use security_cell::{RateLimiter, RedisRateLimitStore};
use shared_config::AppConfig;

use crate::router::Services;

const NOTIFICATION_QUEUE: usize = 1024;
const NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(10);

async fn rate_limiter(config: &AppConfig) -> RateLimiter {
    match config.redis_url.as_deref() {
        Some(url) => match RedisRateLimitStore::connect(url).await {
            Ok(store) => RateLimiter::new(Arc::new(store)),
            Err(e) => {
                warn!("Redis unavailable ({}), rate limits are per instance", e);
                RateLimiter::in_memory()
            }
        },
        None => {
            warn!("REDIS_URL not set, rate limits are per instance");
            RateLimiter::in_memory()
        }
    }
}

fn payment_gateway(config: &AppConfig) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    match MpesaClient::new(config) {
        Ok(client) => Ok(Arc::new(client)),
        Err(PaymentError::GatewayNotConfigured) => {
            warn!("M-Pesa credentials missing, payments will be refused");
            Ok(Arc::new(UnconfiguredGateway))
        }
        Err(e) => Err(e).context("Failed to build M-Pesa client"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting telehealth API server");

    let config = Arc::new(AppConfig::from_env());

    let push: Arc<dyn PushProvider> = Arc::new(ExpoPushClient::new(&config));
    let store: Arc<dyn Notifier> = Arc::new(NotificationService::new(&config, push.clone()));
    let notifier: Arc<dyn Notifier> = Arc::new(NotificationDispatcher::spawn(
        store,
        NOTIFICATION_QUEUE,
        NOTIFICATION_TIMEOUT,
    ));

    let services = Services {
        limiter: rate_limiter(&config).await,
        gateway: payment_gateway(&config)?,
        push,
        notifier,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(config.clone(), services)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("Server error")?;
    Ok(())
}
