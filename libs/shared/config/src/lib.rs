use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub redis_url: Option<String>,
    pub cron_secret: String,
    pub mpesa_base_url: String,
    pub mpesa_consumer_key: String,
    pub mpesa_consumer_secret: String,
    pub mpesa_shortcode: String,
    pub mpesa_passkey: String,
    pub mpesa_callback_url: String,
    pub push_api_url: String,
    pub push_access_token: Option<String>,
    pub video_app_id: String,
    pub video_app_secret: String,
    pub video_domain: String,
    pub http_timeout_secs: u64,
    pub service_access_hours: i64,
    pub payment_reconcile_after_minutes: i64,
    pub bind_addr: String,
}

fn required(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        warn!("{} not set, using empty value", key);
        String::new()
    })
}

fn with_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        warn!("{} not set, using default", key);
        default.to_string()
    })
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} is not a valid value, using default", key);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: required("SUPABASE_URL"),
            supabase_service_role_key: required("SUPABASE_SERVICE_ROLE_KEY"),
            supabase_jwt_secret: required("SUPABASE_JWT_SECRET"),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            cron_secret: required("CRON_SECRET"),
            mpesa_base_url: with_default("MPESA_BASE_URL", "https://sandbox.safaricom.co.ke"),
            mpesa_consumer_key: required("MPESA_CONSUMER_KEY"),
            mpesa_consumer_secret: required("MPESA_CONSUMER_SECRET"),
            mpesa_shortcode: required("MPESA_SHORTCODE"),
            mpesa_passkey: required("MPESA_PASSKEY"),
            mpesa_callback_url: required("MPESA_CALLBACK_URL"),
            push_api_url: with_default("PUSH_API_URL", "https://exp.host/--/api/v2/push/send"),
            push_access_token: env::var("PUSH_ACCESS_TOKEN").ok().filter(|t| !t.is_empty()),
            video_app_id: required("VIDEO_APP_ID"),
            video_app_secret: required("VIDEO_APP_SECRET"),
            video_domain: with_default("VIDEO_DOMAIN", "meet.jit.si"),
            http_timeout_secs: parsed("HTTP_TIMEOUT_SECS", 10),
            service_access_hours: parsed("SERVICE_ACCESS_HOURS", 24),
            payment_reconcile_after_minutes: parsed("PAYMENT_RECONCILE_AFTER_MINUTES", 10),
            bind_addr: with_default("BIND_ADDR", "0.0.0.0:3000"),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_service_role_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
            && !self.cron_secret.is_empty()
    }

    pub fn is_mpesa_configured(&self) -> bool {
        !self.mpesa_consumer_key.is_empty()
            && !self.mpesa_consumer_secret.is_empty()
            && !self.mpesa_shortcode.is_empty()
            && !self.mpesa_passkey.is_empty()
            && !self.mpesa_callback_url.is_empty()
    }

    pub fn is_video_configured(&self) -> bool {
        !self.video_app_id.is_empty() && !self.video_app_secret.is_empty()
    }
}
