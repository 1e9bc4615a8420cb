// =====================================================================================
// RATE LIMITER - FIXED WINDOW COUNTERS
// =====================================================================================

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::{Config, Pool, Runtime};
use redis::Script;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::{RateLimitProfile, RateLimitStoreError};

/// Atomic upsert-increment: the first hit in a window creates the key with a
/// TTL, later hits only increment it.
const INCREMENT_WINDOW: &str = r#"
local current = redis.call('INCR', KEYS[1])
if current == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return current
"#;

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Increments the counter for `key` and returns the count in the current window.
    async fn increment(&self, key: &str, window_secs: u64, now: i64) -> Result<u64, RateLimitStoreError>;
}

pub struct RedisRateLimitStore {
    pool: Pool,
    script: Script,
}

impl RedisRateLimitStore {
    pub async fn connect(redis_url: &str) -> Result<Self, RateLimitStoreError> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| RateLimitStoreError::Unavailable(format!("Pool creation error: {}", e)))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| RateLimitStoreError::Unavailable(format!("Connection error: {}", e)))?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis rate limit store initialized");

        Ok(Self {
            pool,
            script: Script::new(INCREMENT_WINDOW),
        })
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn increment(&self, key: &str, window_secs: u64, _now: i64) -> Result<u64, RateLimitStoreError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RateLimitStoreError::Unavailable(e.to_string()))?;

        let count: u64 = self.script.key(key).arg(window_secs).invoke_async(&mut conn).await?;
        Ok(count)
    }
}

/// Process-local counters. Only correct for a single instance; used in tests
/// and when no `REDIS_URL` is configured.
#[derive(Default)]
pub struct InMemoryRateLimitStore {
    windows: Mutex<HashMap<String, (i64, u64)>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn increment(&self, key: &str, window_secs: u64, now: i64) -> Result<u64, RateLimitStoreError> {
        let mut windows = self.windows.lock().await;
        let (window_start, count) = windows.entry(key.to_string()).or_insert((now, 0));

        if now - *window_start >= window_secs as i64 {
            *window_start = now;
            *count = 0;
        }

        *count += 1;
        Ok(*count)
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryRateLimitStore::new()))
    }

    pub async fn try_acquire(&self, bucket_key: &str, limit: u32, window_secs: u64) -> bool {
        self.try_acquire_at(bucket_key, limit, window_secs, Utc::now().timestamp())
            .await
    }

    /// Counts the attempt and reports whether it fits in the window. A store
    /// outage admits the request.
    pub async fn try_acquire_at(&self, bucket_key: &str, limit: u32, window_secs: u64, now: i64) -> bool {
        match self.store.increment(bucket_key, window_secs, now).await {
            Ok(count) => {
                let allowed = count <= limit as u64;
                if !allowed {
                    debug!("Rate limit exceeded for {} ({}/{})", bucket_key, count, limit);
                }
                allowed
            }
            Err(e) => {
                warn!("Rate limit store error for {}, admitting request: {}", bucket_key, e);
                true
            }
        }
    }

    pub async fn acquire_profile_at(&self, profile: RateLimitProfile, identity_key: &str, now: i64) -> bool {
        self.try_acquire_at(
            &profile.bucket_key(identity_key),
            profile.limit(),
            profile.window_secs(),
            now,
        )
        .await
    }
}
