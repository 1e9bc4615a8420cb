pub mod audit;
pub mod rate_limiter;

pub use audit::EventLogService;
pub use rate_limiter::{InMemoryRateLimitStore, RateLimitStore, RateLimiter, RedisRateLimitStore};
