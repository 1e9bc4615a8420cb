// =====================================================================================
// SECURITY CELL - ADMISSION CONTROL
// =====================================================================================
//
// Every request passes through here before reaching a domain handler:
// - bearer credential resolved into an Identity
// - role requirement per route
// - fixed-window rate limiting per (profile, identity)
// - shared-secret guard for cron sweeps
// - error responses written to the event log
//
// =====================================================================================

pub mod admission;
pub mod cron;
pub mod models;
pub mod services;

pub use admission::{admission_middleware, admitted, Admission, AdmissionGate, AdmissionPolicy};
pub use cron::{cron_guarded, cron_secret_middleware, CronGuard, CRON_SECRET_HEADER};
pub use models::{EventLevel, EventLogEntry, RateLimitProfile, RateLimitStoreError};
pub use services::{EventLogService, InMemoryRateLimitStore, RateLimitStore, RateLimiter, RedisRateLimitStore};
