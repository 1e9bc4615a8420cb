// =====================================================================================
// ADMISSION GATE - IDENTITY, ROLE AND RATE LIMIT CHECKS
// =====================================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};
use chrono::Utc;
use tracing::debug;

use shared_config::AppConfig;
use shared_models::auth::{Identity, Role};
use shared_models::error::{AppError, ErrorRecord};
use shared_utils::extractor::{client_address, extract_bearer_token};
use shared_utils::jwt::verify_credential;

use crate::models::{EventLogEntry, RateLimitProfile};
use crate::services::{EventLogService, RateLimiter};

/// What a route requires before its handler runs.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    pub profile: RateLimitProfile,
    pub roles: &'static [Role],
    pub authenticated: bool,
}

impl AdmissionPolicy {
    pub fn authenticated(profile: RateLimitProfile) -> Self {
        Self {
            profile,
            roles: &[],
            authenticated: true,
        }
    }

    /// No credential; the bucket is keyed by client address.
    pub fn anonymous(profile: RateLimitProfile) -> Self {
        Self {
            profile,
            roles: &[],
            authenticated: false,
        }
    }

    pub fn require(mut self, roles: &'static [Role]) -> Self {
        self.roles = roles;
        self
    }
}

pub struct AdmissionGate {
    jwt_secret: String,
    limiter: RateLimiter,
    events: EventLogService,
}

impl AdmissionGate {
    pub fn new(config: &AppConfig, limiter: RateLimiter) -> Self {
        Self {
            jwt_secret: config.supabase_jwt_secret.clone(),
            limiter,
            events: EventLogService::new(config),
        }
    }

    pub fn events(&self) -> &EventLogService {
        &self.events
    }

    pub fn identify(&self, headers: &HeaderMap, now: i64) -> Result<Identity, AppError> {
        let token = extract_bearer_token(headers)?;
        verify_credential(&token, &self.jwt_secret, now).map_err(AppError::Unauthorized)
    }

    /// Resolves the caller, checks its role, then counts the attempt against
    /// the policy's bucket. The counter moves whether or not the handler
    /// later succeeds.
    pub async fn admit_at(
        &self,
        policy: &AdmissionPolicy,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        now: i64,
    ) -> Result<Option<Identity>, AppError> {
        let identity = if policy.authenticated {
            let identity = self.identify(headers, now)?;
            if !policy.roles.is_empty() && !policy.roles.contains(&identity.role()) {
                return Err(AppError::Forbidden(format!(
                    "Role {} may not perform this action",
                    identity.role()
                )));
            }
            Some(identity)
        } else {
            None
        };

        let identity_key = match &identity {
            Some(identity) => identity.tenant_key(),
            None => client_address(headers, peer).unwrap_or_else(|| "anon".to_string()),
        };

        if !self.limiter.acquire_profile_at(policy.profile, &identity_key, now).await {
            return Err(AppError::RateLimited(format!(
                "Too many {} requests, try again later",
                policy.profile.name()
            )));
        }

        debug!("Admitted {} on {} profile", identity_key, policy.profile.name());
        Ok(identity)
    }
}

/// Middleware state: the shared gate plus the policy of the routes it wraps.
#[derive(Clone)]
pub struct Admission {
    gate: Arc<AdmissionGate>,
    policy: AdmissionPolicy,
}

impl Admission {
    pub fn new(gate: Arc<AdmissionGate>, policy: AdmissionPolicy) -> Self {
        Self { gate, policy }
    }
}

/// Wraps every route of `router` in the admission check for `policy`.
pub fn admitted<S>(router: Router<S>, gate: &Arc<AdmissionGate>, policy: AdmissionPolicy) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(axum::middleware::from_fn_with_state(
        Admission::new(gate.clone(), policy),
        admission_middleware,
    ))
}

pub(crate) fn function_name(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}

pub async fn admission_middleware(
    State(admission): State<Admission>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let function = function_name(&request);
    let now = Utc::now().timestamp();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let (identity_key, response) = match admission
        .gate
        .admit_at(&admission.policy, request.headers(), peer, now)
        .await
    {
        Ok(identity) => {
            let identity_key = identity.as_ref().map(Identity::tenant_key);
            if let Some(identity) = identity {
                request.extensions_mut().insert(identity);
            }
            (identity_key, next.run(request).await)
        }
        Err(e) => (None, e.into_response()),
    };

    if let Some(record) = response.extensions().get::<ErrorRecord>() {
        admission
            .gate
            .events
            .record_detached(EventLogEntry::from_error(&function, identity_key, record));
    }

    response
}
