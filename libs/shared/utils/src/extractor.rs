use std::net::SocketAddr;

use axum::http::HeaderMap;
use headers::{authorization::Bearer, Authorization, HeaderMapExt};

use shared_models::error::AppError;

/// Pulls the bearer credential out of the `Authorization` header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    if !headers.contains_key(axum::http::header::AUTHORIZATION) {
        return Err(AppError::Unauthorized("Missing authorization header".to_string()));
    }

    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization header format".to_string()))
}

/// Address used to bucket anonymous callers. The edge proxy appends the
/// connecting address to `x-forwarded-for`, so only the last hop is trusted;
/// earlier hops are whatever the client sent. Without the header the socket
/// peer is used.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.rsplit(',').next())
        .map(|addr| addr.trim().to_string())
        .filter(|addr| !addr.is_empty())
        .or_else(|| peer.map(|peer| peer.ip().to_string()))
}
