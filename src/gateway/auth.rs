//! Gateway authentication and rate limiting middleware.
//!
//! Every endpoint except `/health` requires `Authorization: Bearer <token>`;
//! WebSocket upgrades may pass the token as `?token=` instead. Comparison is
//! constant-time. A token-bucket per client IP answers 429 under abuse.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::security::token_matches;

use super::server::GatewayState;

fn query_token(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .map(str::to_string)
}

/// Bearer-token check. Skipped entirely when `gateway_auth` is off
/// (development mode) and always skipped for `/health`.
pub async fn auth_middleware(
    State(state): State<GatewayState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if request.uri().path() == "/health" || !state.settings.get().security.gateway_auth {
        return Ok(next.run(request).await);
    }

    let header_token = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let provided = header_token.or_else(|| query_token(request.uri().query()));

    match provided {
        Some(token) if token_matches(&state.token, &token) => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Per-IP token bucket; refusals answer 429.
pub async fn rate_limit_middleware(
    State(state): State<GatewayState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let ip = request
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "local".to_string());
    let limit = state.settings.get().limits.rate_limit_per_minute;
    if !state.limiter.check(&format!("http:{ip}"), limit) {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_token_extraction() {
        assert_eq!(query_token(Some("token=abc")), Some("abc".to_string()));
        assert_eq!(query_token(Some("a=1&token=xyz&b=2")), Some("xyz".to_string()));
        assert_eq!(query_token(Some("a=1")), None);
        assert_eq!(query_token(None), None);
    }
}
