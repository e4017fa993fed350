use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::error::ApiError;
use crate::metrics::{RATE_LIMITED_TOTAL, REQUEST_TOTAL};
use crate::state::AppState;

// Client key for quota accounting: first hop of X-Forwarded-For when
// the gateway sits behind ingress, otherwise the peer address.
pub fn client_key(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(ip) = forwarded
            .split(',')
            .next()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
        {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

// Rate limiting middleware for the /api router. Health and metrics
// routes are mounted outside of it and never throttled.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    REQUEST_TOTAL.inc();

    let key = client_key(&request);
    let decision = state.limiter.check(&key);

    if !decision.allowed {
        RATE_LIMITED_TOTAL.inc();
        warn!(client = %key, "rate limit exceeded");

        let retry_after = decision.reset_after.as_secs().max(1);
        let mut response = ApiError::RateLimited { retry_after }.into_response();
        let headers = response.headers_mut();
        headers.insert("x-ratelimit-limit", decision.limit.into());
        headers.insert("x-ratelimit-remaining", 0u32.into());
        return response;
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", decision.limit.into());
    headers.insert("x-ratelimit-remaining", decision.remaining.into());
    response
}
