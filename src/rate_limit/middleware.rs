use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{RateDecision, VisitorLimiter};
use crate::error::AppError;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Identifies the caller: first `X-Forwarded-For` hop, then `X-Real-IP`,
/// then the socket address.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, real_ip, peer) {
        (Some(ip), _, _) | (None, Some(ip), _) => ip.to_string(),
        (None, None, Some(addr)) => addr.ip().to_string(),
        (None, None, None) => "unknown".to_string(),
    }
}

/// Withdraws one token for the caller and annotates the response with the
/// quota hints. Exhausted callers get a 429 without reaching the handler.
pub async fn rate_limit(
    State(limiter): State<Arc<VisitorLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer);
    let decision = limiter.check(&key);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        warn!(client = %key, path = %request.uri().path(), "rate limit exceeded");
        let mut response = AppError::RateLimited.into_response();
        response.headers_mut().insert(
            axum::http::header::RETRY_AFTER,
            HeaderValue::from(retry_after_secs(decision.reset_after)),
        );
        response
    };

    apply_quota_headers(response.headers_mut(), &decision);
    response
}

fn retry_after_secs(reset_after: Duration) -> u64 {
    reset_after.as_secs_f64().ceil().max(1.0) as u64
}

fn apply_quota_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    let reset_at = chrono::Utc::now()
        .timestamp()
        .saturating_add(decision.reset_after.as_secs_f64().ceil() as i64);

    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_at));
}
