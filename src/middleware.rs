use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, warn};

use crate::config::RateLimitConfig;
use crate::identity::client_ip;
use crate::limiter::RateLimiter;
use crate::models::RateLimitDecision;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

// Limiter plus the quota for the routes it guards
#[derive(Clone)]
pub struct RouteLimit {
    pub limiter: RateLimiter,
    pub config: RateLimitConfig,
}

impl RouteLimit {
    pub fn new(limiter: RateLimiter, config: RateLimitConfig) -> Self {
        Self { limiter, config }
    }
}

/// Rate limiting middleware, for `axum::middleware::from_fn_with_state`.
///
/// The decision is made before the handler runs. Admitted requests get the
/// `X-RateLimit-*` headers on whatever the handler returns; rejected ones get
/// a 429 with the same headers and `Retry-After`.
pub async fn rate_limit_middleware(
    State(state): State<Arc<RouteLimit>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(request.headers());

    let decision = match state.limiter.check_rate_limit(&ip, &state.config).await {
        Ok(decision) => decision,
        Err(e) => {
            error!(ip = %ip, error = %e, "rate limiter unavailable");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": "Rate limiter unavailable" })),
            )
                .into_response();
        }
    };

    if !decision.success {
        warn!(ip = %ip, reset = decision.reset, "rate limit exceeded");
        return too_many_requests(&decision, Utc::now().timestamp_millis());
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset));
}

// 429 response for a rejected decision
pub fn too_many_requests(decision: &RateLimitDecision, now_millis: i64) -> Response {
    let retry_after = decision.retry_after_secs(now_millis);

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "error": "Too many requests. Please try again later.",
            "retryAfter": retry_after,
        })),
    )
        .into_response();

    let headers = response.headers_mut();
    apply_rate_limit_headers(headers, decision);
    headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}
