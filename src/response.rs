use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::to_datetime;
use crate::rate_limiter::Admission;

pub const X_RESPONSE_TIME: HeaderName = HeaderName::from_static("x-response-time");
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
pub const X_CACHE_TTL: HeaderName = HeaderName::from_static("x-cache-ttl");
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Success envelope shared by every JSON endpoint. The response cache keys
/// its "structurally successful" check on the `success` flag.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }
}

/// Body of a 429 produced by the rate limiter.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitExceeded {
    pub success: bool,
    pub error: String,
    pub code: String,
    pub retry_after: u64,
    pub limit: usize,
    pub remaining: usize,
    pub reset_time: DateTime<Utc>,
}

impl RateLimitExceeded {
    pub fn new(limit: usize, retry_after: u64, reset_at_millis: u64) -> Self {
        Self {
            success: false,
            error: "Too many requests, please try again later.".to_string(),
            code: "RATE_LIMIT_EXCEEDED".to_string(),
            retry_after,
            limit,
            remaining: 0,
            reset_time: to_datetime(reset_at_millis),
        }
    }
}

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after;
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(self)).into_response();
        response
            .headers_mut()
            .insert(axum::http::header::RETRY_AFTER, HeaderValue::from(retry_after));
        response
    }
}

/// Attach the `X-RateLimit-*` headers for an evaluated request.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, admission: &Admission) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(admission.limit()));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(admission.remaining()));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(admission.reset_at_millis().div_ceil(1000)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_body_shape() {
        let body = RateLimitExceeded::new(100, 60, 1_700_000_060_000);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(json["retryAfter"], 60);
        assert_eq!(json["limit"], 100);
        assert_eq!(json["remaining"], 0);
        assert_eq!(json["resetTime"], "2023-11-14T22:14:20Z");
    }

    #[test]
    fn test_rate_limit_response_status_and_retry_header() {
        let response = RateLimitExceeded::new(3, 60, 0).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "60");
    }

    #[test]
    fn test_rate_limit_headers() {
        let mut headers = HeaderMap::new();
        let admission = Admission::Admitted {
            limit: 100,
            remaining: 42,
            reset_at_millis: 1_500,
        };
        apply_rate_limit_headers(&mut headers, &admission);

        assert_eq!(headers["x-ratelimit-limit"], "100");
        assert_eq!(headers["x-ratelimit-remaining"], "42");
        assert_eq!(headers["x-ratelimit-reset"], "2");
    }

    #[test]
    fn test_api_response_envelope() {
        let json = serde_json::to_value(ApiResponse::ok(vec![1, 2])).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": [1, 2]}));
    }
}
