//! Request pipeline stages: timing/telemetry, mobile rate limiting and the
//! GET response cache. Each stage receives the handler's response as a value.

use axum::{
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{cache_key, CacheHit, MAX_CACHEABLE_BODY_BYTES};
use crate::compression::mime_essence;
use crate::clock::Clock;
use crate::endpoint::EndpointKey;
use crate::handlers::SharedState;
use crate::identity::{caller_summary, CallerIdentity, ClientClass};
use crate::rate_limiter::{Admission, SlidingWindowLimiter};
use crate::response::{
    apply_rate_limit_headers, RateLimitExceeded, X_CACHE, X_CACHE_TTL, X_REQUEST_ID,
    X_RESPONSE_TIME,
};
use crate::telemetry::{RequestMeta, RequestRecord};

/// Times the rest of the pipeline, tags the response and queues the
/// measurement for the recorder without waiting on it.
pub async fn performance_middleware(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let endpoint = EndpointKey::from_request(&request);

    let request_id = request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert(X_REQUEST_ID, value);
    }

    let meta = RequestMeta {
        method: request.method().to_string(),
        url: request.uri().to_string(),
        caller: caller_summary(&request),
        request_id: Some(request_id.clone()),
    };

    let mut response = next.run(request).await;
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    if let Ok(value) = HeaderValue::from_str(&format!("{:.2}ms", duration_ms)) {
        response.headers_mut().insert(X_RESPONSE_TIME, value);
    }
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }

    state.telemetry.submit(RequestRecord {
        endpoint,
        duration_ms,
        status: response.status().as_u16(),
        meta,
        response_size: estimate_size(&response),
        completed_at_millis: state.clock.now_millis(),
    });

    response
}

fn estimate_size(response: &Response) -> Option<u64> {
    response.body().size_hint().exact().or_else(|| {
        response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    })
}

/// State for one mounted rate limiter.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<SlidingWindowLimiter>,
    pub clock: Arc<dyn Clock>,
}

impl RateLimitState {
    pub fn new(limiter: Arc<SlidingWindowLimiter>, clock: Arc<dyn Clock>) -> Self {
        Self { limiter, clock }
    }
}

/// Sliding-window admission for mobile clients. Other callers pass through
/// without being counted.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    if !ClientClass::from_headers(request.headers()).is_mobile() {
        return next.run(request).await;
    }

    let identity = CallerIdentity::from_request(&request);
    let admission = state
        .limiter
        .admit(&identity.key(), state.clock.now_millis());

    let mut response = match admission {
        Admission::Admitted { .. } => next.run(request).await,
        Admission::Rejected {
            limit,
            retry_after_secs,
            reset_at_millis,
        } => {
            info!(
                target: "reqguard::rate_limit",
                caller = %identity,
                method = %request.method(),
                uri = %request.uri(),
                limit,
                retry_after_secs,
                "Rate limit exceeded"
            );
            RateLimitExceeded::new(limit, retry_after_secs, reset_at_millis).into_response()
        }
    };

    apply_rate_limit_headers(response.headers_mut(), &admission);
    response
}

/// Cache-aside for eligible GET requests.
pub async fn cache_middleware(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    if !state
        .cache
        .is_eligible(request.method(), request.uri().path())
    {
        return next.run(request).await;
    }

    let key = cache_key(request.uri().path(), request.uri().query());

    if let Some(hit) = state.cache.lookup_key(&key, state.clock.now_millis()) {
        debug!(target: "reqguard::cache", key = %key, "Cache hit");
        return cached_response(hit);
    }

    let response = next.run(request).await;

    let mut response = if response.status() == StatusCode::OK
        && is_json(&response)
        && fits_in_cache(&response)
    {
        let (parts, body) = response.into_parts();
        match axum::body::to_bytes(body, MAX_CACHEABLE_BODY_BYTES as usize).await {
            Ok(bytes) => {
                let content_type = parts
                    .headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let stored = state.cache.store_key(
                    key.clone(),
                    parts.status,
                    content_type,
                    bytes.clone(),
                    state.clock.now_millis(),
                );
                debug!(target: "reqguard::cache", key = %key, stored, "Cache miss");
                Response::from_parts(parts, Body::from(bytes))
            }
            Err(err) => {
                // The body is gone at this point; nothing is stored.
                debug!(target: "reqguard::cache", key = %key, error = %err, "Failed to buffer response body");
                StatusCode::BAD_GATEWAY.into_response()
            }
        }
    } else {
        response
    };

    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static("MISS"));
    response
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| mime_essence(ct) == "application/json")
}

/// Only bodies with a known upper bound under the cap are buffered; the rest
/// stream through untouched.
fn fits_in_cache(response: &Response) -> bool {
    response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|upper| upper <= MAX_CACHEABLE_BODY_BYTES)
}

fn cached_response(hit: CacheHit) -> Response {
    let ttl_secs = hit.remaining_ttl_secs();
    let cached = hit.response;

    let mut response = Response::new(Body::from(cached.body));
    *response.status_mut() = cached.status;

    let headers = response.headers_mut();
    if let Some(value) = cached
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(X_CACHE, HeaderValue::from_static("HIT"));
    headers.insert(X_CACHE_TTL, HeaderValue::from(ttl_secs));

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedResponse;
    use axum::body::Bytes;

    #[test]
    fn test_cached_response_headers() {
        let hit = CacheHit {
            response: CachedResponse {
                body: Bytes::from_static(br#"{"success":true}"#),
                status: StatusCode::OK,
                content_type: Some("application/json".to_string()),
                stored_at_millis: 0,
            },
            remaining_ttl_millis: 120_400,
        };

        let response = cached_response(hit);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "HIT");
        assert_eq!(response.headers()["x-cache-ttl"], "120");
        assert_eq!(response.headers()["content-type"], "application/json");
    }

    #[test]
    fn test_estimate_size_from_body() {
        let response = Response::new(Body::from("hello"));
        assert_eq!(estimate_size(&response), Some(5));
    }

    #[test]
    fn test_is_json() {
        let mut response = Response::new(Body::empty());
        assert!(!is_json(&response));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert!(is_json(&response));

        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("Application/JSON"),
        );
        assert!(is_json(&response));

        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/jsonp"),
        );
        assert!(!is_json(&response));
    }

    #[test]
    fn test_only_bounded_bodies_fit_in_cache() {
        assert!(fits_in_cache(&Response::new(Body::from("{}"))));

        let large = "x".repeat(MAX_CACHEABLE_BODY_BYTES as usize + 1);
        assert!(!fits_in_cache(&Response::new(Body::from(large))));
    }
}
