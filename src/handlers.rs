use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::cache::{CacheStats, ResponseCache};
use crate::clock::Clock;
use crate::config::Config;
use crate::health::HealthChecker;
use crate::rate_limiter::{RateLimitRule, SlidingWindowLimiter};
use crate::report::detailed_report;
use crate::response::{ApiResponse, MessageResponse};
use crate::telemetry::{PerformanceRecorder, RecorderConfig, TelemetrySink};

/// Shared application state
pub type SharedState = Arc<AppState>;

/// Composition root for the middleware components. Each component owns its
/// own state; nothing here is a process-wide singleton.
pub struct AppState {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub recorder: Arc<PerformanceRecorder>,
    pub telemetry: TelemetrySink,
    pub cache: Arc<ResponseCache>,
    pub mobile_limiter: Arc<SlidingWindowLimiter>,
}

impl AppState {
    /// Build every component from configuration and start the telemetry
    /// worker. Must be called inside a Tokio runtime.
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> SharedState {
        let recorder = Arc::new(PerformanceRecorder::new(RecorderConfig::from(&config)));
        let (telemetry, _worker) = TelemetrySink::spawn(Arc::clone(&recorder));
        let cache = Arc::new(ResponseCache::new(
            config.cache_ttl(),
            config.cache_capacity,
            config.cache_exclude_paths.clone(),
        ));
        let mobile_limiter = Arc::new(SlidingWindowLimiter::new(config.rate_limit_rule()));

        Arc::new(Self {
            config,
            clock,
            recorder,
            telemetry,
            cache,
            mobile_limiter,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub rule: RateLimitRule,
    pub tracked_identifiers: usize,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub service: String,
    pub version: String,
}

/// Performance statistics for every observed endpoint
pub async fn get_performance_stats(State(state): State<SharedState>) -> impl IntoResponse {
    ApiResponse::ok(state.recorder.stats())
}

/// Statistics plus process information and recommendations
pub async fn get_performance_report(State(state): State<SharedState>) -> impl IntoResponse {
    ApiResponse::ok(detailed_report(&state.recorder))
}

/// Clear all recorded performance data
pub async fn reset_performance(State(state): State<SharedState>) -> impl IntoResponse {
    state.recorder.reset();
    Json(MessageResponse::ok("Performance metrics reset"))
}

pub async fn get_cache_stats(State(state): State<SharedState>) -> impl IntoResponse {
    ApiResponse::<CacheStats>::ok(state.cache.stats())
}

pub async fn clear_cache(State(state): State<SharedState>) -> impl IntoResponse {
    state.cache.clear();
    tracing::info!(target: "reqguard::cache", "Response cache cleared");
    Json(MessageResponse::ok("Response cache cleared"))
}

pub async fn get_rate_limit_status(State(state): State<SharedState>) -> impl IntoResponse {
    ApiResponse::ok(RateLimitStatus {
        rule: state.mobile_limiter.rule(),
        tracked_identifiers: state.mobile_limiter.tracked_identifiers(),
    })
}

/// Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(HealthChecker::new(&state).check_health())
}

/// Minimal public endpoint so the binary has something to serve
pub async fn service_status() -> impl IntoResponse {
    ApiResponse::ok(ServiceStatus {
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
