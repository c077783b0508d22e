use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Instant;

use super::stats::{
    format_percentage, ratio, EndpointStats, LatencySummary, PerformanceRating, PerformanceStats,
    StatsSummary,
};
use crate::clock::to_datetime;
use crate::config::Config;
use crate::endpoint::EndpointKey;

/// How many of the newest slow requests `stats()` includes.
const RECENT_SLOW_IN_STATS: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct RecorderConfig {
    pub slow_threshold_ms: u64,
    pub sample_capacity: usize,
    pub slow_capacity: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            slow_threshold_ms: 1_000,
            sample_capacity: 1_000,
            slow_capacity: 100,
        }
    }
}

impl From<&Config> for RecorderConfig {
    fn from(config: &Config) -> Self {
        Self {
            slow_threshold_ms: config.slow_threshold_ms,
            sample_capacity: config.sample_series_capacity,
            slow_capacity: config.slow_buffer_capacity,
        }
    }
}

/// Request context captured alongside a measurement.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub method: String,
    pub url: String,
    pub caller: String,
    pub request_id: Option<String>,
}

/// One completed request, as handed to the recorder.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub endpoint: EndpointKey,
    pub duration_ms: f64,
    pub status: u16,
    pub meta: RequestMeta,
    /// Body size when it could be determined.
    pub response_size: Option<u64>,
    pub completed_at_millis: u64,
}

/// A request that exceeded the slow threshold. Never mutated after capture.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowRequest {
    pub endpoint: String,
    pub duration_ms: f64,
    pub status_code: u16,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub url: String,
    pub caller: String,
    pub response_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Default)]
struct EndpointState {
    samples: VecDeque<f64>,
    status_counts: BTreeMap<u16, u64>,
    requests: u64,
    errors: u64,
}

#[derive(Default)]
struct Inner {
    endpoints: HashMap<EndpointKey, EndpointState>,
    slow_requests: VecDeque<SlowRequest>,
}

/// Copy of one endpoint taken under the lock; derived values are computed
/// from this after the lock is released.
struct EndpointSnapshot {
    key: EndpointKey,
    samples: Vec<f64>,
    status_counts: BTreeMap<u16, u64>,
    requests: u64,
    errors: u64,
}

/// Latency telemetry sink.
///
/// Recording never fails and never blocks on anything but the internal lock,
/// which is only held for the bounded in-memory update.
pub struct PerformanceRecorder {
    config: RecorderConfig,
    started_at: Instant,
    inner: Mutex<Inner>,
}

impl PerformanceRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            started_at: Instant::now(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn config(&self) -> RecorderConfig {
        self.config
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn record_request(&self, record: RequestRecord) {
        let is_slow = record.duration_ms > self.config.slow_threshold_ms as f64;

        {
            let mut inner = self.inner.lock();
            let state = inner.endpoints.entry(record.endpoint.clone()).or_default();

            state.samples.push_back(record.duration_ms);
            while state.samples.len() > self.config.sample_capacity {
                state.samples.pop_front();
            }

            state.requests += 1;
            if record.status >= 400 {
                state.errors += 1;
            }
            *state.status_counts.entry(record.status).or_insert(0) += 1;

            if is_slow {
                inner.slow_requests.push_back(SlowRequest {
                    endpoint: record.endpoint.to_string(),
                    duration_ms: record.duration_ms,
                    status_code: record.status,
                    timestamp: to_datetime(record.completed_at_millis),
                    method: record.meta.method.clone(),
                    url: record.meta.url.clone(),
                    caller: record.meta.caller.clone(),
                    response_size: record.response_size,
                    request_id: record.meta.request_id.clone(),
                });
                while inner.slow_requests.len() > self.config.slow_capacity {
                    inner.slow_requests.pop_front();
                }
            }
        }

        if is_slow {
            tracing::warn!(
                target: "reqguard::telemetry",
                endpoint = %record.endpoint,
                duration_ms = format_args!("{:.2}", record.duration_ms),
                status = record.status,
                url = %record.meta.url,
                caller = %record.meta.caller,
                request_id = record.meta.request_id.as_deref().unwrap_or("-"),
                "Slow request detected"
            );
        }
    }

    /// Aggregates for every endpoint with at least one sample.
    pub fn stats(&self) -> PerformanceStats {
        let (snapshots, recent_slow, slow_count) = {
            let inner = self.inner.lock();
            let snapshots: Vec<EndpointSnapshot> = inner
                .endpoints
                .iter()
                .filter(|(_, state)| !state.samples.is_empty())
                .map(|(key, state)| EndpointSnapshot {
                    key: key.clone(),
                    samples: state.samples.iter().copied().collect(),
                    status_counts: state.status_counts.clone(),
                    requests: state.requests,
                    errors: state.errors,
                })
                .collect();
            let recent_slow: Vec<SlowRequest> = inner
                .slow_requests
                .iter()
                .rev()
                .take(RECENT_SLOW_IN_STATS)
                .cloned()
                .collect();
            (snapshots, recent_slow, inner.slow_requests.len())
        };

        let mut endpoints = BTreeMap::new();
        let mut total_requests = 0;
        let mut total_errors = 0;

        for snapshot in snapshots {
            let Some(latency) = LatencySummary::from_samples(&snapshot.samples) else {
                continue;
            };
            total_requests += snapshot.requests;
            total_errors += snapshot.errors;

            let error_ratio = ratio(snapshot.errors, snapshot.requests);
            let name = snapshot.key.to_string();
            endpoints.insert(
                name.clone(),
                EndpointStats {
                    endpoint: name,
                    requests: snapshot.requests,
                    errors: snapshot.errors,
                    error_rate: format_percentage(error_ratio),
                    error_ratio,
                    latency,
                    status_codes: snapshot.status_counts,
                    samples: snapshot.samples.len(),
                    performance: PerformanceRating::classify(error_ratio, latency.mean),
                },
            );
        }

        let overall_ratio = ratio(total_errors, total_requests);

        PerformanceStats {
            generated_at: Utc::now(),
            summary: StatsSummary {
                total_requests,
                total_errors,
                error_rate: format_percentage(overall_ratio),
                error_ratio: overall_ratio,
                tracked_endpoints: endpoints.len(),
                slow_requests: slow_count,
                slow_request_capacity: self.config.slow_capacity,
                slow_threshold_ms: self.config.slow_threshold_ms,
            },
            endpoints,
            recent_slow_requests: recent_slow,
        }
    }

    /// All retained slow requests, oldest first.
    pub fn slow_requests(&self) -> Vec<SlowRequest> {
        self.inner.lock().slow_requests.iter().cloned().collect()
    }

    /// Drop every series, counter and slow record in one step.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::default();
        tracing::info!(target: "reqguard::telemetry", "Performance metrics reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn recorder(sample_capacity: usize, slow_capacity: usize) -> PerformanceRecorder {
        PerformanceRecorder::new(RecorderConfig {
            slow_threshold_ms: 1_000,
            sample_capacity,
            slow_capacity,
        })
    }

    fn record(route: &str, duration_ms: f64, status: u16) -> RequestRecord {
        RequestRecord {
            endpoint: EndpointKey::new(&Method::GET, route),
            duration_ms,
            status,
            meta: RequestMeta {
                method: "GET".to_string(),
                url: route.to_string(),
                caller: "ip:127.0.0.1 (-)".to_string(),
                request_id: None,
            },
            response_size: Some(128),
            completed_at_millis: 1_700_000_000_000,
        }
    }

    fn samples(recorder: &PerformanceRecorder, key: &EndpointKey) -> Vec<f64> {
        recorder.inner.lock().endpoints[key].samples.iter().copied().collect()
    }

    #[test]
    fn test_sample_series_keeps_most_recent() {
        let recorder = recorder(5, 10);
        for i in 0..12 {
            recorder.record_request(record("/api/lessons", i as f64, 200));
        }

        let key = EndpointKey::new(&Method::GET, "/api/lessons");
        assert_eq!(samples(&recorder, &key), vec![7.0, 8.0, 9.0, 10.0, 11.0]);

        let stats = recorder.stats();
        let endpoint = &stats.endpoints["GET /api/lessons"];
        assert_eq!(endpoint.requests, 12);
        assert_eq!(endpoint.samples, 5);
    }

    #[test]
    fn test_series_below_capacity_in_arrival_order() {
        let recorder = recorder(1000, 10);
        for d in [30.0, 10.0, 20.0] {
            recorder.record_request(record("/api/lessons", d, 200));
        }
        let key = EndpointKey::new(&Method::GET, "/api/lessons");
        assert_eq!(samples(&recorder, &key), vec![30.0, 10.0, 20.0]);
    }

    #[test]
    fn test_stats_percentiles_and_rating() {
        let recorder = recorder(1000, 10);
        for d in (1..=10).map(|i| i as f64 * 10.0) {
            recorder.record_request(record("/api/lessons", d, 200));
        }

        let stats = recorder.stats();
        let endpoint = &stats.endpoints["GET /api/lessons"];
        assert_eq!(endpoint.latency.p50, 60.0);
        assert_eq!(endpoint.error_rate, "0.00%");
        assert_eq!(endpoint.performance, PerformanceRating::Excellent);
    }

    #[test]
    fn test_error_counting_and_status_histogram() {
        let recorder = recorder(1000, 10);
        recorder.record_request(record("/api/payments", 10.0, 200));
        recorder.record_request(record("/api/payments", 10.0, 404));
        recorder.record_request(record("/api/payments", 10.0, 500));
        recorder.record_request(record("/api/payments", 10.0, 200));

        let stats = recorder.stats();
        let endpoint = &stats.endpoints["GET /api/payments"];
        assert_eq!(endpoint.errors, 2);
        assert_eq!(endpoint.error_rate, "50.00%");
        assert_eq!(endpoint.status_codes[&200], 2);
        assert_eq!(endpoint.status_codes[&404], 1);
        assert_eq!(endpoint.performance, PerformanceRating::Poor);
        assert_eq!(stats.summary.total_errors, 2);
    }

    #[test]
    fn test_average_exactly_one_second_is_good() {
        let recorder = recorder(1000, 10);
        recorder.record_request(record("/api/lessons", 1000.0, 200));

        let stats = recorder.stats();
        assert_eq!(
            stats.endpoints["GET /api/lessons"].performance,
            PerformanceRating::Good
        );
        // Exactly at the threshold is not slow.
        assert!(recorder.slow_requests().is_empty());
    }

    #[test]
    fn test_slow_buffer_is_bounded_fifo() {
        let recorder = recorder(1000, 3);
        for i in 0..5 {
            recorder.record_request(record(&format!("/api/slow/{}", i), 1500.0 + i as f64, 200));
        }

        let slow = recorder.slow_requests();
        assert_eq!(slow.len(), 3);
        assert_eq!(slow[0].duration_ms, 1502.0);
        assert_eq!(slow[2].duration_ms, 1504.0);
        assert_eq!(recorder.stats().summary.slow_requests, 3);
    }

    #[test]
    fn test_slow_record_serialization() {
        let recorder = recorder(1000, 3);
        recorder.record_request(record("/api/lessons", 2500.0, 503));

        let json = serde_json::to_value(&recorder.slow_requests()[0]).unwrap();
        assert_eq!(json["endpoint"], "GET /api/lessons");
        assert_eq!(json["statusCode"], 503);
        assert_eq!(json["responseSize"], 128);
        assert!(json.get("requestId").is_none());
    }

    #[test]
    fn test_reset_clears_everything() {
        let recorder = recorder(1000, 10);
        recorder.record_request(record("/api/lessons", 5000.0, 500));
        recorder.reset();

        let stats = recorder.stats();
        assert!(stats.endpoints.is_empty());
        assert_eq!(stats.summary.total_requests, 0);
        assert!(recorder.slow_requests().is_empty());
    }

    #[test]
    fn test_concurrent_recording_respects_bound() {
        use std::sync::Arc;
        use std::thread;

        let recorder = Arc::new(recorder(100, 10));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let recorder = Arc::clone(&recorder);
                thread::spawn(move || {
                    for i in 0..500 {
                        recorder.record_request(record("/api/lessons", i as f64, 200));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = recorder.stats();
        let endpoint = &stats.endpoints["GET /api/lessons"];
        assert_eq!(endpoint.requests, 2000);
        assert_eq!(endpoint.samples, 100);
    }
}
