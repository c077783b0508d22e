//! Health signals derived from the recorder's aggregates.

use serde::Serialize;
use std::time::{Duration, Instant};
use sysinfo::{get_current_pid, ProcessesToUpdate, System};

use crate::telemetry::{PerformanceRecorder, PerformanceStats};

const HIGH_LATENCY_MS: f64 = 1000.0;
const HIGH_ENDPOINT_ERROR_RATIO: f64 = 0.05;
const HIGH_OVERALL_ERROR_RATIO: f64 = 0.01;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub pid: Option<u32>,
    /// Resident set size in bytes, when the platform reports it.
    pub memory_rss_bytes: Option<u64>,
    pub memory_virtual_bytes: Option<u64>,
    pub uptime_secs: u64,
    #[serde(with = "humantime_serde")]
    pub uptime: Duration,
}

impl SystemInfo {
    pub fn capture(started_at: Instant) -> Self {
        let uptime = Duration::from_secs(started_at.elapsed().as_secs());
        let mut info = Self {
            pid: None,
            memory_rss_bytes: None,
            memory_virtual_bytes: None,
            uptime_secs: uptime.as_secs(),
            uptime,
        };

        let Ok(pid) = get_current_pid() else {
            tracing::debug!(target: "reqguard::report", "Current pid unavailable");
            return info;
        };
        info.pid = Some(pid.as_u32());

        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        if let Some(process) = system.process(pid) {
            info.memory_rss_bytes = Some(process.memory());
            info.memory_virtual_bytes = Some(process.virtual_memory());
        }

        info
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedReport {
    #[serde(flatten)]
    pub stats: PerformanceStats,
    pub system: SystemInfo,
    pub recommendations: Vec<String>,
}

/// Stats plus process information and recommendations. Read-only.
pub fn detailed_report(recorder: &PerformanceRecorder) -> DetailedReport {
    let stats = recorder.stats();
    let recommendations = recommendations(&stats);

    DetailedReport {
        system: SystemInfo::capture(recorder.started_at()),
        stats,
        recommendations,
    }
}

pub fn recommendations(stats: &PerformanceStats) -> Vec<String> {
    let mut out = Vec::new();

    for endpoint in stats.endpoints.values() {
        if endpoint.latency.mean > HIGH_LATENCY_MS {
            out.push(format!(
                "{} has a high average response time ({:.2}ms). Consider caching, pagination or query optimization.",
                endpoint.endpoint, endpoint.latency.avg
            ));
        }
        if endpoint.error_ratio > HIGH_ENDPOINT_ERROR_RATIO {
            out.push(format!(
                "{} has a high error rate ({}). Review error handling and upstream dependencies.",
                endpoint.endpoint, endpoint.error_rate
            ));
        }
    }

    let summary = &stats.summary;
    if summary.slow_requests * 2 > summary.slow_request_capacity {
        out.push(format!(
            "{} slow requests (over {}ms) retained out of {}. Investigate the slowest endpoints.",
            summary.slow_requests, summary.slow_threshold_ms, summary.slow_request_capacity
        ));
    }
    if summary.error_ratio > HIGH_OVERALL_ERROR_RATIO {
        out.push(format!(
            "Overall error rate is {}. Check logs for recurring failures.",
            summary.error_rate
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointKey;
    use crate::telemetry::{PerformanceRating, RecorderConfig, RequestMeta, RequestRecord};
    use axum::http::Method;

    fn recorder() -> PerformanceRecorder {
        PerformanceRecorder::new(RecorderConfig {
            slow_threshold_ms: 1_000,
            sample_capacity: 100,
            slow_capacity: 4,
        })
    }

    fn record(route: &str, duration_ms: f64, status: u16) -> RequestRecord {
        RequestRecord {
            endpoint: EndpointKey::new(&Method::GET, route),
            duration_ms,
            status,
            meta: RequestMeta::default(),
            response_size: None,
            completed_at_millis: 0,
        }
    }

    #[test]
    fn test_healthy_service_has_no_recommendations() {
        let recorder = recorder();
        for _ in 0..10 {
            recorder.record_request(record("/api/lessons", 40.0, 200));
        }
        assert!(recommendations(&recorder.stats()).is_empty());
    }

    #[test]
    fn test_slow_endpoint_is_flagged() {
        let recorder = recorder();
        recorder.record_request(record("/api/reports", 1200.0, 200));

        let recs = recommendations(&recorder.stats());
        assert_eq!(recs.len(), 1);
        assert!(recs[0].starts_with("GET /api/reports has a high average response time"));
    }

    #[test]
    fn test_mean_just_over_threshold_is_flagged() {
        let recorder = recorder();
        recorder.record_request(record("/api/exports", 1000.004, 200));

        let stats = recorder.stats();
        let endpoint = &stats.endpoints["GET /api/exports"];
        assert_eq!(endpoint.performance, PerformanceRating::Fair);

        let recs = recommendations(&stats);
        assert!(recs
            .iter()
            .any(|r| r.starts_with("GET /api/exports has a high average response time")));
    }

    #[test]
    fn test_error_rates_are_flagged() {
        let recorder = recorder();
        for status in [200, 200, 500] {
            recorder.record_request(record("/api/payments", 20.0, status));
        }

        let recs = recommendations(&recorder.stats());
        assert!(recs.iter().any(|r| r.contains("GET /api/payments has a high error rate (33.33%)")));
        assert!(recs.iter().any(|r| r.starts_with("Overall error rate is 33.33%")));
    }

    #[test]
    fn test_slow_buffer_more_than_half_full() {
        let recorder = recorder();
        recorder.record_request(record("/a", 1100.0, 200));
        recorder.record_request(record("/a", 1100.0, 200));
        let recs = recommendations(&recorder.stats());
        assert!(!recs.iter().any(|r| r.contains("slow requests")));

        recorder.record_request(record("/a", 1100.0, 200));
        let recs = recommendations(&recorder.stats());
        assert!(recs.iter().any(|r| r.contains("3 slow requests")));
    }

    #[test]
    fn test_report_does_not_mutate_state() {
        let recorder = recorder();
        recorder.record_request(record("/api/lessons", 30.0, 200));

        let report = detailed_report(&recorder);
        assert_eq!(report.stats.summary.total_requests, 1);
        assert_eq!(recorder.stats().summary.total_requests, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["endpoints"]["GET /api/lessons"].is_object());
        assert!(json["system"]["uptimeSecs"].is_u64());
        assert!(json["recommendations"].is_array());
    }
}
