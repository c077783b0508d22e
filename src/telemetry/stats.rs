use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::recorder::SlowRequest;

/// Percentiles reported per endpoint, in per-mille so index math stays integral.
const P50: usize = 500;
const P75: usize = 750;
const P90: usize = 900;
const P95: usize = 950;
const P99: usize = 990;

/// Latency distribution of one endpoint's sample series, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    /// Unrounded mean; thresholds compare against this, not `avg`.
    #[serde(skip)]
    pub mean: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl LatencySummary {
    /// Summarize a snapshot of samples. The input is copied before sorting so
    /// the recorder's series is never reordered.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
        let at = |per_mille: usize| sorted[percentile_index(sorted.len(), per_mille)];

        Some(Self {
            mean,
            avg: round2(mean),
            min: round2(sorted[0]),
            max: round2(sorted[sorted.len() - 1]),
            p50: round2(at(P50)),
            p75: round2(at(P75)),
            p90: round2(at(P90)),
            p95: round2(at(P95)),
            p99: round2(at(P99)),
        })
    }
}

/// `floor(len * percentile)`, kept inside the series.
pub fn percentile_index(len: usize, per_mille: usize) -> usize {
    (len * per_mille / 1000).min(len.saturating_sub(1))
}

/// Qualitative health of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceRating {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl PerformanceRating {
    /// First matching threshold wins; `error_ratio` is a fraction, not a percentage.
    pub fn classify(error_ratio: f64, avg_ms: f64) -> Self {
        if error_ratio > 0.05 || avg_ms > 2000.0 {
            PerformanceRating::Poor
        } else if error_ratio > 0.01 || avg_ms > 1000.0 {
            PerformanceRating::Fair
        } else if avg_ms > 500.0 {
            PerformanceRating::Good
        } else {
            PerformanceRating::Excellent
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    pub endpoint: String,
    pub requests: u64,
    pub errors: u64,
    /// Percentage string, e.g. `"2.50%"`.
    pub error_rate: String,
    #[serde(skip)]
    pub error_ratio: f64,
    pub latency: LatencySummary,
    pub status_codes: BTreeMap<u16, u64>,
    pub samples: usize,
    pub performance: PerformanceRating,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate: String,
    #[serde(skip)]
    pub error_ratio: f64,
    pub tracked_endpoints: usize,
    pub slow_requests: usize,
    pub slow_request_capacity: usize,
    pub slow_threshold_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub generated_at: DateTime<Utc>,
    pub summary: StatsSummary,
    pub endpoints: BTreeMap<String, EndpointStats>,
    pub recent_slow_requests: Vec<SlowRequest>,
}

pub fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

pub fn format_percentage(ratio: f64) -> String {
    format!("{:.2}%", ratio * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
