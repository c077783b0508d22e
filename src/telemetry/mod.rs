//! Latency telemetry: per-endpoint sample series, counters, slow-request
//! buffer and the statistics derived from them.

pub mod dispatch;
pub mod recorder;
pub mod stats;

pub use dispatch::TelemetrySink;
pub use recorder::{
    PerformanceRecorder, RecorderConfig, RequestMeta, RequestRecord, SlowRequest,
};
pub use stats::{EndpointStats, LatencySummary, PerformanceRating, PerformanceStats};
