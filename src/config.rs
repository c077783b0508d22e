use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use validator::Validate;

use crate::error::{GuardError, Result};
use crate::rate_limiter::RateLimitRule;

pub const DEFAULT_SLOW_THRESHOLD_MS: u64 = 1_000;
pub const DEFAULT_SAMPLE_SERIES_CAPACITY: usize = 1_000;
pub const DEFAULT_SLOW_BUFFER_CAPACITY: usize = 100;
pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;
pub const DEFAULT_CACHE_CAPACITY: usize = 500;
pub const DEFAULT_CACHE_EXCLUDE_PATHS: [&str; 4] = ["/profile", "/me", "/admin", "/health"];
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 60_000;
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: usize = 100;
pub const DEFAULT_COMPRESSION_MIN_BYTES: u64 = 1_024;

/// Startup configuration. Every option can come from the command line or
/// from the environment (a `.env` file is loaded first by the binary).
#[derive(Debug, Clone, Parser, Validate)]
#[command(name = "reqguard", version, about)]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Requests slower than this are kept in the slow-request buffer
    #[arg(long, env = "SLOW_THRESHOLD_MS", default_value_t = DEFAULT_SLOW_THRESHOLD_MS)]
    #[validate(range(min = 1))]
    pub slow_threshold_ms: u64,

    /// Latency samples retained per endpoint
    #[arg(long, env = "SAMPLE_SERIES_CAPACITY", default_value_t = DEFAULT_SAMPLE_SERIES_CAPACITY)]
    #[validate(range(min = 1))]
    pub sample_series_capacity: usize,

    /// Slow-request records retained
    #[arg(long, env = "SLOW_BUFFER_CAPACITY", default_value_t = DEFAULT_SLOW_BUFFER_CAPACITY)]
    #[validate(range(min = 1))]
    pub slow_buffer_capacity: usize,

    /// Lifetime of a cached GET response
    #[arg(long, env = "CACHE_TTL_MS", default_value_t = DEFAULT_CACHE_TTL_MS)]
    #[validate(range(min = 1))]
    pub cache_ttl_ms: u64,

    /// Maximum number of cached responses
    #[arg(long, env = "CACHE_CAPACITY", default_value_t = DEFAULT_CACHE_CAPACITY)]
    #[validate(range(min = 1))]
    pub cache_capacity: usize,

    /// Path substrings that are never cached (comma separated)
    #[arg(
        long,
        env = "CACHE_EXCLUDE_PATHS",
        value_delimiter = ',',
        default_values_t = DEFAULT_CACHE_EXCLUDE_PATHS.map(String::from)
    )]
    pub cache_exclude_paths: Vec<String>,

    /// Sliding window length for the mobile rate limiter
    #[arg(long, env = "RATE_LIMIT_WINDOW_MS", default_value_t = DEFAULT_RATE_LIMIT_WINDOW_MS)]
    #[validate(range(min = 1))]
    pub rate_limit_window_ms: u64,

    /// Requests admitted per caller within one window
    #[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value_t = DEFAULT_RATE_LIMIT_MAX_REQUESTS)]
    #[validate(range(min = 1))]
    pub rate_limit_max_requests: usize,

    /// Responses at or below this size are sent uncompressed
    #[arg(long, env = "COMPRESSION_MIN_BYTES", default_value_t = DEFAULT_COMPRESSION_MIN_BYTES)]
    pub compression_min_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_level: "info".to_string(),
            slow_threshold_ms: DEFAULT_SLOW_THRESHOLD_MS,
            sample_series_capacity: DEFAULT_SAMPLE_SERIES_CAPACITY,
            slow_buffer_capacity: DEFAULT_SLOW_BUFFER_CAPACITY,
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_exclude_paths: DEFAULT_CACHE_EXCLUDE_PATHS.map(String::from).to_vec(),
            rate_limit_window_ms: DEFAULT_RATE_LIMIT_WINDOW_MS,
            rate_limit_max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            compression_min_bytes: DEFAULT_COMPRESSION_MIN_BYTES,
        }
    }
}

impl Config {
    /// Parse command line and environment, then validate.
    pub fn load() -> Result<Self> {
        Config::parse().validated()
    }

    /// Reject values that would leave a component unusable. A failure here
    /// means the deployment is misconfigured, so callers abort startup.
    pub fn validated(self) -> Result<Self> {
        self.validate()
            .map_err(|e| GuardError::Config(e.to_string()))?;

        if self.cache_exclude_paths.iter().any(|p| p.trim().is_empty()) {
            return Err(GuardError::Config(
                "cache exclude paths must not contain empty entries".to_string(),
            ));
        }

        Ok(self)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn rate_limit_rule(&self) -> RateLimitRule {
        RateLimitRule::new(
            Duration::from_millis(self.rate_limit_window_ms),
            self.rate_limit_max_requests,
        )
    }
}
