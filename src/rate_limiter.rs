use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Limits applied by one mounted limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub max_requests: usize,
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 100,
        }
    }
}

impl RateLimitRule {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
        }
    }

    pub fn window_millis(&self) -> u64 {
        self.window.as_millis() as u64
    }

    /// Seconds a rejected caller is told to wait: the window rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        self.window_millis().div_ceil(1000)
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted {
        limit: usize,
        remaining: usize,
        reset_at_millis: u64,
    },
    Rejected {
        limit: usize,
        retry_after_secs: u64,
        reset_at_millis: u64,
    },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }

    pub fn limit(&self) -> usize {
        match self {
            Admission::Admitted { limit, .. } | Admission::Rejected { limit, .. } => *limit,
        }
    }

    pub fn remaining(&self) -> usize {
        match self {
            Admission::Admitted { remaining, .. } => *remaining,
            Admission::Rejected { .. } => 0,
        }
    }

    pub fn reset_at_millis(&self) -> u64 {
        match self {
            Admission::Admitted {
                reset_at_millis, ..
            }
            | Admission::Rejected {
                reset_at_millis, ..
            } => *reset_at_millis,
        }
    }
}

/// Per-identifier sliding-window admission control.
///
/// Each identifier owns the timestamps of its admitted requests inside the
/// trailing window. Purge, count and append happen under one lock so two
/// concurrent callers can never both take the last slot. Identifiers that go
/// idle keep their (empty or stale) entry in the map; nothing sweeps them.
pub struct SlidingWindowLimiter {
    rule: RateLimitRule,
    windows: Mutex<HashMap<String, VecDeque<u64>>>,
}

impl SlidingWindowLimiter {
    pub fn new(rule: RateLimitRule) -> Self {
        Self {
            rule,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn rule(&self) -> RateLimitRule {
        self.rule
    }

    pub fn admit(&self, identifier: &str, now_millis: u64) -> Admission {
        let window = self.rule.window_millis();
        let limit = self.rule.max_requests;
        // Before the first full window has elapsed nothing can be stale.
        let window_start = now_millis.checked_sub(window);
        let reset_at_millis = now_millis + window;

        let mut windows = self.windows.lock();
        let timestamps = windows.entry(identifier.to_string()).or_default();

        // Timestamps arrive in order, so stale ones sit at the front.
        while timestamps
            .front()
            .zip(window_start)
            .is_some_and(|(&stamp, start)| stamp <= start)
        {
            timestamps.pop_front();
        }

        if timestamps.len() >= limit {
            return Admission::Rejected {
                limit,
                retry_after_secs: self.rule.retry_after_secs(),
                reset_at_millis,
            };
        }

        timestamps.push_back(now_millis);

        Admission::Admitted {
            limit,
            remaining: limit - timestamps.len(),
            reset_at_millis,
        }
    }

    /// Number of identifiers ever seen by this limiter.
    pub fn tracked_identifiers(&self) -> usize {
        self.windows.lock().len()
    }
}
