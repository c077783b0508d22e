//! Time source shared by the stateful components.
//!
//! All window, TTL and slow-request arithmetic is done in milliseconds since
//! the Unix epoch, so a reading can also be rendered as a wall-clock timestamp.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync + 'static {
    /// Milliseconds since the Unix epoch. Successive readings never decrease.
    fn now_millis(&self) -> u64;
}

/// Wall-clock anchored monotonic clock.
///
/// The epoch offset is sampled once; after that only `Instant` is consulted,
/// so NTP adjustments cannot move time backwards for the rate limiter.
#[derive(Debug, Clone)]
pub struct SystemClock {
    anchor: Instant,
    epoch_millis_at_anchor: u64,
}

impl SystemClock {
    pub fn new() -> Self {
        let epoch_millis_at_anchor = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            anchor: Instant::now(),
            epoch_millis_at_anchor,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.epoch_millis_at_anchor + self.anchor.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Render an epoch-millisecond reading as a UTC timestamp.
pub fn to_datetime(millis: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis as i64).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_never_goes_backwards() {
        let clock = SystemClock::new();
        let first = clock.now_millis();
        let second = clock.now_millis();
        assert!(second >= first);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(1_000);
        clock.advance(250);
        assert_eq!(clock.now_millis(), 1_250);
        clock.set(10);
        assert_eq!(clock.now_millis(), 10);
    }

    #[test]
    fn test_to_datetime() {
        let dt = to_datetime(0);
        assert_eq!(dt.to_rfc3339(), "1970-01-01T00:00:00+00:00");
    }
}
