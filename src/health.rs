use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::handlers::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    pub cached_responses: usize,
    pub rate_limited_callers: usize,
    pub slow_requests: usize,
}

pub struct HealthChecker<'a> {
    state: &'a AppState,
}

impl<'a> HealthChecker<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    pub fn check_health(&self) -> HealthStatus {
        let uptime = self.state.recorder.started_at().elapsed().as_secs();

        HealthStatus {
            status: "healthy".to_string(),
            timestamp: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            components: ComponentStatus {
                cached_responses: self.state.cache.len(),
                rate_limited_callers: self.state.mobile_limiter.tracked_identifiers(),
                slow_requests: self.state.recorder.slow_requests().len(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use std::sync::Arc;

    #[test]
    fn test_health_status_serialization() {
        let status = HealthStatus {
            status: "healthy".to_string(),
            timestamp: 1234567890,
            version: "1.0.0".to_string(),
            uptime_seconds: 3600,
            components: ComponentStatus {
                cached_responses: 2,
                rate_limited_callers: 1,
                slow_requests: 0,
            },
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("1234567890"));
        assert!(json.contains("\"uptimeSeconds\":3600"));
    }

    #[tokio::test]
    async fn test_fresh_state_is_healthy_and_empty() {
        let state = AppState::new(Config::default(), Arc::new(ManualClock::new(0)));
        let health = HealthChecker::new(&state).check_health();

        assert_eq!(health.status, "healthy");
        assert_eq!(health.components.cached_responses, 0);
        assert_eq!(health.components.rate_limited_callers, 0);
    }
}
