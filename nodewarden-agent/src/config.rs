//! Agent configuration from environment variables
//!
//! Required: WARDEN_TOKEN (bearer credential issued at node creation).
//! Optional: WARDEN_BASE_URL, WARDEN_INTERVAL (heartbeat cadence, seconds).

use anyhow::{bail, Result};

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub base_url: String,
    pub token: String,
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("WARDEN_TOKEN").unwrap_or_default();
        if token.is_empty() {
            bail!("WARDEN_TOKEN is not set");
        }

        let base_url = std::env::var("WARDEN_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());

        let interval_secs = std::env::var("WARDEN_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(effective_interval)
            .unwrap_or(5);

        Ok(Self {
            base_url,
            token,
            interval_secs,
            request_timeout_secs: request_timeout_for(interval_secs),
        })
    }

    pub fn heartbeat_url(&self) -> String {
        format!("{}/api/heartbeat", self.base_url.trim_end_matches('/'))
    }
}

/// Intervals below 2s leave no room for a timeout strictly shorter than
/// the cycle, so they are floored
fn effective_interval(requested_secs: u64) -> u64 {
    requested_secs.max(2)
}

/// Client timeout strictly below the heartbeat interval so a hung
/// connection can never outlive its cycle
fn request_timeout_for(interval_secs: u64) -> u64 {
    interval_secs.saturating_sub(2).clamp(1, 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_timeout_strictly_below_interval() {
        assert_eq!(request_timeout_for(5), 3);
        assert_eq!(request_timeout_for(10), 3);
        assert_eq!(request_timeout_for(2), 1);
        for interval in [2, 3, 5, 10, 60] {
            assert!(request_timeout_for(interval) < interval);
        }
    }

    #[test]
    fn test_sub_two_second_intervals_are_floored() {
        assert_eq!(effective_interval(0), 2);
        assert_eq!(effective_interval(1), 2);
        assert_eq!(effective_interval(5), 5);
        let floored = effective_interval(1);
        assert!(request_timeout_for(floored) < floored);
    }

    #[test]
    fn test_heartbeat_url_handles_trailing_slash() {
        let config = AgentConfig {
            base_url: "http://kernel:8080/".to_string(),
            token: "t".to_string(),
            interval_secs: 5,
            request_timeout_secs: 3,
        };
        assert_eq!(config.heartbeat_url(), "http://kernel:8080/api/heartbeat");
    }
}
