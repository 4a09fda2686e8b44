//! Orchestrator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use optout_messaging::PayloadLimits;

use crate::error::CoreError;
use crate::rate_limit::{RateLimiter, MAX_ATTEMPTS, MIN_ATTEMPT_INTERVAL};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Minimum gap between decline attempts
    pub min_attempt_interval_ms: u64,
    /// Attempt ceiling per page load
    pub max_attempts: u32,
    /// How many ancestors may lend cookie context to an element
    pub ancestor_depth: usize,
    /// Probes per vendor API before giving up
    pub probe_attempts: u32,
    /// First probe retry delay, doubled on each further attempt
    pub probe_base_delay_ms: u64,
    /// Delay before a mutation-triggered rescan
    pub rescan_delay_ms: u64,
    pub rescan_jitter_ms: u64,
    /// Delay before a message-triggered rescan
    pub message_delay_ms: u64,
    pub message_jitter_ms: u64,
    /// Cap on strings taken from cross-frame messages
    pub max_field_len: usize,
    pub max_payload_bytes: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_attempt_interval_ms: MIN_ATTEMPT_INTERVAL.as_millis() as u64,
            max_attempts: MAX_ATTEMPTS,
            ancestor_depth: 5,
            probe_attempts: 5,
            probe_base_delay_ms: 250,
            rescan_delay_ms: 400,
            rescan_jitter_ms: 400,
            message_delay_ms: 300,
            message_jitter_ms: 500,
            max_field_len: 100,
            max_payload_bytes: 8192,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.probe_attempts == 0 {
            return Err(CoreError::Config("probe_attempts must be at least 1".to_string()));
        }
        if self.max_field_len == 0 {
            return Err(CoreError::Config("max_field_len must be at least 1".to_string()));
        }
        if self.max_payload_bytes < 64 {
            return Err(CoreError::Config("max_payload_bytes must be at least 64".to_string()));
        }
        Ok(())
    }

    /// The configuration actually enforced: the rate limit may be tightened,
    /// never relaxed.
    pub fn effective(&self) -> Self {
        let mut config = self.clone();
        config.min_attempt_interval_ms = config
            .min_attempt_interval_ms
            .max(MIN_ATTEMPT_INTERVAL.as_millis() as u64);
        config.max_attempts = config.max_attempts.min(MAX_ATTEMPTS);
        config
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(
            Duration::from_millis(self.min_attempt_interval_ms),
            self.max_attempts,
        )
    }

    pub fn payload_limits(&self) -> PayloadLimits {
        PayloadLimits {
            max_bytes: self.max_payload_bytes,
            max_field_len: self.max_field_len,
            ..PayloadLimits::default()
        }
    }

    pub fn probe_base_delay(&self) -> Duration {
        Duration::from_millis(self.probe_base_delay_ms)
    }
}
