//! Configuration types

use crate::{ConfigError, HealthThresholds, OrgResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// How long a worker blocks on its queue before re-checking for shutdown
    pub dequeue_timeout: Duration,
    /// Upper bound on waiting for each worker in `stop_processing`
    pub shutdown_timeout: Duration,
    /// Smoothing factor of the processing-time moving average
    pub processing_time_alpha: f64,
    /// Total queued messages above which health is `warning`
    pub warning_queue_depth: usize,
    /// Total queued messages above which health is `degraded`
    pub degraded_queue_depth: usize,
    /// Failure rate above which health is `warning`
    pub warning_failure_rate: f64,
    /// Failure rate above which health is `degraded`
    pub degraded_failure_rate: f64,
    /// Reject resolved routes not covered by the routing table
    pub enforce_routing_rules: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dequeue_timeout: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(5),
            processing_time_alpha: 0.1,
            warning_queue_depth: 50,
            degraded_queue_depth: 100,
            warning_failure_rate: 0.05,
            degraded_failure_rate: 0.10,
            enforce_routing_rules: false,
        }
    }
}

impl OrchestratorConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `ORGCHAIN_DEQUEUE_TIMEOUT_MS` (default: 1000)
    /// - `ORGCHAIN_SHUTDOWN_TIMEOUT_MS` (default: 5000)
    /// - `ORGCHAIN_PROCESSING_TIME_ALPHA` (default: 0.1)
    /// - `ORGCHAIN_WARNING_QUEUE_DEPTH` (default: 50)
    /// - `ORGCHAIN_DEGRADED_QUEUE_DEPTH` (default: 100)
    /// - `ORGCHAIN_WARNING_FAILURE_RATE` (default: 0.05)
    /// - `ORGCHAIN_DEGRADED_FAILURE_RATE` (default: 0.10)
    /// - `ORGCHAIN_ENFORCE_ROUTING_RULES` (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            dequeue_timeout: env_parse::<u64>("ORGCHAIN_DEQUEUE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.dequeue_timeout),
            shutdown_timeout: env_parse::<u64>("ORGCHAIN_SHUTDOWN_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.shutdown_timeout),
            processing_time_alpha: env_parse("ORGCHAIN_PROCESSING_TIME_ALPHA")
                .unwrap_or(defaults.processing_time_alpha),
            warning_queue_depth: env_parse("ORGCHAIN_WARNING_QUEUE_DEPTH")
                .unwrap_or(defaults.warning_queue_depth),
            degraded_queue_depth: env_parse("ORGCHAIN_DEGRADED_QUEUE_DEPTH")
                .unwrap_or(defaults.degraded_queue_depth),
            warning_failure_rate: env_parse("ORGCHAIN_WARNING_FAILURE_RATE")
                .unwrap_or(defaults.warning_failure_rate),
            degraded_failure_rate: env_parse("ORGCHAIN_DEGRADED_FAILURE_RATE")
                .unwrap_or(defaults.degraded_failure_rate),
            enforce_routing_rules: env_parse("ORGCHAIN_ENFORCE_ROUTING_RULES")
                .unwrap_or(defaults.enforce_routing_rules),
        }
    }

    /// Thresholds used to derive the health label.
    pub fn health_thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            warning_queue_depth: self.warning_queue_depth,
            degraded_queue_depth: self.degraded_queue_depth,
            warning_failure_rate: self.warning_failure_rate,
            degraded_failure_rate: self.degraded_failure_rate,
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - timeouts are positive
    /// - processing_time_alpha in (0.0, 1.0]
    /// - failure rates in [0.0, 1.0] and warning <= degraded
    /// - warning_queue_depth <= degraded_queue_depth
    pub fn validate(&self) -> OrgResult<()> {
        if self.dequeue_timeout.is_zero() {
            return Err(invalid(
                "dequeue_timeout",
                format!("{:?}", self.dequeue_timeout),
                "dequeue_timeout must be positive",
            ));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(invalid(
                "shutdown_timeout",
                format!("{:?}", self.shutdown_timeout),
                "shutdown_timeout must be positive",
            ));
        }

        if !(self.processing_time_alpha > 0.0 && self.processing_time_alpha <= 1.0) {
            return Err(invalid(
                "processing_time_alpha",
                self.processing_time_alpha.to_string(),
                "processing_time_alpha must be in (0.0, 1.0]",
            ));
        }

        for (field, rate) in [
            ("warning_failure_rate", self.warning_failure_rate),
            ("degraded_failure_rate", self.degraded_failure_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(invalid(
                    field,
                    rate.to_string(),
                    "failure rate must be between 0.0 and 1.0",
                ));
            }
        }

        if self.warning_failure_rate > self.degraded_failure_rate {
            return Err(invalid(
                "warning_failure_rate",
                self.warning_failure_rate.to_string(),
                "warning_failure_rate must not exceed degraded_failure_rate",
            ));
        }

        if self.warning_queue_depth > self.degraded_queue_depth {
            return Err(invalid(
                "warning_queue_depth",
                self.warning_queue_depth.to_string(),
                "warning_queue_depth must not exceed degraded_queue_depth",
            ));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn invalid(field: &str, value: String, reason: &str) -> crate::OrgError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    }
    .into()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OrgError;

    #[test]
    fn test_default_config_is_valid() {
        assert!(OrchestratorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_dequeue_timeout_rejected() {
        let config = OrchestratorConfig {
            dequeue_timeout: Duration::ZERO,
            ..OrchestratorConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            OrgError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "dequeue_timeout"
        ));
    }

    #[test]
    fn test_alpha_out_of_range_rejected() {
        for alpha in [0.0, -0.5, 1.5, f64::NAN] {
            let config = OrchestratorConfig {
                processing_time_alpha: alpha,
                ..OrchestratorConfig::default()
            };
            assert!(config.validate().is_err(), "alpha {alpha} should be rejected");
        }
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let config = OrchestratorConfig {
            warning_queue_depth: 200,
            ..OrchestratorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = OrchestratorConfig {
            warning_failure_rate: 0.5,
            ..OrchestratorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_health_thresholds_mirror_config() {
        let config = OrchestratorConfig::default();
        let thresholds = config.health_thresholds();
        assert_eq!(thresholds.degraded_queue_depth, 100);
        assert_eq!(thresholds.warning_queue_depth, 50);
    }
}
