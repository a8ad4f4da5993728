//! System health labels
//!
//! The orchestrator derives a coarse health label from total queue depth and
//! the routing failure rate; dashboards poll it through `system_status`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse health of the message pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLabel {
    /// Queues short and failures rare
    Healthy,
    /// Backlog or failure rate creeping up
    Warning,
    /// Backlog or failure rate past the hard threshold
    Degraded,
}

/// Thresholds for [`HealthLabel::assess`]. Comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    pub warning_queue_depth: usize,
    pub degraded_queue_depth: usize,
    pub warning_failure_rate: f64,
    pub degraded_failure_rate: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            warning_queue_depth: 50,
            degraded_queue_depth: 100,
            warning_failure_rate: 0.05,
            degraded_failure_rate: 0.10,
        }
    }
}

impl HealthLabel {
    /// Derive the label. `degraded` wins over `warning`.
    pub fn assess(total_queued: usize, failure_rate: f64, thresholds: &HealthThresholds) -> Self {
        if total_queued > thresholds.degraded_queue_depth
            || failure_rate > thresholds.degraded_failure_rate
        {
            HealthLabel::Degraded
        } else if total_queued > thresholds.warning_queue_depth
            || failure_rate > thresholds.warning_failure_rate
        {
            HealthLabel::Warning
        } else {
            HealthLabel::Healthy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLabel::Healthy => "healthy",
            HealthLabel::Warning => "warning",
            HealthLabel::Degraded => "degraded",
        }
    }
}

impl fmt::Display for HealthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assess_healthy() {
        let t = HealthThresholds::default();
        assert_eq!(HealthLabel::assess(0, 0.0, &t), HealthLabel::Healthy);
        assert_eq!(HealthLabel::assess(50, 0.05, &t), HealthLabel::Healthy);
    }

    #[test]
    fn test_assess_warning() {
        let t = HealthThresholds::default();
        assert_eq!(HealthLabel::assess(51, 0.0, &t), HealthLabel::Warning);
        assert_eq!(HealthLabel::assess(0, 0.06, &t), HealthLabel::Warning);
    }

    #[test]
    fn test_assess_degraded() {
        let t = HealthThresholds::default();
        assert_eq!(HealthLabel::assess(101, 0.0, &t), HealthLabel::Degraded);
        assert_eq!(HealthLabel::assess(0, 0.11, &t), HealthLabel::Degraded);
        assert_eq!(HealthLabel::assess(60, 0.5, &t), HealthLabel::Degraded);
    }

    #[test]
    fn test_serde_lowercase() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&HealthLabel::Degraded)?, "\"degraded\"");
        Ok(())
    }
}
