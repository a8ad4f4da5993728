//! Per-agent performance counters

use chrono::Utc;
use orgchain_core::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counters kept by the orchestrator for each registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Messages dequeued for this agent
    pub messages_received: u64,
    /// Messages processed without error
    pub tasks_completed: u64,
    /// `process_message` errors or panics
    pub processing_failures: u64,
    /// Follow-up messages the agent emitted
    pub responses_emitted: u64,
    /// Moving average of processing time in milliseconds
    pub average_response_time_ms: f64,
    pub last_active: Option<Timestamp>,
}

impl AgentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A message was taken off the agent's queue.
    pub fn record_received(&mut self) {
        self.messages_received += 1;
        self.last_active = Some(Utc::now());
    }

    /// Processing finished successfully.
    pub fn record_completed(&mut self, elapsed: Duration, responded: bool, alpha: f64) {
        self.tasks_completed += 1;
        if responded {
            self.responses_emitted += 1;
        }
        self.observe(elapsed, alpha);
    }

    /// Processing failed.
    pub fn record_failure(&mut self, elapsed: Duration, alpha: f64) {
        self.processing_failures += 1;
        self.observe(elapsed, alpha);
    }

    /// Fraction of finished messages that completed without error; 1.0 before
    /// any message finished.
    pub fn success_rate(&self) -> f64 {
        let finished = self.tasks_completed + self.processing_failures;
        if finished == 0 {
            1.0
        } else {
            self.tasks_completed as f64 / finished as f64
        }
    }

    fn observe(&mut self, elapsed: Duration, alpha: f64) {
        let sample = elapsed.as_secs_f64() * 1000.0;
        self.average_response_time_ms = alpha * sample + (1.0 - alpha) * self.average_response_time_ms;
        self.last_active = Some(Utc::now());
    }
}
