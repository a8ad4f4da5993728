//! Agent decision records

use crate::Payload;
use serde::{Deserialize, Serialize};

/// Input to an agent's decision function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    /// What is being decided (e.g. "escalation_response", "incident_triage")
    pub decision_type: String,
    /// Facts the decision is based on
    pub data: Payload,
}

impl DecisionContext {
    pub fn new(decision_type: impl Into<String>) -> Self {
        Self {
            decision_type: decision_type.into(),
            data: Payload::new(),
        }
    }

    /// Add a fact.
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }
}

/// Outcome of a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Mirrors the context's decision type
    pub decision_type: String,
    /// Chosen action (e.g. "escalate", "resolve", "immediate_intervention")
    pub action: String,
    /// Confidence in `[0.0, 1.0]`
    pub confidence: f64,
    /// Human-readable reasoning steps
    pub reasoning: Vec<String>,
    /// Action-specific details (guidance, resources, ...)
    pub details: Payload,
}

impl Decision {
    /// Create a decision; confidence is clamped into `[0.0, 1.0]` and NaN
    /// becomes 0.0 so the record always serialises to a JSON number.
    pub fn new(decision_type: impl Into<String>, action: impl Into<String>, confidence: f64) -> Self {
        Self {
            decision_type: decision_type.into(),
            action: action.into(),
            confidence: clamp_confidence(confidence),
            reasoning: Vec::new(),
            details: Payload::new(),
        }
    }

    pub fn with_reasoning(mut self, step: impl Into<String>) -> Self {
        self.reasoning.push(step.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

pub(crate) fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}
