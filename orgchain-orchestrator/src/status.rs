//! Status snapshots and delivery receipts

use orgchain_agents::{AgentMetrics, AgentProfile};
use orgchain_core::{AgentId, HealthLabel, MessageId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of a successful [`try_send`](crate::Orchestrator::try_send).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: MessageId,
    /// Agent whose queue received the message
    pub recipient_id: AgentId,
    /// Ledger block recording the transmission
    pub block_number: u64,
}

/// An open request or escalation awaiting responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Who sent the opening message; responses are routed back here
    pub original_sender_id: AgentId,
    pub started_at: Timestamp,
    pub last_activity: Timestamp,
    /// Opening message plus every response routed within it
    pub message_count: u64,
}

/// Snapshot of one registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub profile: AgentProfile,
    pub queue_depth: usize,
    pub worker_running: bool,
    pub metrics: AgentMetrics,
}

/// Snapshot of the whole orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub total_agents: usize,
    pub queue_depths: BTreeMap<AgentId, usize>,
    pub total_queued: usize,
    /// Messages successfully enqueued
    pub processed_count: u64,
    /// Messages rejected by validation or routing, or dropped from a queue
    pub failed_count: u64,
    pub escalation_count: u64,
    /// `process_message` errors and panics
    pub agent_error_count: u64,
    /// Moving average of worker iteration time in milliseconds
    pub average_processing_time_ms: f64,
    pub active_conversations: usize,
    pub ledger_entries: usize,
    pub running: bool,
    pub failure_rate: f64,
    pub health: HealthLabel,
    pub agents: BTreeMap<AgentId, AgentStatus>,
}

/// `failed / (processed + failed)`, or 0.0 before any traffic.
pub(crate) fn failure_rate(processed: u64, failed: u64) -> f64 {
    let total = processed + failed;
    if total == 0 {
        0.0
    } else {
        failed as f64 / total as f64
    }
}
