//! Message construction helpers used by agents

use crate::{AgentMetrics, AgentProfile};
use orgchain_core::{Message, MessageType, Payload, Priority};
use serde_json::{json, Value};

/// Metadata key carrying the sender's role.
pub const SENDER_ROLE_KEY: &str = "sender_role";
/// Metadata key carrying the sender's specialization.
pub const SENDER_SPECIALIZATION_KEY: &str = "sender_specialization";

/// Default escalation priority.
pub const ESCALATION_PRIORITY: Priority = Priority::HIGH;
/// Priority of periodic status reports.
pub const REPORT_PRIORITY: Priority = Priority::MEDIUM;

/// Message from `profile` stamped with its role and specialization.
pub fn outgoing(profile: &AgentProfile, message_type: MessageType, content: Payload) -> Message {
    Message::new(profile.agent_id.clone(), message_type, content)
        .with_metadata(SENDER_ROLE_KEY, json!(profile.role.as_str()))
        .with_metadata(SENDER_SPECIALIZATION_KEY, json!(profile.specialization))
}

/// Escalation of `issue` to the sender's manager. The recipient is left for
/// the orchestrator to resolve.
pub fn escalation_message(
    profile: &AgentProfile,
    issue: Payload,
    priority: impl Into<Priority>,
) -> Message {
    let reason = string_or(&issue, "reason", "Requires manager attention");
    let recommended = string_or(&issue, "recommended_action", "Review and decide");

    let mut content = Payload::new();
    content.insert("type".to_string(), json!("escalation"));
    content.insert("escalated_by".to_string(), json!(profile.agent_id));
    content.insert("escalation_reason".to_string(), json!(reason));
    content.insert("recommended_action".to_string(), json!(recommended));
    content.insert("issue".to_string(), Value::Object(issue));

    outgoing(profile, MessageType::Escalation, content).with_priority(priority)
}

/// Status report to the sender's manager, including its current metrics.
pub fn report_message(profile: &AgentProfile, report: &Payload, metrics: &AgentMetrics) -> Message {
    let list = |key: &str| report.get(key).cloned().unwrap_or_else(|| json!([]));

    let mut content = Payload::new();
    content.insert("type".to_string(), json!("status_report"));
    content.insert("period".to_string(), json!(string_or(report, "period", "daily")));
    content.insert("metrics".to_string(), json!(metrics));
    content.insert("achievements".to_string(), list("achievements"));
    content.insert("challenges".to_string(), list("challenges"));
    content.insert("recommendations".to_string(), list("recommendations"));

    outgoing(profile, MessageType::Report, content).with_priority(REPORT_PRIORITY)
}

/// Response to `original`, tagged with the conversation it belongs to and
/// sent at the original's priority.
pub fn response_message(profile: &AgentProfile, original: &Message, content: Payload) -> Message {
    let conversation = if original.message_type.opens_conversation() {
        original.id()
    } else {
        original.conversation_id().unwrap_or_else(|| original.id())
    };

    outgoing(profile, MessageType::Response, content)
        .with_priority(original.priority)
        .in_conversation(conversation)
}

fn string_or(payload: &Payload, key: &str, default: &str) -> String {
    payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}
