//! Inter-agent message

use crate::{
    hash_json, new_message_id, AgentId, ContentHash, MessageId, MessageType, Payload, Priority,
    Timestamp,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content field that correlates a response with the request or escalation
/// that opened its conversation.
pub const CONVERSATION_ID_KEY: &str = "conversation_id";

/// A unit of inter-agent communication.
///
/// The id is fixed at construction. `recipient_id` may be left unset and is
/// filled in by the orchestrator's routing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message
    id: MessageId,
    /// Agent sending the message
    pub sender_id: AgentId,
    /// Target agent, resolved by routing when absent
    pub recipient_id: Option<AgentId>,
    /// Type of message
    pub message_type: MessageType,
    /// Business payload; never stored raw in the ledger
    pub content: Payload,
    /// Delivery priority
    pub priority: Priority,
    /// When the message was created
    pub timestamp: Timestamp,
    /// Sidecar data (sender role, correlation ids, ...)
    pub metadata: Payload,
}

impl Message {
    /// Create a message without an explicit recipient.
    pub fn new(sender_id: impl Into<AgentId>, message_type: MessageType, content: Payload) -> Self {
        Self {
            id: new_message_id(),
            sender_id: sender_id.into(),
            recipient_id: None,
            message_type,
            content,
            priority: Priority::default(),
            timestamp: Utc::now(),
            metadata: Payload::new(),
        }
    }

    /// Create a message addressed to a specific agent.
    pub fn to(
        sender_id: impl Into<AgentId>,
        recipient_id: impl Into<AgentId>,
        message_type: MessageType,
        content: Payload,
    ) -> Self {
        Self::new(sender_id, message_type, content).with_recipient(recipient_id)
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Set the recipient.
    pub fn with_recipient(mut self, recipient_id: impl Into<AgentId>) -> Self {
        self.recipient_id = Some(recipient_id.into());
        self
    }

    /// Set priority (clamped).
    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Add a content entry.
    pub fn with_content_entry(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.content.insert(key.into(), value);
        self
    }

    /// Mark this message as belonging to the conversation opened by `opened_by`.
    pub fn in_conversation(self, opened_by: MessageId) -> Self {
        self.with_content_entry(
            CONVERSATION_ID_KEY,
            serde_json::Value::String(opened_by.to_string()),
        )
    }

    /// Conversation id carried in the content, if present and well formed.
    pub fn conversation_id(&self) -> Option<MessageId> {
        self.content
            .get(CONVERSATION_ID_KEY)
            .and_then(serde_json::Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// SHA-256 of the canonical JSON encoding of the content.
    pub fn content_hash(&self) -> ContentHash {
        // A JSON map of JSON values always serialises.
        hash_json(&self.content).unwrap_or_default()
    }
}

// ============================================================================
// TESTS
// ============================================================================
