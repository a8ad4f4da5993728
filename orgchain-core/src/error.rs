//! Error types for orgchain operations

use crate::{AgentId, AgentRole, MessageId, MessageType, Priority};
use thiserror::Error;

/// Message validation errors. Nothing is logged or enqueued when these occur.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message {message_id} has an empty sender id")]
    EmptySender { message_id: MessageId },

    #[error("Sender {sender_id} is not a registered agent")]
    UnknownSender { sender_id: AgentId },

    #[error("Message {message_id} has no content")]
    MissingContent { message_id: MessageId },
}

/// Routing errors. The message has already been written to the ledger.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("Agent {agent_id} has no manager to receive {message_type}")]
    NoManager {
        agent_id: AgentId,
        message_type: MessageType,
    },

    #[error("{message_type} message {message_id} requires an explicit registered recipient")]
    MissingRecipient {
        message_id: MessageId,
        message_type: MessageType,
    },

    #[error("Resolved recipient {recipient_id} is not registered")]
    UnknownRecipient { recipient_id: AgentId },

    #[error("Response {message_id} does not reference an open conversation")]
    NoOpenConversation { message_id: MessageId },

    #[error("No routing rule permits {message_type} at priority {priority} from {source_role} to {target_role}")]
    RuleDenied {
        source_role: AgentRole,
        target_role: AgentRole,
        message_type: MessageType,
        priority: Priority,
    },
}

/// Ledger errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger integrity violation at block {block_number}: {reason}")]
    IntegrityViolation { block_number: u64, reason: String },

    #[error("Failed to serialize ledger entry: {reason}")]
    Serialization { reason: String },

    #[error("Ledger lock poisoned")]
    LockPoisoned,
}

/// Agent errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("Agent not registered: {agent_id}")]
    NotRegistered { agent_id: AgentId },

    #[error("Agent {agent_id} failed to process message {message_id}: {reason}")]
    ProcessingFailed {
        agent_id: AgentId,
        message_id: MessageId,
        reason: String,
    },

    #[error("Invalid hierarchy for agent {agent_id}: {reason}")]
    InvalidHierarchy { agent_id: AgentId, reason: String },

    #[error("Management cycle detected: {path:?}")]
    HierarchyCycle { path: Vec<AgentId> },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Dispatch worker and orchestrator state errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No Tokio runtime available to spawn dispatch workers")]
    RuntimeUnavailable,

    #[error("Orchestrator state lock poisoned")]
    LockPoisoned,
}

/// Master error type for all orgchain errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrgError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Result type alias for orgchain operations.
pub type OrgResult<T> = Result<T, OrgError>;

// =============================================================================
// TESTS
// =============================================================================
