//! orgchain Core - Message and Role Types
//!
//! Pure data structures shared by every other crate in the workspace:
//! identities, messages, roles, priorities, content hashing, the error
//! taxonomy, orchestrator configuration and health labels.
//! This crate contains no routing or dispatch logic.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

mod config;
mod decision;
mod enums;
mod error;
mod health;
mod message;

pub use config::OrchestratorConfig;
pub use decision::{Decision, DecisionContext};
pub use enums::{AgentRole, MessageType, Priority};
pub use error::{
    AgentError, ConfigError, DispatchError, LedgerError, OrgError, OrgResult, RoutingError,
    ValidationError,
};
pub use health::{HealthLabel, HealthThresholds};
pub use message::{Message, CONVERSATION_ID_KEY};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Agent identifier. Agents are addressed by caller-chosen strings
/// (e.g. `"ceo"`, `"mgr-infra"`).
pub type AgentId = String;

/// Message identifier using UUIDv7 for timestamp-sortable IDs.
pub type MessageId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Lowercase hex SHA-256 digest.
pub type ContentHash = String;

/// Opaque key-value payload carried by messages and decisions.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Generate a new UUIDv7 message id.
pub fn new_message_id() -> MessageId {
    Uuid::now_v7()
}

// ============================================================================
// HASHING
// ============================================================================

/// Compute the lowercase hex SHA-256 digest of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Canonical JSON encoding: object keys sorted, no insignificant whitespace.
///
/// Values are routed through `serde_json::Value`, whose map type is a
/// `BTreeMap` (the `preserve_order` feature is not enabled), so struct field
/// order and `HashMap` iteration order never leak into the output.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_vec(&value)
}

/// Hash any serialisable value through its canonical JSON encoding.
pub fn hash_json<T: Serialize + ?Sized>(value: &T) -> Result<ContentHash, serde_json::Error> {
    Ok(sha256_hex(&canonical_json(value)?))
}

// ============================================================================
// TESTS
// ============================================================================
