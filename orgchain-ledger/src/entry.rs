//! Ledger entries and chain verification

use chrono::Utc;
use orgchain_core::{
    canonical_json, hash_json, sha256_hex, AgentId, ContentHash, Decision, DecisionContext,
    LedgerError, Message, MessageId, MessageType, Priority, Timestamp,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Previous-hash value of the first entry in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Marker used in place of a message type for decision entries.
pub const DECISION_MARKER: &str = "agent_decision";

/// What a ledger entry records. Payloads are only ever present as hashes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerRecord {
    /// A message handed to the orchestrator.
    Transmission {
        message_id: MessageId,
        sender_id: AgentId,
        /// Recipient as known at send time; unresolved routes are logged as None
        recipient_id: Option<AgentId>,
        message_type: MessageType,
        priority: Priority,
        content_hash: ContentHash,
        metadata_hash: ContentHash,
    },
    /// A decision taken by an agent.
    Decision {
        agent_id: AgentId,
        decision_type: String,
        context_hash: ContentHash,
        outcome_hash: ContentHash,
        confidence: f64,
        reasoning_steps: usize,
    },
}

impl LedgerRecord {
    /// Transmission record for `message`. The recipient is whatever the
    /// message carries, which the orchestrator sets once routing resolved it.
    pub fn transmission(message: &Message) -> Result<Self, LedgerError> {
        Ok(LedgerRecord::Transmission {
            message_id: message.id(),
            sender_id: message.sender_id.clone(),
            recipient_id: message.recipient_id.clone(),
            message_type: message.message_type,
            priority: message.priority,
            content_hash: hash_json(&message.content).map_err(serialization)?,
            metadata_hash: hash_json(&message.metadata).map_err(serialization)?,
        })
    }

    /// Decision record; context and outcome are hashed, not stored.
    pub fn decision(
        agent_id: impl Into<AgentId>,
        context: &DecisionContext,
        decision: &Decision,
    ) -> Result<Self, LedgerError> {
        let confidence = if decision.confidence.is_finite() {
            decision.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Ok(LedgerRecord::Decision {
            agent_id: agent_id.into(),
            decision_type: decision.decision_type.clone(),
            context_hash: hash_json(context).map_err(serialization)?,
            outcome_hash: hash_json(decision).map_err(serialization)?,
            confidence,
            reasoning_steps: decision.reasoning.len(),
        })
    }

    /// Sender of a transmission, or the deciding agent.
    pub fn sender_id(&self) -> &str {
        match self {
            LedgerRecord::Transmission { sender_id, .. } => sender_id,
            LedgerRecord::Decision { agent_id, .. } => agent_id,
        }
    }

    pub fn recipient_id(&self) -> Option<&str> {
        match self {
            LedgerRecord::Transmission { recipient_id, .. } => recipient_id.as_deref(),
            LedgerRecord::Decision { .. } => None,
        }
    }

    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            LedgerRecord::Transmission { message_id, .. } => Some(*message_id),
            LedgerRecord::Decision { .. } => None,
        }
    }

    /// Message type name, or [`DECISION_MARKER`].
    pub fn marker(&self) -> &'static str {
        match self {
            LedgerRecord::Transmission { message_type, .. } => message_type.as_str(),
            LedgerRecord::Decision { .. } => DECISION_MARKER,
        }
    }

    pub fn is_decision(&self) -> bool {
        matches!(self, LedgerRecord::Decision { .. })
    }
}

/// One immutable block of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    /// 1-based position in the chain
    pub block_number: u64,
    /// When the entry was appended
    pub timestamp: Timestamp,
    pub record: LedgerRecord,
    /// `entry_hash` of the previous block, or [`GENESIS_HASH`]
    pub previous_hash: ContentHash,
    /// SHA-256 of the canonical encoding of every other field
    pub entry_hash: ContentHash,
}

/// Borrowed view of an entry without its own hash.
#[derive(Serialize)]
struct HashableEntry<'a> {
    entry_id: &'a Uuid,
    block_number: u64,
    timestamp: &'a Timestamp,
    record: &'a LedgerRecord,
    previous_hash: &'a str,
}

impl LedgerEntry {
    /// Seal a record as block `block_number` chained onto `previous_hash`.
    pub(crate) fn seal(
        record: LedgerRecord,
        block_number: u64,
        previous_hash: ContentHash,
    ) -> Result<Self, LedgerError> {
        let mut entry = Self {
            entry_id: Uuid::now_v7(),
            block_number,
            timestamp: Utc::now(),
            record,
            previous_hash,
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash()?;
        Ok(entry)
    }

    /// Recompute the hash of this entry's canonical serialisation,
    /// excluding `entry_hash`.
    pub fn compute_hash(&self) -> Result<ContentHash, LedgerError> {
        let view = HashableEntry {
            entry_id: &self.entry_id,
            block_number: self.block_number,
            timestamp: &self.timestamp,
            record: &self.record,
            previous_hash: &self.previous_hash,
        };
        let bytes = canonical_json(&view).map_err(serialization)?;
        Ok(sha256_hex(&bytes))
    }

    /// Whether `agent_id` sent, received or decided this entry.
    pub fn involves(&self, agent_id: &str) -> bool {
        self.record.sender_id() == agent_id || self.record.recipient_id() == Some(agent_id)
    }
}

/// Verify a whole chain: contiguous block numbers from 1, linkage to the
/// previous entry's hash (genesis for the first) and each stored hash.
///
/// Returns the first violation found.
pub fn verify_chain(entries: &[LedgerEntry]) -> Result<(), LedgerError> {
    let mut expected_previous = GENESIS_HASH;

    for (index, entry) in entries.iter().enumerate() {
        let expected_block = index as u64 + 1;
        if entry.block_number != expected_block {
            return Err(LedgerError::IntegrityViolation {
                block_number: entry.block_number,
                reason: format!("expected block number {}", expected_block),
            });
        }

        if entry.previous_hash != expected_previous {
            return Err(LedgerError::IntegrityViolation {
                block_number: entry.block_number,
                reason: "previous hash does not match prior entry".to_string(),
            });
        }

        if entry.compute_hash()? != entry.entry_hash {
            return Err(LedgerError::IntegrityViolation {
                block_number: entry.block_number,
                reason: "entry hash does not match contents".to_string(),
            });
        }

        expected_previous = &entry.entry_hash;
    }

    Ok(())
}

fn serialization(err: serde_json::Error) -> LedgerError {
    LedgerError::Serialization {
        reason: err.to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
