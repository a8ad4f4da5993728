//! In-memory hash-chained ledger

use crate::entry::{verify_chain, LedgerEntry, LedgerRecord, GENESIS_HASH};
use crate::report::ComplianceReport;
use orgchain_core::{
    AgentId, ContentHash, Decision, DecisionContext, LedgerError, Message, MessageId, OrgResult,
    Timestamp,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// Append-only, tamper-evident audit log.
///
/// Entries live in an ordered vector with secondary indexes by agent and by
/// message id. All state sits behind one `RwLock`, so block-number
/// assignment, previous-hash lookup and the push happen atomically with
/// respect to concurrent appends. Clones share the same chain.
///
/// # Example
///
/// ```rust,ignore
/// use orgchain_ledger::Ledger;
///
/// let ledger = Ledger::new();
/// let entry = ledger.log_message(&message)?;
/// assert_eq!(entry.block_number, 1);
/// assert!(ledger.verify_integrity());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    state: Arc<RwLock<LedgerState>>,
}

#[derive(Debug, Default)]
struct LedgerState {
    entries: Vec<LedgerEntry>,
    by_agent: HashMap<AgentId, Vec<usize>>,
    by_message: HashMap<MessageId, usize>,
}

impl LedgerState {
    fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        let mut state = LedgerState::default();
        for entry in entries {
            state.push(entry);
        }
        state
    }

    fn push(&mut self, entry: LedgerEntry) {
        let index = self.entries.len();
        let sender = entry.record.sender_id().to_string();
        let recipient = entry.record.recipient_id().map(str::to_string);

        if let Some(recipient) = recipient.filter(|r| *r != sender) {
            self.by_agent.entry(recipient).or_default().push(index);
        }
        self.by_agent.entry(sender).or_default().push(index);
        if let Some(message_id) = entry.record.message_id() {
            self.by_message.entry(message_id).or_insert(index);
        }
        self.entries.push(entry);
    }

    fn head_hash(&self) -> ContentHash {
        self.entries
            .last()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string())
    }
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record as the next block.
    pub fn append(&self, record: LedgerRecord) -> OrgResult<LedgerEntry> {
        let mut state = self.state.write().map_err(|_| LedgerError::LockPoisoned)?;

        let block_number = state.entries.len() as u64 + 1;
        let entry = LedgerEntry::seal(record, block_number, state.head_hash())?;
        state.push(entry.clone());

        debug!(
            block_number,
            kind = entry.record.marker(),
            sender_id = entry.record.sender_id(),
            "Ledger entry appended"
        );
        Ok(entry)
    }

    /// Append a transmission record for `message`.
    pub fn log_message(&self, message: &Message) -> OrgResult<LedgerEntry> {
        self.append(LedgerRecord::transmission(message)?)
    }

    /// Append a decision record for `agent_id`.
    pub fn log_decision(
        &self,
        agent_id: &str,
        context: &DecisionContext,
        decision: &Decision,
    ) -> OrgResult<LedgerEntry> {
        self.append(LedgerRecord::decision(agent_id, context, decision)?)
    }

    /// Recompute and check the whole chain. `false` means the ledger is
    /// corrupt or was tampered with; it is never repaired automatically.
    pub fn verify_integrity(&self) -> bool {
        match self.check_integrity() {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "Ledger integrity check failed");
                false
            }
        }
    }

    /// Like [`verify_integrity`](Self::verify_integrity) but reports the
    /// first violation.
    pub fn check_integrity(&self) -> OrgResult<()> {
        let state = self.state.read().map_err(|_| LedgerError::LockPoisoned)?;
        verify_chain(&state.entries)?;
        Ok(())
    }

    /// Entries where `agent_id` is sender (or decider) or recipient, within
    /// the optional inclusive time bounds, ordered by timestamp ascending.
    pub fn query(
        &self,
        agent_id: &str,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> OrgResult<Vec<LedgerEntry>> {
        let state = self.state.read().map_err(|_| LedgerError::LockPoisoned)?;

        let mut matches: Vec<LedgerEntry> = state
            .by_agent
            .get(agent_id)
            .into_iter()
            .flatten()
            .map(|&index| &state.entries[index])
            .filter(|e| start.map_or(true, |s| e.timestamp >= s))
            .filter(|e| end.map_or(true, |t| e.timestamp <= t))
            .cloned()
            .collect();

        matches.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.block_number.cmp(&b.block_number))
        });
        Ok(matches)
    }

    /// First transmission entry recorded for `message_id`.
    pub fn audit_trail(&self, message_id: MessageId) -> OrgResult<Option<LedgerEntry>> {
        let state = self.state.read().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(state
            .by_message
            .get(&message_id)
            .map(|&index| state.entries[index].clone()))
    }

    /// Snapshot of the whole chain.
    pub fn export_all(&self) -> OrgResult<Vec<LedgerEntry>> {
        let state = self.state.read().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(state.entries.clone())
    }

    /// Replace the chain with `entries` if they verify.
    ///
    /// Returns `Ok(false)` and leaves the current chain untouched when the
    /// candidate chain is broken.
    pub fn import_all(&self, entries: Vec<LedgerEntry>) -> OrgResult<bool> {
        if let Err(err) = verify_chain(&entries) {
            warn!(error = %err, count = entries.len(), "Rejected ledger import");
            return Ok(false);
        }

        let count = entries.len();
        let mut state = self.state.write().map_err(|_| LedgerError::LockPoisoned)?;
        *state = LedgerState::from_entries(entries);
        info!(count, "Ledger imported");
        Ok(true)
    }

    /// Summarise the entries appended within `[start, end]`.
    pub fn compliance_report(&self, start: Timestamp, end: Timestamp) -> OrgResult<ComplianceReport> {
        let state = self.state.read().map_err(|_| LedgerError::LockPoisoned)?;
        let integrity_valid = verify_chain(&state.entries).is_ok();
        let in_range = state
            .entries
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end);
        Ok(ComplianceReport::build(start, end, in_range, integrity_valid))
    }

    /// Number of entries.
    pub fn len(&self) -> OrgResult<usize> {
        let state = self.state.read().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(state.entries.len())
    }

    /// Whether no entry has been appended.
    pub fn is_empty(&self) -> OrgResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Hash the next entry will chain onto.
    pub fn head_hash(&self) -> OrgResult<ContentHash> {
        let state = self.state.read().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(state.head_hash())
    }
}

// ============================================================================
// TESTS
// ============================================================================
