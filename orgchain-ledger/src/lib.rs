//! orgchain Ledger - Hash-Chained Audit Log
//!
//! Every message handed to the orchestrator, and every decision an agent
//! records, becomes one block of an append-only chain:
//!
//! ```text
//! genesis(000…0) ← block 1 ← block 2 ← block 3 ← …
//!                  hash(1)   prev=hash(1)
//! ```
//!
//! Entries store hashes of message content and metadata, never the raw
//! payloads. Each entry's hash covers every other field including the
//! previous entry's hash, so altering any past entry breaks verification
//! from that block onward.
//!
//! # Key Types
//!
//! - `Ledger`: shared, thread-safe chain with agent and message indexes
//! - `LedgerEntry`: one sealed block
//! - `LedgerRecord`: what a block records (transmission or decision)
//! - `ComplianceReport`: activity summary over a time window

mod entry;
mod ledger;
mod report;

pub use entry::{verify_chain, LedgerEntry, LedgerRecord, DECISION_MARKER, GENESIS_HASH};
pub use ledger::Ledger;
pub use report::{AgentActivity, ComplianceReport, DecisionAudit};
