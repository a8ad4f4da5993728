//! Compliance reporting over a ledger window

use crate::entry::{LedgerEntry, LedgerRecord};
use chrono::Utc;
use orgchain_core::{AgentId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Per-agent counters within a report window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentActivity {
    pub sent: usize,
    pub received: usize,
    pub decisions: usize,
}

/// One decision as it appears in the audit section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionAudit {
    pub agent_id: AgentId,
    pub timestamp: Timestamp,
    pub decision_type: String,
    pub confidence: f64,
}

/// Activity summary for `[period_start, period_end]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub report_id: Uuid,
    pub period_start: Timestamp,
    pub period_end: Timestamp,
    pub total_entries: usize,
    /// Entry count per message type name, plus `agent_decision`
    pub breakdown: BTreeMap<String, usize>,
    pub agent_activity: BTreeMap<AgentId, AgentActivity>,
    pub decision_audit: Vec<DecisionAudit>,
    /// Integrity of the whole chain at generation time
    pub integrity_valid: bool,
    pub generated_at: Timestamp,
}

impl ComplianceReport {
    pub(crate) fn build<'a>(
        period_start: Timestamp,
        period_end: Timestamp,
        entries: impl Iterator<Item = &'a LedgerEntry>,
        integrity_valid: bool,
    ) -> Self {
        let mut report = Self {
            report_id: Uuid::now_v7(),
            period_start,
            period_end,
            total_entries: 0,
            breakdown: BTreeMap::new(),
            agent_activity: BTreeMap::new(),
            decision_audit: Vec::new(),
            integrity_valid,
            generated_at: Utc::now(),
        };

        for entry in entries {
            report.total_entries += 1;
            *report
                .breakdown
                .entry(entry.record.marker().to_string())
                .or_default() += 1;

            match &entry.record {
                LedgerRecord::Transmission {
                    sender_id,
                    recipient_id,
                    ..
                } => {
                    report.activity(sender_id).sent += 1;
                    if let Some(recipient) = recipient_id {
                        report.activity(recipient).received += 1;
                    }
                }
                LedgerRecord::Decision {
                    agent_id,
                    decision_type,
                    confidence,
                    ..
                } => {
                    report.activity(agent_id).decisions += 1;
                    report.decision_audit.push(DecisionAudit {
                        agent_id: agent_id.clone(),
                        timestamp: entry.timestamp,
                        decision_type: decision_type.clone(),
                        confidence: *confidence,
                    });
                }
            }
        }

        report
    }

    fn activity(&mut self, agent_id: &str) -> &mut AgentActivity {
        self.agent_activity.entry(agent_id.to_string()).or_default()
    }
}
