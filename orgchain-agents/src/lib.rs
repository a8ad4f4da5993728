//! orgchain Agents - Agent Contract and Reference Roles
//!
//! Provides the participant side of the organisation:
//! - The async [`Agent`] contract the orchestrator dispatches into
//! - Agent identity and hierarchy validation
//! - Per-agent performance metrics
//! - Message construction helpers (escalate, report, respond)
//! - Rule-based CEO, Senior Manager and SME agents

use async_trait::async_trait;
use orgchain_core::{Decision, DecisionContext, Message, OrgResult};

mod messages;
mod metrics;
mod profile;
mod roles;

pub use messages::{
    escalation_message, outgoing, report_message, response_message, ESCALATION_PRIORITY,
    REPORT_PRIORITY, SENDER_ROLE_KEY, SENDER_SPECIALIZATION_KEY,
};
pub use metrics::AgentMetrics;
pub use profile::{find_cycle, validate_hierarchy, AgentProfile};
pub use roles::{
    Ceo, SeniorManager, Severity, SubjectMatterExpert, ESCALATION_RESPONSE, EXECUTIVE_ESCALATION,
    INCIDENT_TRIAGE,
};

/// A role-bearing participant that consumes and produces messages.
///
/// Implementations must be cheap to share: the orchestrator holds each
/// registered agent behind an `Arc` and calls it from that agent's dispatch
/// worker, one message at a time.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Identity and position in the hierarchy.
    fn profile(&self) -> &AgentProfile;

    /// Handle one message, optionally emitting a follow-up that is fed back
    /// through the orchestrator. An error is logged and counted by the
    /// worker; it never stops the agent's dispatch loop.
    async fn process_message(&self, message: Message) -> OrgResult<Option<Message>>;

    /// Decide from `context` alone. Callers may log the result to the ledger.
    fn make_decision(&self, context: &DecisionContext) -> Decision;

    fn agent_id(&self) -> &str {
        &self.profile().agent_id
    }
}
