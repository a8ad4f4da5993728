//! orgchain Test Utilities
//!
//! Centralized test infrastructure for the orgchain workspace:
//! - Test agents that record, script or fail on the messages they receive
//! - Proptest generators for messages and their parts
//! - Fixtures for a standard CEO / manager / SME organisation
//! - Custom assertions for orgchain-specific validation

// Re-export core types for convenience
pub use orgchain_core::{
    AgentId, AgentRole, Decision, DecisionContext, Message, MessageType, OrchestratorConfig,
    OrgError, OrgResult, Payload, Priority, RoutingError, ValidationError,
};
pub use orgchain_agents::{Agent, AgentProfile};

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

// ============================================================================
// TEST AGENTS
// ============================================================================

/// Builds an optional follow-up from the agent's profile and the message.
pub type ReplyFn = Arc<dyn Fn(&AgentProfile, &Message) -> Option<Message> + Send + Sync>;

/// Agent that records every message it processes and optionally replies.
///
/// Register a clone of the `Arc` so the test can keep reading
/// [`received`](Self::received) afterwards.
#[derive(Clone)]
pub struct RecordingAgent {
    profile: AgentProfile,
    received: Arc<Mutex<Vec<Message>>>,
    delay: Duration,
    reply: Option<ReplyFn>,
}

impl RecordingAgent {
    pub fn new(profile: AgentProfile) -> Self {
        Self {
            profile,
            received: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
            reply: None,
        }
    }

    /// Sleep this long inside every `process_message` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Reply to each message with whatever `reply` returns.
    pub fn with_reply(
        mut self,
        reply: impl Fn(&AgentProfile, &Message) -> Option<Message> + Send + Sync + 'static,
    ) -> Self {
        self.reply = Some(Arc::new(reply));
        self
    }

    /// Messages processed so far, in processing order.
    pub fn received(&self) -> Vec<Message> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn received_count(&self) -> usize {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn record(&self, message: &Message) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
    }
}

#[async_trait]
impl Agent for RecordingAgent {
    fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    async fn process_message(&self, message: Message) -> OrgResult<Option<Message>> {
        self.record(&message).await;
        Ok(self
            .reply
            .as_ref()
            .and_then(|reply| reply(&self.profile, &message)))
    }

    fn make_decision(&self, context: &DecisionContext) -> Decision {
        Decision::new(&context.decision_type, "acknowledge", 0.5)
    }
}

/// How a [`FailingAgent`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Return an error from `process_message`
    Error,
    /// Panic inside `process_message`
    Panic,
}

/// Content key that makes a [`FailingAgent`] fail on a message.
pub const POISON_KEY: &str = "poison";

/// Agent that fails on messages carrying `"poison": true` and records the
/// rest.
#[derive(Clone)]
pub struct FailingAgent {
    inner: RecordingAgent,
    mode: FailureMode,
}

impl FailingAgent {
    pub fn new(profile: AgentProfile, mode: FailureMode) -> Self {
        Self {
            inner: RecordingAgent::new(profile),
            mode,
        }
    }

    pub fn received(&self) -> Vec<Message> {
        self.inner.received()
    }

    pub fn received_count(&self) -> usize {
        self.inner.received_count()
    }
}

#[async_trait]
impl Agent for FailingAgent {
    fn profile(&self) -> &AgentProfile {
        self.inner.profile()
    }

    async fn process_message(&self, message: Message) -> OrgResult<Option<Message>> {
        let poisoned = message
            .content
            .get(POISON_KEY)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        if poisoned {
            match self.mode {
                FailureMode::Error => {
                    return Err(orgchain_core::AgentError::ProcessingFailed {
                        agent_id: self.agent_id().to_string(),
                        message_id: message.id(),
                        reason: "poisoned message".to_string(),
                    }
                    .into())
                }
                FailureMode::Panic => panic!("poisoned message {}", message.id()),
            }
        }
        self.inner.process_message(message).await
    }

    fn make_decision(&self, context: &DecisionContext) -> Decision {
        self.inner.make_decision(context)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating orgchain message types.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// Generate a MessageType variant.
    pub fn arb_message_type() -> impl Strategy<Value = MessageType> {
        prop::sample::select(MessageType::ALL.to_vec())
    }

    /// Generate an AgentRole variant.
    pub fn arb_agent_role() -> impl Strategy<Value = AgentRole> {
        prop_oneof![
            Just(AgentRole::Ceo),
            Just(AgentRole::SeniorManager),
            Just(AgentRole::SubjectMatterExpert),
        ]
    }

    /// Generate a Priority from any integer; clamping keeps it in range.
    pub fn arb_priority() -> impl Strategy<Value = Priority> {
        any::<i64>().prop_map(Priority::new)
    }

    /// Generate an agent id like `agent-17`.
    pub fn arb_agent_id() -> impl Strategy<Value = AgentId> {
        (0u32..1000).prop_map(|n| format!("agent-{}", n))
    }

    /// Generate a JSON leaf value.
    pub fn arb_json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-z ]{0,24}".prop_map(Value::String),
        ]
    }

    /// Generate a non-empty payload with up to eight keys.
    pub fn arb_payload() -> impl Strategy<Value = Payload> {
        prop::collection::btree_map("[a-z_]{1,12}", arb_json_leaf(), 1..8)
            .prop_map(|entries| entries.into_iter().collect())
    }

    /// Generate a message from `sender` with optional explicit recipient.
    pub fn arb_message(sender: AgentId) -> impl Strategy<Value = Message> {
        (
            arb_message_type(),
            arb_priority(),
            arb_payload(),
            prop::option::of(arb_agent_id()),
        )
            .prop_map(move |(message_type, priority, content, recipient)| {
                let message = Message::new(sender.clone(), message_type, content).with_priority(priority);
                match recipient {
                    Some(recipient) => message.with_recipient(recipient),
                    None => message,
                }
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use orgchain_agents::{Ceo, SeniorManager, SubjectMatterExpert};
    use serde_json::{json, Value};

    pub const CEO: &str = "ceo";
    pub const MANAGER: &str = "mgr-it";
    pub const SME_INCIDENT: &str = "sme-incident";
    pub const SME_CHANGE: &str = "sme-change";

    /// Config with short timeouts so worker tests settle quickly.
    pub fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            dequeue_timeout: Duration::from_millis(20),
            shutdown_timeout: Duration::from_secs(2),
            ..OrchestratorConfig::default()
        }
    }

    /// CEO → manager → two SMEs.
    pub fn org_profiles() -> Vec<AgentProfile> {
        vec![
            AgentProfile::new(CEO, "Chief Executive", AgentRole::Ceo)
                .with_specialization("executive_leadership")
                .with_subordinate(MANAGER),
            AgentProfile::new(MANAGER, "IT Operations Manager", AgentRole::SeniorManager)
                .with_specialization("it_operations")
                .with_manager(CEO)
                .with_subordinate(SME_INCIDENT)
                .with_subordinate(SME_CHANGE),
            AgentProfile::new(SME_INCIDENT, "Incident Expert", AgentRole::SubjectMatterExpert)
                .with_specialization("incident_management")
                .with_manager(MANAGER),
            AgentProfile::new(SME_CHANGE, "Change Expert", AgentRole::SubjectMatterExpert)
                .with_specialization("change_management")
                .with_manager(MANAGER),
        ]
    }

    /// The same organisation made of recording agents, keyed by id order of
    /// [`org_profiles`].
    pub fn recording_org() -> Vec<Arc<RecordingAgent>> {
        org_profiles()
            .into_iter()
            .map(|profile| Arc::new(RecordingAgent::new(profile)))
            .collect()
    }

    /// The same organisation made of the rule-based reference agents.
    pub fn reference_org() -> Vec<Arc<dyn Agent>> {
        vec![
            Arc::new(Ceo::new(CEO, "Chief Executive").with_subordinate(MANAGER)),
            Arc::new(
                SeniorManager::new(MANAGER, "IT Operations Manager", "it_operations", CEO)
                    .with_subordinate(SME_INCIDENT)
                    .with_subordinate(SME_CHANGE),
            ),
            Arc::new(SubjectMatterExpert::new(
                SME_INCIDENT,
                "Incident Expert",
                "incident_management",
                MANAGER,
            )),
            Arc::new(SubjectMatterExpert::new(
                SME_CHANGE,
                "Change Expert",
                "change_management",
                MANAGER,
            )),
        ]
    }

    /// Build a payload from key/value pairs.
    pub fn payload(pairs: &[(&str, Value)]) -> Payload {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Incident request content.
    pub fn incident(affected_users: u64, critical_systems: bool) -> Payload {
        payload(&[
            ("summary", json!("Service degradation")),
            ("affected_users", json!(affected_users)),
            ("critical_systems_affected", json!(critical_systems)),
        ])
    }

    /// Content that makes a [`FailingAgent`] fail.
    pub fn poison() -> Payload {
        payload(&[(POISON_KEY, json!(true))])
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for orgchain-specific validation.

    use super::*;
    use orgchain_ledger::Ledger;

    /// Assert that an OrgResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &OrgResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that an OrgResult is a Validation error.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &OrgResult<T>) {
        match result {
            Err(OrgError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert that an OrgResult is a Routing error.
    #[track_caller]
    pub fn assert_routing_error<T: std::fmt::Debug>(result: &OrgResult<T>) {
        match result {
            Err(OrgError::Routing(_)) => {}
            other => panic!("Expected Routing error, got: {:?}", other),
        }
    }

    /// Assert that the ledger verifies.
    #[track_caller]
    pub fn assert_chain_valid(ledger: &Ledger) {
        if let Err(err) = ledger.check_integrity() {
            panic!("Expected a valid ledger chain, got: {}", err);
        }
    }

    /// Poll `condition` every few milliseconds until it holds or `timeout`
    /// passes. Returns whether it held.
    pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if condition() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
