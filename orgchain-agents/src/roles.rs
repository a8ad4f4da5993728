//! Rule-based reference agents for the three organisational roles
//!
//! These agents make deterministic decisions from the message payload, so an
//! organisation can be exercised end to end without any model backend.
//!
//! ```text
//! REQUEST ──► SME ──(low/medium)──► RESPONSE to requester
//!              │
//!              └─(high/critical)──► ESCALATION ──► Senior Manager
//!                                                    │
//!                     RESPONSE with guidance ◄───────┤
//!                                                    └─(impact+complexity high)──► ESCALATION ──► CEO
//!                                                                                               │
//!                                                           RESPONSE with directive ◄───────────┘
//! ```

use crate::messages::{escalation_message, response_message};
use crate::{Agent, AgentProfile};
use async_trait::async_trait;
use orgchain_core::{
    AgentId, AgentRole, Decision, DecisionContext, Message, MessageType, OrgResult, Payload,
    Priority,
};
use serde_json::{json, Value};
use tracing::debug;

/// Decision type used by [`SubjectMatterExpert`].
pub const INCIDENT_TRIAGE: &str = "incident_triage";
/// Decision type used by [`SeniorManager`].
pub const ESCALATION_RESPONSE: &str = "escalation_response";
/// Decision type used by [`Ceo`].
pub const EXECUTIVE_ESCALATION: &str = "executive_escalation";

/// Incident severity as assessed by an SME.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Assess from `affected_users` and `critical_systems_affected`.
    pub fn assess(incident: &Payload) -> Self {
        let critical_systems = lookup(incident, "critical_systems_affected")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let affected_users = lookup(incident, "affected_users")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        if critical_systems || affected_users > 100 {
            Severity::Critical
        } else if affected_users > 20 {
            Severity::High
        } else if affected_users > 5 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Read `key` from the payload, falling back to the nested `issue` objects
/// produced by escalations. Each hop up the hierarchy adds one level.
fn lookup<'a>(payload: &'a Payload, key: &str) -> Option<&'a Value> {
    payload.get(key).or_else(|| {
        payload
            .get("issue")
            .and_then(Value::as_object)
            .and_then(|issue| lookup(issue, key))
    })
}

fn level<'a>(payload: &'a Payload, key: &str) -> &'a str {
    lookup(payload, key).and_then(Value::as_str).unwrap_or("low")
}

fn decision_content(decision: &Decision) -> Payload {
    let mut content = decision.details.clone();
    content.insert("decision".to_string(), json!(decision.action));
    content.insert("confidence".to_string(), json!(decision.confidence));
    content.insert("reasoning".to_string(), json!(decision.reasoning));
    content
}

// ============================================================================
// SUBJECT MATTER EXPERT
// ============================================================================

/// Specialist that triages incident requests.
#[derive(Debug, Clone)]
pub struct SubjectMatterExpert {
    profile: AgentProfile,
}

impl SubjectMatterExpert {
    pub fn new(
        agent_id: impl Into<AgentId>,
        name: impl Into<String>,
        specialization: impl Into<String>,
        manager_id: impl Into<AgentId>,
    ) -> Self {
        Self {
            profile: AgentProfile::new(agent_id, name, AgentRole::SubjectMatterExpert)
                .with_specialization(specialization)
                .with_manager(manager_id),
        }
    }

    fn handle_request(&self, message: &Message) -> Message {
        let context = DecisionContext {
            decision_type: INCIDENT_TRIAGE.to_string(),
            data: message.content.clone(),
        };
        let decision = self.make_decision(&context);

        if decision.action == "escalate" {
            let priority = decision
                .details
                .get("priority")
                .and_then(Value::as_i64)
                .map(Priority::new)
                .unwrap_or(Priority::HIGH);
            let severity = decision
                .details
                .get("severity")
                .and_then(Value::as_str)
                .unwrap_or("high");
            let mut issue = message.content.clone();
            issue
                .entry("reason".to_string())
                .or_insert_with(|| json!(format!("{} severity incident", severity)));
            escalation_message(&self.profile, issue, priority)
        } else {
            let mut resolution = decision_content(&decision);
            resolution.insert("status".to_string(), json!("resolved"));
            resolution.insert("resolved_by".to_string(), json!(self.profile.agent_id));
            response_message(&self.profile, message, resolution)
        }
    }
}

#[async_trait]
impl Agent for SubjectMatterExpert {
    fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    async fn process_message(&self, message: Message) -> OrgResult<Option<Message>> {
        match message.message_type {
            MessageType::Request => Ok(Some(self.handle_request(&message))),
            _ => {
                debug!(agent_id = %self.profile.agent_id, message_id = %message.id(), "Acknowledged");
                Ok(None)
            }
        }
    }

    fn make_decision(&self, context: &DecisionContext) -> Decision {
        let severity = Severity::assess(&context.data);
        let complex = level(&context.data, "complexity") == "high";

        if severity >= Severity::High || complex {
            let priority = if severity == Severity::Critical {
                Priority::URGENT
            } else {
                Priority::HIGH
            };
            Decision::new(&context.decision_type, "escalate", 0.9)
                .with_reasoning(format!("severity assessed as {}", severity.as_str()))
                .with_detail("severity", json!(severity.as_str()))
                .with_detail("priority", json!(priority.value()))
        } else {
            Decision::new(&context.decision_type, "resolve", 0.8)
                .with_reasoning(format!("severity assessed as {}", severity.as_str()))
                .with_detail("severity", json!(severity.as_str()))
        }
    }
}

// ============================================================================
// SENIOR MANAGER
// ============================================================================

/// Manager that answers escalations from its team and forwards the
/// serious ones to the CEO.
#[derive(Debug, Clone)]
pub struct SeniorManager {
    profile: AgentProfile,
}

impl SeniorManager {
    pub fn new(
        agent_id: impl Into<AgentId>,
        name: impl Into<String>,
        specialization: impl Into<String>,
        ceo_id: impl Into<AgentId>,
    ) -> Self {
        Self {
            profile: AgentProfile::new(agent_id, name, AgentRole::SeniorManager)
                .with_specialization(specialization)
                .with_manager(ceo_id),
        }
    }

    /// Add a direct report.
    pub fn with_subordinate(mut self, agent_id: impl Into<AgentId>) -> Self {
        self.profile = self.profile.with_subordinate(agent_id);
        self
    }

    fn handle_escalation(&self, message: &Message) -> Message {
        let context = DecisionContext {
            decision_type: ESCALATION_RESPONSE.to_string(),
            data: message.content.clone(),
        };
        let decision = self.make_decision(&context);

        let forward = decision
            .details
            .get("escalate_to_ceo")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if forward {
            let mut issue = message.content.clone();
            issue.insert(
                "reason".to_string(),
                json!("High business impact and high complexity"),
            );
            issue.insert("manager_decision".to_string(), json!(decision.action));
            escalation_message(&self.profile, issue, Priority::URGENT)
        } else {
            response_message(&self.profile, message, decision_content(&decision))
        }
    }
}

#[async_trait]
impl Agent for SeniorManager {
    fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    async fn process_message(&self, message: Message) -> OrgResult<Option<Message>> {
        match message.message_type {
            MessageType::Escalation => Ok(Some(self.handle_escalation(&message))),
            MessageType::Request => {
                let context = DecisionContext::new("request_review");
                let decision = self.make_decision(&context);
                Ok(Some(response_message(
                    &self.profile,
                    &message,
                    decision_content(&decision),
                )))
            }
            _ => {
                debug!(agent_id = %self.profile.agent_id, message_id = %message.id(), "Acknowledged");
                Ok(None)
            }
        }
    }

    fn make_decision(&self, context: &DecisionContext) -> Decision {
        if context.decision_type != ESCALATION_RESPONSE {
            return Decision::new(&context.decision_type, "review", 0.5);
        }

        let impact = level(&context.data, "business_impact");
        let complexity = level(&context.data, "complexity");
        let reasoning = format!("business impact {}, complexity {}", impact, complexity);

        if impact == "high" || complexity == "high" {
            Decision::new(&context.decision_type, "immediate_intervention", 0.9)
                .with_reasoning(reasoning)
                .with_detail(
                    "guidance",
                    json!([
                        "Prioritize this issue above others",
                        "Allocate additional resources",
                        "Provide hourly updates"
                    ]),
                )
                .with_detail("follow_up", json!(true))
                .with_detail("escalate_to_ceo", json!(impact == "high" && complexity == "high"))
        } else {
            Decision::new(&context.decision_type, "guided_resolution", 0.8)
                .with_reasoning(reasoning)
                .with_detail(
                    "guidance",
                    json!([
                        "Follow standard procedures",
                        "Keep me informed of progress",
                        "Escalate if no progress in 4 hours"
                    ]),
                )
                .with_detail("follow_up", json!(true))
                .with_detail("escalate_to_ceo", json!(false))
        }
    }
}

// ============================================================================
// CEO
// ============================================================================

/// Root of the organisation; answers executive escalations.
#[derive(Debug, Clone)]
pub struct Ceo {
    profile: AgentProfile,
}

impl Ceo {
    pub fn new(agent_id: impl Into<AgentId>, name: impl Into<String>) -> Self {
        Self {
            profile: AgentProfile::new(agent_id, name, AgentRole::Ceo)
                .with_specialization("executive_leadership"),
        }
    }

    pub fn with_subordinate(mut self, agent_id: impl Into<AgentId>) -> Self {
        self.profile = self.profile.with_subordinate(agent_id);
        self
    }
}

#[async_trait]
impl Agent for Ceo {
    fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    async fn process_message(&self, message: Message) -> OrgResult<Option<Message>> {
        match message.message_type {
            MessageType::Escalation => {
                let context = DecisionContext {
                    decision_type: EXECUTIVE_ESCALATION.to_string(),
                    data: message.content.clone(),
                };
                let decision = self.make_decision(&context);
                Ok(Some(response_message(
                    &self.profile,
                    &message,
                    decision_content(&decision),
                )))
            }
            _ => {
                debug!(agent_id = %self.profile.agent_id, message_id = %message.id(), "Acknowledged");
                Ok(None)
            }
        }
    }

    fn make_decision(&self, context: &DecisionContext) -> Decision {
        if context.decision_type != EXECUTIVE_ESCALATION {
            return Decision::new(&context.decision_type, "delegate", 0.7);
        }

        let risk = level(&context.data, "business_continuity_risk");
        let financial = level(&context.data, "financial_impact");
        let reasoning = format!("continuity risk {}, financial impact {}", risk, financial);

        if risk == "high" || financial == "high" {
            Decision::new(&context.decision_type, "crisis_management", 0.95)
                .with_reasoning(reasoning)
                .with_detail(
                    "guidance",
                    json!([
                        "Activate crisis management protocol",
                        "Establish executive oversight committee",
                        "Prepare stakeholder communications"
                    ]),
                )
                .with_detail("budget_authorization", json!(100_000))
        } else {
            Decision::new(&context.decision_type, "standard_escalation_response", 0.85)
                .with_reasoning(reasoning)
                .with_detail(
                    "guidance",
                    json!([
                        "Follow established escalation procedures",
                        "Ensure adequate resource allocation",
                        "Monitor progress closely"
                    ]),
                )
                .with_detail("budget_authorization", json!(10_000))
        }
    }
}
