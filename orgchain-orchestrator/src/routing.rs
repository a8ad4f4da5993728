//! Role-based routing rules

use orgchain_core::{AgentRole, MessageType, Priority, RoutingError};
use serde::{Deserialize, Serialize};

/// Declares that `source_role` may send `message_types` to `target_role`
/// at or above `priority_threshold`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub source_role: AgentRole,
    pub target_role: AgentRole,
    pub message_types: Vec<MessageType>,
    pub priority_threshold: Priority,
}

impl RoutingRule {
    pub fn new(
        source_role: AgentRole,
        target_role: AgentRole,
        message_types: impl IntoIterator<Item = MessageType>,
        priority_threshold: impl Into<Priority>,
    ) -> Self {
        Self {
            source_role,
            target_role,
            message_types: message_types.into_iter().collect(),
            priority_threshold: priority_threshold.into(),
        }
    }

    pub fn permits(
        &self,
        source_role: AgentRole,
        target_role: AgentRole,
        message_type: MessageType,
        priority: Priority,
    ) -> bool {
        self.source_role == source_role
            && self.target_role == target_role
            && self.message_types.contains(&message_type)
            && priority >= self.priority_threshold
    }
}

/// Static rule set loaded at orchestrator construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    rules: Vec<RoutingRule>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::hierarchy_defaults()
    }
}

impl RoutingTable {
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self { rules }
    }

    /// Table with no rules; denies everything when enforced.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The standard reporting lines of a CEO / Senior Manager / SME tree.
    pub fn hierarchy_defaults() -> Self {
        use AgentRole::*;
        use MessageType::*;

        Self::new(vec![
            // Upward: escalations and reports, gated by priority
            RoutingRule::new(SubjectMatterExpert, SeniorManager, [Escalation, Report], Priority::MEDIUM),
            RoutingRule::new(SeniorManager, Ceo, [Escalation, Report], Priority::URGENT),
            // Downward: work and answers to one level below
            RoutingRule::new(SeniorManager, SubjectMatterExpert, [Request, Notification, Response], Priority::LOW),
            RoutingRule::new(Ceo, SeniorManager, [Request, Notification, Response], Priority::LOW),
            // Answers to the level above
            RoutingRule::new(SubjectMatterExpert, SeniorManager, [Response], Priority::LOW),
            RoutingRule::new(SeniorManager, Ceo, [Response], Priority::LOW),
        ])
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    pub fn permits(
        &self,
        source_role: AgentRole,
        target_role: AgentRole,
        message_type: MessageType,
        priority: Priority,
    ) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.permits(source_role, target_role, message_type, priority))
    }

    /// Like [`permits`](Self::permits) but returns the denial as an error.
    pub fn check(
        &self,
        source_role: AgentRole,
        target_role: AgentRole,
        message_type: MessageType,
        priority: Priority,
    ) -> Result<(), RoutingError> {
        if self.permits(source_role, target_role, message_type, priority) {
            Ok(())
        } else {
            Err(RoutingError::RuleDenied {
                source_role,
                target_role,
                message_type,
                priority,
            })
        }
    }
}
