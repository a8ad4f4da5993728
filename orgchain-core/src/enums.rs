//! Enum types for messages and agent roles

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// MESSAGE TYPE
// ============================================================================

/// Kind of inter-agent message. Routing dispatches exhaustively on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Ask another agent to do something; needs an explicit recipient
    Request,
    /// Answer to an earlier request or escalation
    Response,
    /// Periodic status report to the sender's manager
    Report,
    /// Issue passed up the management hierarchy
    Escalation,
    /// Informational broadcast; needs an explicit recipient
    Notification,
}

impl MessageType {
    /// All variants, in declaration order.
    pub const ALL: [MessageType; 5] = [
        MessageType::Request,
        MessageType::Response,
        MessageType::Report,
        MessageType::Escalation,
        MessageType::Notification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Request => "request",
            MessageType::Response => "response",
            MessageType::Report => "report",
            MessageType::Escalation => "escalation",
            MessageType::Notification => "notification",
        }
    }

    /// Whether a message of this type opens a tracked conversation.
    pub fn opens_conversation(&self) -> bool {
        matches!(self, MessageType::Request | MessageType::Escalation)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "request" => Ok(MessageType::Request),
            "response" => Ok(MessageType::Response),
            "report" => Ok(MessageType::Report),
            "escalation" => Ok(MessageType::Escalation),
            "notification" => Ok(MessageType::Notification),
            _ => Err(format!("Invalid MessageType: {}", s)),
        }
    }
}

// ============================================================================
// AGENT ROLE
// ============================================================================

/// Position of an agent in the organisation tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Root of the hierarchy, has no manager
    Ceo,
    /// Middle management, reports to the CEO
    SeniorManager,
    /// Specialist, reports to a senior manager
    SubjectMatterExpert,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Ceo => "ceo",
            AgentRole::SeniorManager => "senior_manager",
            AgentRole::SubjectMatterExpert => "sme",
        }
    }

    /// Only the CEO sits at the root of the tree.
    pub fn requires_manager(&self) -> bool {
        !matches!(self, AgentRole::Ceo)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "ceo" => Ok(AgentRole::Ceo),
            "seniormanager" | "manager" => Ok(AgentRole::SeniorManager),
            "sme" | "subjectmatterexpert" => Ok(AgentRole::SubjectMatterExpert),
            _ => Err(format!("Invalid AgentRole: {}", s)),
        }
    }
}

// ============================================================================
// PRIORITY
// ============================================================================

/// Message priority in `[1, 5]`; 5 is delivered first.
///
/// Every constructor clamps, including deserialisation, so an out-of-range
/// value can never be observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "i64", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const LOW: Priority = Priority(1);
    pub const MEDIUM: Priority = Priority(2);
    pub const HIGH: Priority = Priority(3);
    pub const URGENT: Priority = Priority(4);
    pub const CRITICAL: Priority = Priority(5);

    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Build a priority, clamping into `[1, 5]`.
    pub fn new(value: i64) -> Self {
        Priority(value.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::LOW
    }
}

impl From<i64> for Priority {
    fn from(value: i64) -> Self {
        Priority::new(value)
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Priority::new(value as i64)
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        Priority::new(value as i64)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_priority_always_in_range(raw in any::<i64>()) {
            let p = Priority::new(raw);
            prop_assert!(p.value() >= Priority::MIN && p.value() <= Priority::MAX);
        }

        #[test]
        fn prop_priority_identity_in_range(raw in 1i64..=5) {
            prop_assert_eq!(Priority::new(raw).value() as i64, raw);
        }
    }
}
