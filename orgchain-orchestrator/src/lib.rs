//! orgchain Orchestrator - Routing and Dispatch
//!
//! The central nervous system of an agent organisation:
//! - Per-agent priority queues
//! - Role-based routing (explicit recipient, manager chain, conversations)
//! - One Tokio dispatch worker per agent
//! - Ledger logging of every transmitted message
//! - System and per-agent status with a derived health label

mod orchestrator;
mod queue;
mod routing;
mod status;
pub mod telemetry;

pub use orchestrator::Orchestrator;
pub use queue::MessageQueue;
pub use routing::{RoutingRule, RoutingTable};
pub use status::{AgentStatus, Conversation, DeliveryReceipt, SystemStatus};
