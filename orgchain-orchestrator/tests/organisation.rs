//! The reference CEO / manager / SME agents running end to end.

use chrono::{Duration as ChronoDuration, Utc};
use orgchain_core::{DecisionContext, HealthLabel, Message, MessageType, OrgResult, Priority};
use orgchain_ledger::Ledger;
use orgchain_orchestrator::{Orchestrator, RoutingTable};
use orgchain_test_utils::assertions::{assert_chain_valid, wait_until};
use orgchain_test_utils::fixtures::{self, CEO, MANAGER, SME_CHANGE, SME_INCIDENT};
use serde_json::json;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn reference_orchestrator(enforce_rules: bool) -> OrgResult<Orchestrator> {
    let mut config = fixtures::fast_config();
    config.enforce_routing_rules = enforce_rules;
    let orchestrator = Orchestrator::new(config, RoutingTable::hierarchy_defaults(), Ledger::new())?;
    for agent in fixtures::reference_org() {
        orchestrator.register_agent(agent)?;
    }
    Ok(orchestrator)
}

/// Every enqueued message has been handled by its agent.
fn settled(orchestrator: &Orchestrator) -> bool {
    orchestrator
        .system_status()
        .map(|status| {
            let handled: u64 = status
                .agents
                .values()
                .map(|a| a.metrics.tasks_completed + a.metrics.processing_failures)
                .sum();
            status.total_queued == 0 && handled == status.processed_count
        })
        .unwrap_or(false)
}

#[tokio::test]
async fn test_minor_incident_resolved_by_sme() -> OrgResult<()> {
    let orchestrator = reference_orchestrator(true)?;
    orchestrator.start_processing()?;

    let request = Message::to(MANAGER, SME_CHANGE, MessageType::Request, fixtures::incident(3, false));
    let request_id = request.id();
    orchestrator.try_send(request)?;

    assert!(wait_until(WAIT, || orchestrator.ledger().len().unwrap_or(0) == 2).await);
    assert!(wait_until(WAIT, || settled(&orchestrator)).await);
    orchestrator.stop_processing().await?;

    let status = orchestrator.system_status()?;
    assert_eq!(status.processed_count, 2);
    assert_eq!(status.failed_count, 0);
    assert_eq!(status.escalation_count, 0);
    assert_eq!(status.health, HealthLabel::Healthy);
    assert_eq!(status.agents[SME_CHANGE].metrics.responses_emitted, 1);

    let conversation = orchestrator
        .conversation(request_id)
        .expect("request opened a conversation");
    assert_eq!(conversation.message_count, 2);

    let trail = orchestrator.ledger().audit_trail(request_id)?.expect("request was logged");
    assert_eq!(trail.block_number, 1);
    assert_chain_valid(orchestrator.ledger());
    Ok(())
}

#[tokio::test]
async fn test_critical_incident_climbs_to_ceo() -> OrgResult<()> {
    let orchestrator = reference_orchestrator(true)?;
    orchestrator.start_processing()?;

    let mut content = fixtures::incident(2500, true);
    content.insert("business_impact".to_string(), json!("high"));
    content.insert("complexity".to_string(), json!("high"));
    content.insert("business_continuity_risk".to_string(), json!("high"));
    orchestrator.try_send(
        Message::to(MANAGER, SME_INCIDENT, MessageType::Request, content)
            .with_priority(Priority::CRITICAL),
    )?;

    // request → SME escalation → manager escalation → CEO response
    assert!(wait_until(WAIT, || orchestrator.ledger().len().unwrap_or(0) == 4).await);
    assert!(wait_until(WAIT, || settled(&orchestrator)).await);
    orchestrator.stop_processing().await?;

    let status = orchestrator.system_status()?;
    assert_eq!(status.escalation_count, 2);
    assert_eq!(status.failed_count, 0);
    assert_eq!(status.agent_error_count, 0);
    assert_eq!(status.agents[CEO].metrics.tasks_completed, 1);
    assert_eq!(status.agents[CEO].metrics.responses_emitted, 1);
    assert_eq!(status.agents[MANAGER].metrics.messages_received, 2);

    let ledger = orchestrator.ledger();
    let ceo_entries = ledger.query(CEO, None, None)?;
    assert_eq!(ceo_entries.len(), 2);
    assert!(ceo_entries
        .iter()
        .all(|e| matches!(e.record.sender_id(), MANAGER | CEO)));

    let now = Utc::now();
    let report = ledger.compliance_report(now - ChronoDuration::minutes(5), now + ChronoDuration::minutes(5))?;
    assert_eq!(report.total_entries, 4);
    assert_eq!(report.breakdown.get("escalation"), Some(&2));
    assert_eq!(report.breakdown.get("request"), Some(&1));
    assert_eq!(report.breakdown.get("response"), Some(&1));
    assert!(report.integrity_valid);
    Ok(())
}

#[tokio::test]
async fn test_ceo_escalation_logged_but_unroutable() -> OrgResult<()> {
    let orchestrator = reference_orchestrator(false)?;

    let escalation = Message::new(CEO, MessageType::Escalation, fixtures::incident(1, false));
    assert!(!orchestrator.send(escalation));

    let status = orchestrator.system_status()?;
    assert_eq!(status.ledger_entries, 1);
    assert_eq!(status.failed_count, 1);
    assert_eq!(status.processed_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_decisions_join_the_chain() -> OrgResult<()> {
    let orchestrator = reference_orchestrator(false)?;
    orchestrator.try_send(Message::to(
        MANAGER,
        SME_INCIDENT,
        MessageType::Request,
        fixtures::incident(30, false),
    ))?;

    let context = DecisionContext::new("executive_escalation")
        .with("business_continuity_risk", json!("high"));
    let (decision, entry) = orchestrator.record_decision(CEO, &context)?;

    assert_eq!(decision.action, "crisis_management");
    assert_eq!(entry.block_number, 2);
    assert!(entry.record.is_decision());

    let report = orchestrator
        .ledger()
        .compliance_report(entry.timestamp - ChronoDuration::seconds(1), Utc::now())?;
    assert_eq!(report.decision_audit.len(), 1);
    assert_eq!(report.agent_activity[CEO].decisions, 1);
    assert_chain_valid(orchestrator.ledger());
    Ok(())
}

#[tokio::test]
async fn test_ledger_survives_export_and_import() -> OrgResult<()> {
    let orchestrator = reference_orchestrator(false)?;
    for users in [2, 8, 40] {
        orchestrator.try_send(Message::to(
            MANAGER,
            SME_CHANGE,
            MessageType::Request,
            fixtures::incident(users, false),
        ))?;
    }

    let exported = orchestrator.ledger().export_all()?;
    let restored = Ledger::new();
    assert!(restored.import_all(exported.clone())?);
    assert_eq!(restored.head_hash()?, orchestrator.ledger().head_hash()?);

    let mut tampered = exported;
    tampered[1].previous_hash = "0".repeat(64);
    let untouched = Ledger::new();
    assert!(!untouched.import_all(tampered)?);
    assert!(untouched.is_empty()?);
    Ok(())
}
