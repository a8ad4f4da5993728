//! Runs a small IT-operations organisation through three incidents and
//! prints the resulting status and compliance report as JSON.
//!
//! ```text
//! cargo run --bin orgchain-demo
//! RUST_LOG=orgchain=debug ORGCHAIN_LOG_FORMAT=json cargo run --bin orgchain-demo
//! ```

use chrono::Utc;
use orgchain_agents::{Agent, Ceo, SeniorManager, SubjectMatterExpert};
use orgchain_core::{Message, MessageType, OrchestratorConfig, OrgResult, Payload, Priority};
use orgchain_ledger::Ledger;
use orgchain_orchestrator::telemetry::{init_tracing, TelemetryConfig};
use orgchain_orchestrator::{Orchestrator, RoutingTable};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const CEO: &str = "ceo";
const MANAGER: &str = "mgr-it";
const SME_INCIDENT: &str = "sme-incident";
const SME_NETWORK: &str = "sme-network";

const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    if let Err(err) = init_tracing(&TelemetryConfig::from_env()) {
        eprintln!("failed to initialise tracing: {}", err);
    }

    match run().await {
        Ok(true) => {}
        Ok(false) => {
            error!("Ledger failed verification");
            std::process::exit(1);
        }
        Err(err) => {
            error!(error = %err, "Demo failed");
            std::process::exit(1);
        }
    }
}

/// Returns whether the ledger verified.
async fn run() -> OrgResult<bool> {
    let started_at = Utc::now();
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::from_env(),
        RoutingTable::hierarchy_defaults(),
        Ledger::new(),
    )?;

    let agents: Vec<Arc<dyn Agent>> = vec![
        Arc::new(Ceo::new(CEO, "Chief Executive").with_subordinate(MANAGER)),
        Arc::new(
            SeniorManager::new(MANAGER, "IT Operations Manager", "it_operations", CEO)
                .with_subordinate(SME_INCIDENT)
                .with_subordinate(SME_NETWORK),
        ),
        Arc::new(SubjectMatterExpert::new(
            SME_INCIDENT,
            "Incident Expert",
            "incident_management",
            MANAGER,
        )),
        Arc::new(SubjectMatterExpert::new(
            SME_NETWORK,
            "Network Expert",
            "network_operations",
            MANAGER,
        )),
    ];
    for agent in agents {
        orchestrator.register_agent(agent)?;
    }
    orchestrator.start_processing()?;

    let incidents = [
        (
            SME_INCIDENT,
            Priority::MEDIUM,
            json!({
                "summary": "Printer queue stuck on floor 3",
                "affected_users": 4,
            }),
        ),
        (
            SME_NETWORK,
            Priority::HIGH,
            json!({
                "summary": "VPN gateway dropping sessions",
                "affected_users": 45,
                "business_impact": "medium",
            }),
        ),
        (
            SME_INCIDENT,
            Priority::CRITICAL,
            json!({
                "summary": "Payment platform outage",
                "affected_users": 2500,
                "critical_systems_affected": true,
                "business_impact": "high",
                "complexity": "high",
                "business_continuity_risk": "high",
            }),
        ),
    ];

    for (recipient, priority, content) in incidents {
        let message = Message::to(MANAGER, recipient, MessageType::Request, into_payload(content))
            .with_priority(priority);
        let receipt = orchestrator.try_send(message)?;
        info!(
            message_id = %receipt.message_id,
            recipient_id = %receipt.recipient_id,
            block_number = receipt.block_number,
            "Incident submitted"
        );
    }

    if !settle(&orchestrator, SETTLE_TIMEOUT).await? {
        warn!(timeout_secs = SETTLE_TIMEOUT.as_secs(), "Pipeline did not settle in time");
    }
    orchestrator.stop_processing().await?;

    let status = orchestrator.system_status()?;
    let report = orchestrator
        .ledger()
        .compliance_report(started_at, Utc::now())?;

    println!("{}", to_pretty(&status));
    println!("{}", to_pretty(&report));

    Ok(orchestrator.ledger().verify_integrity())
}

/// Wait until every enqueued message has been processed by its agent.
async fn settle(orchestrator: &Orchestrator, timeout: Duration) -> OrgResult<bool> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let status = orchestrator.system_status()?;
        let handled: u64 = status
            .agents
            .values()
            .map(|a| a.metrics.tasks_completed + a.metrics.processing_failures)
            .sum();
        if status.total_queued == 0 && handled >= status.processed_count {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

fn into_payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

fn to_pretty<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|err| format!("{{\"error\": \"{}\"}}", err))
}
