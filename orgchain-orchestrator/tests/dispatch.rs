//! Worker and queue behaviour with live dispatch tasks.

use orgchain_agents::{response_message, Agent};
use orgchain_core::{HealthLabel, Message, MessageType, OrgResult, Priority};
use orgchain_ledger::Ledger;
use orgchain_orchestrator::{Orchestrator, RoutingTable};
use orgchain_test_utils::assertions::{assert_chain_valid, wait_until};
use orgchain_test_utils::fixtures::{self, MANAGER, SME_CHANGE, SME_INCIDENT};
use orgchain_test_utils::{FailingAgent, FailureMode, RecordingAgent};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn orchestrator() -> Orchestrator {
    Orchestrator::new(fixtures::fast_config(), RoutingTable::hierarchy_defaults(), Ledger::new())
        .expect("fast config is valid")
}

/// Register the recording organisation and return its agents by position:
/// ceo, manager, incident SME, change SME.
fn register_recording_org(orchestrator: &Orchestrator) -> Vec<Arc<RecordingAgent>> {
    let agents = fixtures::recording_org();
    for agent in &agents {
        orchestrator
            .register_agent(agent.clone())
            .expect("fixture agent registers");
    }
    agents
}

fn request(recipient: &str, seq: u64) -> Message {
    Message::to(
        MANAGER,
        recipient,
        MessageType::Request,
        fixtures::payload(&[("seq", json!(seq))]),
    )
}

fn seq(message: &Message) -> u64 {
    message.content.get("seq").and_then(|v| v.as_u64()).unwrap_or(u64::MAX)
}

#[tokio::test]
async fn test_worker_drains_by_priority_then_arrival() -> OrgResult<()> {
    let orchestrator = orchestrator();
    let agents = register_recording_org(&orchestrator);
    let sme = &agents[2];

    for (seq, priority) in [1, 5, 3, 5, 2].into_iter().enumerate() {
        orchestrator.try_send(request(SME_INCIDENT, seq as u64).with_priority(priority))?;
    }
    assert_eq!(orchestrator.agent_status(SME_INCIDENT)?.queue_depth, 5);

    orchestrator.start_processing()?;
    assert!(wait_until(WAIT, || sme.received_count() == 5).await);
    orchestrator.stop_processing().await?;

    let order: Vec<(u8, u64)> = sme
        .received()
        .iter()
        .map(|m| (m.priority.value(), seq(m)))
        .collect();
    assert_eq!(order, vec![(5, 1), (5, 3), (3, 2), (2, 4), (1, 0)]);
    Ok(())
}

#[tokio::test]
async fn test_response_routes_back_to_requester() -> OrgResult<()> {
    let orchestrator = orchestrator();
    let mut agents = fixtures::recording_org();
    let responder = RecordingAgent::new(agents[2].profile().clone()).with_reply(|profile, message| {
        Some(response_message(
            profile,
            message,
            fixtures::payload(&[("status", json!("resolved"))]),
        ))
    });
    agents[2] = Arc::new(responder);
    for agent in &agents {
        orchestrator.register_agent(agent.clone())?;
    }
    orchestrator.start_processing()?;

    let opening = request(SME_INCIDENT, 0).with_priority(Priority::HIGH);
    let opening_id = opening.id();
    orchestrator.try_send(opening)?;

    let manager = &agents[1];
    assert!(wait_until(WAIT, || manager.received_count() == 1).await);
    orchestrator.stop_processing().await?;

    let reply = &manager.received()[0];
    assert_eq!(reply.message_type, MessageType::Response);
    assert_eq!(reply.sender_id, SME_INCIDENT);
    assert_eq!(reply.recipient_id.as_deref(), Some(MANAGER));
    assert_eq!(reply.conversation_id(), Some(opening_id));
    assert_eq!(reply.priority, Priority::HIGH);

    let conversation = orchestrator
        .conversation(opening_id)
        .expect("conversation stays open");
    assert_eq!(conversation.original_sender_id, MANAGER);
    assert_eq!(conversation.message_count, 2);
    Ok(())
}

#[tokio::test]
async fn test_agent_error_does_not_stop_worker() -> OrgResult<()> {
    assert_survives(FailureMode::Error).await
}

#[tokio::test]
async fn test_agent_panic_does_not_stop_worker() -> OrgResult<()> {
    assert_survives(FailureMode::Panic).await
}

async fn assert_survives(mode: FailureMode) -> OrgResult<()> {
    let orchestrator = orchestrator();
    let mut profiles = fixtures::org_profiles();
    let flaky = Arc::new(FailingAgent::new(profiles.remove(3), mode));
    for profile in profiles {
        orchestrator.register_agent(Arc::new(RecordingAgent::new(profile)))?;
    }
    orchestrator.register_agent(flaky.clone())?;
    orchestrator.start_processing()?;

    orchestrator.try_send(
        Message::to(MANAGER, SME_CHANGE, MessageType::Request, fixtures::poison())
            .with_priority(Priority::CRITICAL),
    )?;
    orchestrator.try_send(request(SME_CHANGE, 1))?;

    let settled = wait_until(WAIT, || {
        orchestrator
            .agent_status(SME_CHANGE)
            .map(|s| s.metrics.tasks_completed == 1 && s.metrics.processing_failures == 1)
            .unwrap_or(false)
    })
    .await;
    assert!(settled, "worker kept draining after the failure");

    let status = orchestrator.system_status()?;
    assert_eq!(status.agent_error_count, 1);
    assert!(status.agents[SME_CHANGE].worker_running);
    assert_eq!(flaky.received_count(), 1);
    assert_eq!(seq(&flaky.received()[0]), 1);

    assert_eq!(orchestrator.stop_processing().await?, 4);
    Ok(())
}

#[tokio::test]
async fn test_reregistration_replaces_queue_and_worker() -> OrgResult<()> {
    let orchestrator = orchestrator();
    let agents = register_recording_org(&orchestrator);
    let original = &agents[2];

    for seq in 0..3 {
        orchestrator.try_send(request(SME_INCIDENT, seq))?;
    }

    let replacement = Arc::new(RecordingAgent::new(original.profile().clone()));
    orchestrator.register_agent(replacement.clone())?;

    let status = orchestrator.system_status()?;
    assert_eq!(status.total_agents, 4);
    assert_eq!(status.queue_depths[SME_INCIDENT], 0);
    assert_eq!(status.processed_count, 3);
    assert_eq!(status.failed_count, 3);

    orchestrator.start_processing()?;
    orchestrator.try_send(request(SME_INCIDENT, 10))?;
    assert!(wait_until(WAIT, || replacement.received_count() == 1).await);

    // Replacing while running starts the new worker straight away.
    let second = Arc::new(RecordingAgent::new(original.profile().clone()));
    orchestrator.register_agent(second.clone())?;
    orchestrator.try_send(request(SME_INCIDENT, 11))?;
    assert!(wait_until(WAIT, || second.received_count() == 1).await);

    orchestrator.stop_processing().await?;
    assert_eq!(original.received_count(), 0);
    assert_eq!(replacement.received_count(), 1);
    assert_eq!(seq(&second.received()[0]), 11);
    Ok(())
}

#[tokio::test]
async fn test_stopped_orchestrator_keeps_queues() -> OrgResult<()> {
    let orchestrator = orchestrator();
    let agents = register_recording_org(&orchestrator);
    let sme = &agents[3];

    orchestrator.start_processing()?;
    assert!(orchestrator.is_running());
    assert_eq!(orchestrator.stop_processing().await?, 4);
    assert!(!orchestrator.is_running());

    orchestrator.try_send(request(SME_CHANGE, 0))?;
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(sme.received_count(), 0);
    assert_eq!(orchestrator.agent_status(SME_CHANGE)?.queue_depth, 1);

    assert_eq!(orchestrator.start_processing()?, 4);
    assert!(wait_until(WAIT, || sme.received_count() == 1).await);
    orchestrator.stop_processing().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_senders_keep_chain_valid() -> OrgResult<()> {
    let orchestrator = orchestrator();
    register_recording_org(&orchestrator);

    let mut tasks = Vec::new();
    for sender in [SME_INCIDENT, SME_CHANGE] {
        for batch in 0..4u64 {
            let orchestrator = orchestrator.clone();
            tasks.push(tokio::spawn(async move {
                (0..25u64)
                    .filter(|i| {
                        orchestrator.send(Message::new(
                            sender,
                            MessageType::Report,
                            fixtures::payload(&[("batch", json!(batch)), ("seq", json!(i))]),
                        ))
                    })
                    .count()
            }));
        }
    }

    let mut delivered = 0;
    for task in tasks {
        delivered += task.await.expect("sender task completes");
    }
    assert_eq!(delivered, 200);

    let ledger = orchestrator.ledger();
    assert_eq!(ledger.len()?, 200);
    assert_chain_valid(ledger);
    let blocks: Vec<u64> = ledger.export_all()?.iter().map(|e| e.block_number).collect();
    assert_eq!(blocks, (1..=200).collect::<Vec<_>>());

    let status = orchestrator.system_status()?;
    assert_eq!(status.queue_depths[MANAGER], 200);
    assert_eq!(status.health, HealthLabel::Degraded);
    Ok(())
}

/// Organisation whose incident SME answers every message.
fn register_responding_org(orchestrator: &Orchestrator) -> Vec<Arc<RecordingAgent>> {
    let mut agents = fixtures::recording_org();
    let responder = RecordingAgent::new(agents[2].profile().clone()).with_reply(|profile, message| {
        Some(response_message(
            profile,
            message,
            fixtures::payload(&[("status", json!("resolved"))]),
        ))
    });
    agents[2] = Arc::new(responder);
    for agent in &agents {
        orchestrator
            .register_agent(agent.clone())
            .expect("fixture agent registers");
    }
    agents
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_round_trips_from_many_threads() -> OrgResult<()> {
    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 100;
    const TOTAL: usize = (THREADS * PER_THREAD) as usize;

    let orchestrator = orchestrator();
    let agents = register_responding_org(&orchestrator);
    orchestrator.start_processing()?;

    let mut senders = Vec::new();
    for thread in 0..THREADS {
        let orchestrator = orchestrator.clone();
        senders.push(tokio::task::spawn_blocking(move || {
            (0..PER_THREAD)
                .filter(|i| orchestrator.send(request(SME_INCIDENT, thread * PER_THREAD + i)))
                .count()
        }));
    }
    let mut sent = 0;
    for sender in senders {
        sent += sender.await.expect("sender thread completes");
    }
    assert_eq!(sent, TOTAL);

    let manager = &agents[1];
    assert!(wait_until(Duration::from_secs(15), || manager.received_count() == TOTAL).await);
    orchestrator.stop_processing().await?;

    let status = orchestrator.system_status()?;
    assert_eq!(status.failed_count, 0);
    assert_eq!(status.processed_count, 2 * TOTAL as u64);
    assert_eq!(status.active_conversations, TOTAL);
    assert!(manager
        .received()
        .iter()
        .all(|m| m.message_type == MessageType::Response));
    assert_chain_valid(orchestrator.ledger());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sme_escalation_answered_by_manager() -> OrgResult<()> {
    let orchestrator = orchestrator();
    let mut agents = fixtures::recording_org();
    let manager = RecordingAgent::new(agents[1].profile().clone()).with_reply(|profile, message| {
        Some(response_message(
            profile,
            message,
            fixtures::payload(&[("decision", json!("add_capacity"))]),
        ))
    });
    agents[1] = Arc::new(manager);
    for agent in &agents {
        orchestrator.register_agent(agent.clone())?;
    }

    let escalation = Message::new(
        SME_INCIDENT,
        MessageType::Escalation,
        fixtures::payload(&[("reason", json!("overload"))]),
    )
    .with_priority(4);
    let escalation_id = escalation.id();
    let receipt = orchestrator.try_send(escalation)?;
    assert_eq!(receipt.recipient_id, MANAGER);

    let status = orchestrator.system_status()?;
    assert_eq!(status.queue_depths[MANAGER], 1);
    assert_eq!(status.ledger_entries, 1);
    assert_eq!(status.processed_count, 1);

    orchestrator.start_processing()?;
    let sme = &agents[2];
    assert!(wait_until(WAIT, || sme.received_count() == 1).await);
    orchestrator.stop_processing().await?;

    let reply = &sme.received()[0];
    assert_eq!(reply.message_type, MessageType::Response);
    assert_eq!(reply.sender_id, MANAGER);
    assert_eq!(reply.conversation_id(), Some(escalation_id));

    let status = orchestrator.system_status()?;
    assert_eq!(status.processed_count, 2);
    assert_eq!(status.escalation_count, 1);
    assert_eq!(status.ledger_entries, 2);

    // Both legs were routed by default and are indexed under both parties.
    let ledger = orchestrator.ledger();
    assert_eq!(ledger.query(MANAGER, None, None)?.len(), 2);
    assert_eq!(ledger.query(SME_INCIDENT, None, None)?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_processing_average_includes_follow_up() -> OrgResult<()> {
    let orchestrator = orchestrator();
    let mut agents = fixtures::recording_org();
    // Replies with a notification that has no recipient, so the follow-up
    // is attempted but never starts a second worker iteration.
    let slow = RecordingAgent::new(agents[3].profile().clone())
        .with_delay(Duration::from_millis(20))
        .with_reply(|profile, _| {
            Some(Message::new(
                profile.agent_id.clone(),
                MessageType::Notification,
                fixtures::payload(&[("note", json!("done"))]),
            ))
        });
    agents[3] = Arc::new(slow);
    for agent in &agents {
        orchestrator.register_agent(agent.clone())?;
    }
    orchestrator.start_processing()?;
    orchestrator.try_send(request(SME_CHANGE, 0))?;

    let measured = wait_until(WAIT, || {
        orchestrator
            .system_status()
            .map(|s| s.failed_count == 1 && s.average_processing_time_ms > 0.0)
            .unwrap_or(false)
    })
    .await;
    assert!(measured);
    orchestrator.stop_processing().await?;

    let status = orchestrator.system_status()?;
    let agent_average = status.agents[SME_CHANGE].metrics.average_response_time_ms;
    assert!(agent_average >= 2.0);
    assert!(status.average_processing_time_ms >= agent_average);
    Ok(())
}
