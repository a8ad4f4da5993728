//! Registration, routing and dispatch

use crate::queue::MessageQueue;
use crate::routing::RoutingTable;
use crate::status::{failure_rate, AgentStatus, Conversation, DeliveryReceipt, SystemStatus};
use chrono::Utc;
use orgchain_agents::{find_cycle, Agent, AgentMetrics, AgentProfile};
use orgchain_core::{
    AgentError, AgentId, Decision, DecisionContext, DispatchError, HealthLabel, Message,
    MessageId, MessageType, OrchestratorConfig, OrgError, OrgResult, RoutingError,
    ValidationError,
};
use orgchain_ledger::{Ledger, LedgerEntry};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Central router and dispatcher.
///
/// Owns the agent registry, one [`MessageQueue`] per agent, the routing table
/// and a handle to the shared [`Ledger`]. Every message enters through
/// [`send`](Self::send) / [`try_send`](Self::try_send):
///
/// ```text
/// CREATED → VALIDATED → LOGGED → ENQUEUED → DEQUEUED → PROCESSED ─┐
///              │           │                                    │
///              ▼           ▼                                    ▼
///           FAILED      FAILED (routing)          follow-up re-enters send()
/// ```
///
/// Once [`start_processing`](Self::start_processing) has been called, each
/// agent gets a Tokio task that drains its queue. Clones share all state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: OrchestratorConfig,
    routing: RoutingTable,
    ledger: Ledger,
    /// `Some` while processing is running. Locked before `registry`.
    runtime: Mutex<Option<Handle>>,
    registry: RwLock<HashMap<AgentId, Registration>>,
    /// Locked after `registry` when both are needed.
    conversations: RwLock<HashMap<MessageId, Conversation>>,
    counters: Counters,
    average_processing_ms: Mutex<f64>,
}

struct Registration {
    agent: Arc<dyn Agent>,
    queue: Arc<MessageQueue>,
    metrics: Arc<Mutex<AgentMetrics>>,
    worker: Option<Worker>,
}

struct Worker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
    escalations: AtomicU64,
    agent_errors: AtomicU64,
}

/// What `try_send` needs to know about the sender.
struct SenderInfo {
    role: orgchain_core::AgentRole,
    manager_id: Option<AgentId>,
}

impl Orchestrator {
    /// Create an orchestrator. Fails if `config` does not validate.
    pub fn new(config: OrchestratorConfig, routing: RoutingTable, ledger: Ledger) -> OrgResult<Self> {
        config.validate()?;
        Ok(Self::build(config, routing, ledger))
    }

    /// Default configuration, hierarchy routing rules and a fresh ledger.
    pub fn with_defaults() -> Self {
        Self::build(
            OrchestratorConfig::default(),
            RoutingTable::hierarchy_defaults(),
            Ledger::new(),
        )
    }

    fn build(config: OrchestratorConfig, routing: RoutingTable, ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                routing,
                ledger,
                runtime: Mutex::new(None),
                registry: RwLock::new(HashMap::new()),
                conversations: RwLock::new(HashMap::new()),
                counters: Counters::default(),
                average_processing_ms: Mutex::new(0.0),
            }),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.inner.ledger
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.inner.routing
    }

    // ========================================================================
    // REGISTRATION
    // ========================================================================

    /// Register `agent` with an empty queue.
    ///
    /// Re-registering an id replaces the previous registration: its pending
    /// messages are dropped and counted as failed, and its worker is stopped.
    /// If processing is running, the new agent's worker starts immediately.
    pub fn register_agent(&self, agent: Arc<dyn Agent>) -> OrgResult<()> {
        let profile = agent.profile().clone();
        profile.validate()?;

        let runtime = self.inner.lock_runtime()?;
        let mut registry = self
            .inner
            .registry
            .write()
            .map_err(|_| DispatchError::LockPoisoned)?;

        let manager_of = |id: &str| -> Option<AgentId> {
            if id == profile.agent_id {
                profile.manager_id.clone()
            } else {
                registry
                    .get(id)
                    .and_then(|r| r.agent.profile().manager_id.clone())
            }
        };
        if let Some(path) = find_cycle(&profile.agent_id, manager_of) {
            warn!(agent_id = %profile.agent_id, ?path, "Rejected registration closing a management cycle");
            return Err(AgentError::HierarchyCycle { path }.into());
        }

        let mut registration = Registration {
            agent: Arc::clone(&agent),
            queue: Arc::new(MessageQueue::new()),
            metrics: Arc::new(Mutex::new(AgentMetrics::new())),
            worker: None,
        };
        if let Some(handle) = runtime.as_ref() {
            registration.worker = Some(self.inner.spawn_worker(handle, &registration));
        }

        if let Some(previous) = registry.insert(profile.agent_id.clone(), registration) {
            let dropped = self.inner.retire(&profile.agent_id, previous, "agent re-registered");
            info!(agent_id = %profile.agent_id, dropped, "Agent replaced");
        } else {
            info!(
                agent_id = %profile.agent_id,
                role = %profile.role,
                manager_id = ?profile.manager_id,
                "Agent registered"
            );
        }
        Ok(())
    }

    /// Remove an agent, dropping (and counting as failed) its pending
    /// messages and stopping its worker.
    pub fn unregister_agent(&self, agent_id: &str) -> OrgResult<()> {
        let removed = self
            .inner
            .registry
            .write()
            .map_err(|_| DispatchError::LockPoisoned)?
            .remove(agent_id);

        match removed {
            Some(registration) => {
                let dropped = self.inner.retire(agent_id, registration, "agent unregistered");
                info!(agent_id, dropped, "Agent unregistered");
                Ok(())
            }
            None => Err(AgentError::NotRegistered {
                agent_id: agent_id.to_string(),
            }
            .into()),
        }
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.inner
            .registry
            .read()
            .map(|r| r.contains_key(agent_id))
            .unwrap_or(false)
    }

    // ========================================================================
    // SENDING
    // ========================================================================

    /// Validate, log, route and enqueue `message`. Returns `false` on any
    /// failure; the reason is logged and counted.
    pub fn send(&self, message: Message) -> bool {
        self.inner.try_send(message).is_ok()
    }

    /// [`send`](Self::send) with the failure reason.
    pub fn try_send(&self, message: Message) -> OrgResult<DeliveryReceipt> {
        self.inner.try_send(message)
    }

    // ========================================================================
    // CONVERSATIONS & DECISIONS
    // ========================================================================

    pub fn conversation(&self, conversation_id: MessageId) -> Option<Conversation> {
        self.inner
            .conversations
            .read()
            .ok()
            .and_then(|c| c.get(&conversation_id).cloned())
    }

    /// Close a conversation; later responses in it fail to route.
    /// Returns whether it was open.
    pub fn close_conversation(&self, conversation_id: MessageId) -> OrgResult<bool> {
        let closed = self
            .inner
            .conversations
            .write()
            .map_err(|_| DispatchError::LockPoisoned)?
            .remove(&conversation_id)
            .is_some();
        if closed {
            debug!(%conversation_id, "Conversation closed");
        }
        Ok(closed)
    }

    /// Ask `agent_id` to decide on `context` and record the decision.
    pub fn record_decision(
        &self,
        agent_id: &str,
        context: &DecisionContext,
    ) -> OrgResult<(Decision, LedgerEntry)> {
        let agent = self.inner.agent(agent_id)?;
        let decision = agent.make_decision(context);
        let entry = self.inner.ledger.log_decision(agent_id, context, &decision)?;
        info!(
            agent_id,
            decision_type = %decision.decision_type,
            action = %decision.action,
            confidence = decision.confidence,
            block_number = entry.block_number,
            "Decision recorded"
        );
        Ok((decision, entry))
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Start one dispatch worker per registered agent on the current Tokio
    /// runtime. Returns the number of workers started; calling it again
    /// while running only starts workers that are missing.
    pub fn start_processing(&self) -> OrgResult<usize> {
        let handle = Handle::try_current().map_err(|_| DispatchError::RuntimeUnavailable)?;

        let mut runtime = self.inner.lock_runtime()?;
        let mut registry = self
            .inner
            .registry
            .write()
            .map_err(|_| DispatchError::LockPoisoned)?;

        let mut started = 0;
        for registration in registry.values_mut() {
            if registration.worker.is_none() {
                registration.worker = Some(self.inner.spawn_worker(&handle, registration));
                started += 1;
            }
        }
        *runtime = Some(handle);

        info!(workers = started, agents = registry.len(), "Processing started");
        Ok(started)
    }

    /// Signal every worker to exit after its current iteration and wait for
    /// each up to the configured shutdown timeout, aborting stragglers.
    /// Returns the number of workers stopped.
    pub async fn stop_processing(&self) -> OrgResult<usize> {
        let workers: Vec<(AgentId, Worker)> = {
            let mut runtime = self.inner.lock_runtime()?;
            let mut registry = self
                .inner
                .registry
                .write()
                .map_err(|_| DispatchError::LockPoisoned)?;
            *runtime = None;
            registry
                .iter_mut()
                .filter_map(|(id, r)| r.worker.take().map(|w| (id.clone(), w)))
                .collect()
        };

        for (_, worker) in &workers {
            let _ = worker.stop.send(true);
        }

        let count = workers.len();
        let timeout = self.inner.config.shutdown_timeout;
        for (agent_id, mut worker) in workers {
            if tokio::time::timeout(timeout, &mut worker.handle).await.is_err() {
                warn!(%agent_id, timeout_ms = timeout.as_millis() as u64, "Worker did not stop in time; aborting");
                worker.handle.abort();
            }
        }

        info!(workers = count, "Processing stopped");
        Ok(count)
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .runtime
            .lock()
            .map(|r| r.is_some())
            .unwrap_or(false)
    }

    // ========================================================================
    // STATUS
    // ========================================================================

    /// Snapshot of one agent.
    pub fn agent_status(&self, agent_id: &str) -> OrgResult<AgentStatus> {
        let registry = self
            .inner
            .registry
            .read()
            .map_err(|_| DispatchError::LockPoisoned)?;
        registry
            .get(agent_id)
            .map(|r| agent_status(&registry, r))
            .ok_or_else(|| {
                AgentError::NotRegistered {
                    agent_id: agent_id.to_string(),
                }
                .into()
            })
    }

    /// Snapshot of the whole system with a derived health label.
    pub fn system_status(&self) -> OrgResult<SystemStatus> {
        let running = self.is_running();

        let agents: BTreeMap<AgentId, AgentStatus> = {
            let registry = self
                .inner
                .registry
                .read()
                .map_err(|_| DispatchError::LockPoisoned)?;
            registry
                .iter()
                .map(|(id, r)| (id.clone(), agent_status(&registry, r)))
                .collect()
        };
        let active_conversations = self
            .inner
            .conversations
            .read()
            .map_err(|_| DispatchError::LockPoisoned)?
            .len();

        let queue_depths: BTreeMap<AgentId, usize> = agents
            .iter()
            .map(|(id, s)| (id.clone(), s.queue_depth))
            .collect();
        let total_queued: usize = queue_depths.values().sum();

        let counters = &self.inner.counters;
        let processed_count = counters.processed.load(Ordering::Relaxed);
        let failed_count = counters.failed.load(Ordering::Relaxed);
        let rate = failure_rate(processed_count, failed_count);

        Ok(SystemStatus {
            total_agents: agents.len(),
            queue_depths,
            total_queued,
            processed_count,
            failed_count,
            escalation_count: counters.escalations.load(Ordering::Relaxed),
            agent_error_count: counters.agent_errors.load(Ordering::Relaxed),
            average_processing_time_ms: *self
                .inner
                .average_processing_ms
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            active_conversations,
            ledger_entries: self.inner.ledger.len()?,
            running,
            failure_rate: rate,
            health: HealthLabel::assess(total_queued, rate, &self.inner.config.health_thresholds()),
            agents,
        })
    }
}

/// Status of one registration. Direct reports listed on the profile are
/// merged with the registered agents naming it as their manager.
fn agent_status(registry: &HashMap<AgentId, Registration>, registration: &Registration) -> AgentStatus {
    let mut profile = registration.agent.profile().clone();
    let mut reports: Vec<&AgentId> = registry
        .iter()
        .filter(|(_, r)| r.agent.profile().manager_id.as_ref() == Some(&profile.agent_id))
        .map(|(id, _)| id)
        .collect();
    reports.sort();
    for id in reports {
        profile = profile.with_subordinate(id.clone());
    }

    AgentStatus {
        profile,
        queue_depth: registration.queue.size(),
        worker_running: registration
            .worker
            .as_ref()
            .map(|w| !w.handle.is_finished())
            .unwrap_or(false),
        metrics: registration
            .metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone(),
    }
}

impl Inner {
    fn lock_runtime(&self) -> OrgResult<std::sync::MutexGuard<'_, Option<Handle>>> {
        self.runtime
            .lock()
            .map_err(|_| DispatchError::LockPoisoned.into())
    }

    fn agent(&self, agent_id: &str) -> OrgResult<Arc<dyn Agent>> {
        self.registry
            .read()
            .map_err(|_| DispatchError::LockPoisoned)?
            .get(agent_id)
            .map(|r| Arc::clone(&r.agent))
            .ok_or_else(|| {
                AgentError::NotRegistered {
                    agent_id: agent_id.to_string(),
                }
                .into()
            })
    }

    fn fail(&self, err: OrgError) -> OrgError {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        err
    }

    fn try_send(&self, mut message: Message) -> OrgResult<DeliveryReceipt> {
        let message_id = message.id();
        let registry = self
            .registry
            .read()
            .map_err(|_| self.fail(DispatchError::LockPoisoned.into()))?;

        // 1. Validate. Nothing is logged for an invalid message.
        let sender = match validate(&registry, &message) {
            Ok(sender) => sender,
            Err(err) => {
                warn!(%message_id, sender_id = %message.sender_id, error = %err, "Message rejected");
                return Err(self.fail(err.into()));
            }
        };

        // 2. Route, then log the attempt whatever the outcome. A routed
        // message is logged with its resolved recipient.
        let routed = self.resolve_recipient(&registry, &sender, &message);
        if let Ok(recipient_id) = &routed {
            message.recipient_id = Some(recipient_id.clone());
        }
        let entry = self.ledger.log_message(&message).map_err(|err| {
            error!(%message_id, error = %err, "Failed to log message");
            self.fail(err)
        })?;

        let recipient_id = match routed {
            Ok(recipient_id) => recipient_id,
            Err(err) => {
                warn!(
                    %message_id,
                    sender_id = %message.sender_id,
                    message_type = %message.message_type,
                    block_number = entry.block_number,
                    error = %err,
                    "Message could not be routed"
                );
                return Err(self.fail(err.into()));
            }
        };
        let Some(target) = registry.get(&recipient_id) else {
            return Err(self.fail(
                RoutingError::UnknownRecipient {
                    recipient_id: recipient_id.clone(),
                }
                .into(),
            ));
        };

        // 3. Open the conversation before the recipient's worker can see
        // the message.
        let message_type = message.message_type;
        let priority = message.priority;
        let sender_id = message.sender_id.clone();
        self.track_conversation(message_id, message_type, message.conversation_id(), &sender_id);

        // 4. Enqueue.
        target.queue.enqueue(message);
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        if message_type == MessageType::Escalation {
            self.counters.escalations.fetch_add(1, Ordering::Relaxed);
        }

        debug!(
            %message_id,
            %sender_id,
            %recipient_id,
            %message_type,
            %priority,
            block_number = entry.block_number,
            "Message enqueued"
        );

        Ok(DeliveryReceipt {
            message_id,
            recipient_id,
            block_number: entry.block_number,
        })
    }

    fn resolve_recipient(
        &self,
        registry: &HashMap<AgentId, Registration>,
        sender: &SenderInfo,
        message: &Message,
    ) -> Result<AgentId, RoutingError> {
        let explicit = message
            .recipient_id
            .as_ref()
            .filter(|r| registry.contains_key(r.as_str()));

        let recipient_id = match (explicit, message.message_type) {
            (Some(recipient_id), _) => recipient_id.clone(),
            (None, MessageType::Escalation | MessageType::Report) => {
                sender.manager_id.clone().ok_or_else(|| RoutingError::NoManager {
                    agent_id: message.sender_id.clone(),
                    message_type: message.message_type,
                })?
            }
            (None, MessageType::Response) => {
                let conversations = self.conversations.read().map_err(|_| {
                    RoutingError::NoOpenConversation {
                        message_id: message.id(),
                    }
                })?;
                message
                    .conversation_id()
                    .and_then(|id| conversations.get(&id))
                    .map(|c| c.original_sender_id.clone())
                    .ok_or_else(|| RoutingError::NoOpenConversation {
                        message_id: message.id(),
                    })?
            }
            (None, MessageType::Request | MessageType::Notification) => {
                return Err(match &message.recipient_id {
                    Some(recipient_id) => RoutingError::UnknownRecipient {
                        recipient_id: recipient_id.clone(),
                    },
                    None => RoutingError::MissingRecipient {
                        message_id: message.id(),
                        message_type: message.message_type,
                    },
                });
            }
        };

        let Some(target) = registry.get(&recipient_id) else {
            return Err(RoutingError::UnknownRecipient { recipient_id });
        };

        if self.config.enforce_routing_rules {
            self.routing.check(
                sender.role,
                target.agent.profile().role,
                message.message_type,
                message.priority,
            )?;
        }

        Ok(recipient_id)
    }

    fn track_conversation(
        &self,
        message_id: MessageId,
        message_type: MessageType,
        conversation_id: Option<MessageId>,
        sender_id: &str,
    ) {
        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();

        if message_type.opens_conversation() {
            conversations.insert(
                message_id,
                Conversation {
                    original_sender_id: sender_id.to_string(),
                    started_at: now,
                    last_activity: now,
                    message_count: 1,
                },
            );
        } else if message_type == MessageType::Response {
            if let Some(conversation) = conversation_id.and_then(|id| conversations.get_mut(&id)) {
                conversation.message_count += 1;
                conversation.last_activity = now;
            }
        }
    }

    /// Tear down a registration that has left the registry.
    fn retire(&self, agent_id: &str, registration: Registration, reason: &str) -> usize {
        if let Some(worker) = registration.worker {
            let _ = worker.stop.send(true);
        }

        let dropped = registration.queue.drain();
        for message in &dropped {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                agent_id,
                message_id = %message.id(),
                sender_id = %message.sender_id,
                message_type = %message.message_type,
                reason,
                "Pending message dropped"
            );
        }
        dropped.len()
    }

    fn observe_processing_time(&self, elapsed: Duration) {
        let alpha = self.config.processing_time_alpha;
        let sample = elapsed.as_secs_f64() * 1000.0;
        let mut average = self
            .average_processing_ms
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *average = alpha * sample + (1.0 - alpha) * *average;
    }

    fn spawn_worker(self: &Arc<Self>, handle: &Handle, registration: &Registration) -> Worker {
        let (stop, stop_rx) = watch::channel(false);
        let handle = handle.spawn(run_worker(
            Arc::downgrade(self),
            Arc::clone(&registration.agent),
            Arc::clone(&registration.queue),
            Arc::clone(&registration.metrics),
            stop_rx,
            self.config.dequeue_timeout,
        ));
        Worker { stop, handle }
    }

    /// One worker iteration after a message was dequeued.
    async fn dispatch(
        &self,
        agent: &Arc<dyn Agent>,
        metrics: &Mutex<AgentMetrics>,
        message: Message,
    ) {
        let started = Instant::now();
        let agent_id = agent.agent_id().to_string();
        let message_id = message.id();
        metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_received();

        // Run the agent in its own task so a panic is contained to this message.
        let task_agent = Arc::clone(agent);
        let outcome = tokio::spawn(async move { task_agent.process_message(message).await }).await;

        let elapsed = started.elapsed();
        let alpha = self.config.processing_time_alpha;

        let follow_up = match outcome {
            Ok(Ok(follow_up)) => {
                metrics
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record_completed(elapsed, follow_up.is_some(), alpha);
                follow_up
            }
            Ok(Err(err)) => {
                self.counters.agent_errors.fetch_add(1, Ordering::Relaxed);
                metrics
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record_failure(elapsed, alpha);
                error!(%agent_id, %message_id, error = %err, "Agent failed to process message");
                None
            }
            Err(join_err) => {
                self.counters.agent_errors.fetch_add(1, Ordering::Relaxed);
                metrics
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record_failure(elapsed, alpha);
                error!(%agent_id, %message_id, error = %join_err, "Agent panicked while processing message");
                None
            }
        };

        if let Some(follow_up) = follow_up {
            let follow_up_id = follow_up.id();
            if let Err(err) = self.try_send(follow_up) {
                debug!(%agent_id, %message_id, %follow_up_id, error = %err, "Follow-up message not delivered");
            }
        }

        // The system average covers the whole iteration, follow-up included.
        self.observe_processing_time(started.elapsed());
    }
}

/// Sender checks: non-empty id, registered, non-empty content.
fn validate(
    registry: &HashMap<AgentId, Registration>,
    message: &Message,
) -> Result<SenderInfo, ValidationError> {
    if message.sender_id.trim().is_empty() {
        return Err(ValidationError::EmptySender {
            message_id: message.id(),
        });
    }
    let Some(sender) = registry.get(&message.sender_id) else {
        return Err(ValidationError::UnknownSender {
            sender_id: message.sender_id.clone(),
        });
    };
    if message.content.is_empty() {
        return Err(ValidationError::MissingContent {
            message_id: message.id(),
        });
    }

    let profile: &AgentProfile = sender.agent.profile();
    Ok(SenderInfo {
        role: profile.role,
        manager_id: profile.manager_id.clone(),
    })
}

async fn run_worker(
    inner: Weak<Inner>,
    agent: Arc<dyn Agent>,
    queue: Arc<MessageQueue>,
    metrics: Arc<Mutex<AgentMetrics>>,
    mut stop: watch::Receiver<bool>,
    dequeue_timeout: Duration,
) {
    let agent_id = agent.agent_id().to_string();
    info!(%agent_id, "Dispatch worker started");

    loop {
        if *stop.borrow() {
            break;
        }

        let message = tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
            message = queue.dequeue(dequeue_timeout) => message,
        };

        let Some(message) = message else {
            continue;
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.dispatch(&agent, &metrics, message).await;
    }

    info!(%agent_id, "Dispatch worker stopped");
}
