//! In-process broker for tests and single-node deployments.
//!
//! Task queue semantics mirror the durable queue closely enough to exercise
//! the worker: priority ordering (1 first, FIFO within a priority), explicit
//! ack/nack, redelivery flag, and dead-lettering once a task has been
//! requeued more than `max_redeliveries` times. Only the last
//! `max_dead_letters` bodies are kept. Nothing survives a restart.
//!
//! The live channel is a `broadcast` fan-out; slow subscribers lose the
//! oldest messages, which matches its best-effort contract.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;

use crate::domain::feed::{FeedEvent, FeedUpdateTask};
use crate::domain::foundation::UserId;
use crate::ports::{
    live_routing_key, Acknowledger, BrokerError, LiveConsumer, LiveDelivery, LiveEventChannel,
    MessageBroker, TaskConsumer, TaskDelivery, TaskQueue,
};

/// Configuration for [`InMemoryBroker`].
#[derive(Debug, Clone)]
pub struct InMemoryBrokerConfig {
    /// Requeues allowed before a task is dead-lettered.
    pub max_redeliveries: u32,
    /// Buffered live messages per subscriber.
    pub live_capacity: usize,
    /// Dead-lettered bodies kept for inspection; older ones are dropped.
    pub max_dead_letters: usize,
}

impl Default for InMemoryBrokerConfig {
    fn default() -> Self {
        Self {
            max_redeliveries: 5,
            live_capacity: 1024,
            max_dead_letters: 1000,
        }
    }
}

impl InMemoryBrokerConfig {
    pub fn with_max_redeliveries(mut self, max: u32) -> Self {
        self.max_redeliveries = max;
        self
    }

    pub fn with_max_dead_letters(mut self, max: usize) -> Self {
        self.max_dead_letters = max;
        self
    }
}

#[derive(Debug, Clone)]
struct Queued {
    id: u64,
    priority: u8,
    seq: u64,
    body: Vec<u8>,
    requeues: u32,
    redelivered: bool,
}

// BinaryHeap is a max-heap: the "greatest" element is the lowest priority
// number, then the oldest sequence.
impl Ord for Queued {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Queued {}

#[derive(Default)]
struct QueueState {
    ready: BinaryHeap<Queued>,
    unacked: HashMap<u64, Queued>,
    dead_letters: VecDeque<Vec<u8>>,
    dead_lettered: u64,
    next_id: u64,
    acked: u64,
    rejected: u64,
}

struct Shared {
    queue: Mutex<QueueState>,
    available: Notify,
    live: broadcast::Sender<LiveDelivery>,
    closed: CancellationToken,
    config: InMemoryBrokerConfig,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enqueue(&self, priority: u8, body: Vec<u8>) {
        {
            let mut state = self.queue();
            state.next_id += 1;
            let id = state.next_id;
            state.ready.push(Queued {
                id,
                priority,
                seq: id,
                body,
                requeues: 0,
                redelivered: false,
            });
        }
        self.available.notify_waiters();
    }
}

/// Broker backed by process memory.
#[derive(Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_config(InMemoryBrokerConfig::default())
    }

    pub fn with_config(config: InMemoryBrokerConfig) -> Self {
        let (live, _) = broadcast::channel(config.live_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState::default()),
                available: Notify::new(),
                live,
                closed: CancellationToken::new(),
                config,
            }),
        }
    }

    // === Test Helpers ===

    /// Enqueues an arbitrary body, bypassing task encoding.
    pub fn publish_raw(&self, priority: u8, body: Vec<u8>) {
        self.shared.enqueue(priority, body);
    }

    /// Tasks waiting for a consumer, in delivery order. Undecodable bodies are skipped.
    pub fn pending_tasks(&self) -> Vec<FeedUpdateTask> {
        let mut ready: Vec<Queued> = self.shared.queue().ready.clone().into_vec();
        ready.sort_by(|a, b| b.cmp(a));
        ready
            .iter()
            .filter_map(|q| FeedUpdateTask::decode(&q.body).ok())
            .collect()
    }

    pub fn ready_count(&self) -> usize {
        self.shared.queue().ready.len()
    }

    pub fn unacked_count(&self) -> usize {
        self.shared.queue().unacked.len()
    }

    pub fn acked_count(&self) -> u64 {
        self.shared.queue().acked
    }

    /// Tasks dropped by a reject (nack without requeue).
    pub fn rejected_count(&self) -> u64 {
        self.shared.queue().rejected
    }

    /// Most recent dead-lettered bodies, oldest first.
    pub fn dead_letters(&self) -> Vec<Vec<u8>> {
        self.shared.queue().dead_letters.iter().cloned().collect()
    }

    /// Every task dead-lettered since start, including dropped bodies.
    pub fn dead_lettered_count(&self) -> u64 {
        self.shared.queue().dead_lettered
    }

    /// True once nothing is ready or awaiting settlement.
    pub fn is_drained(&self) -> bool {
        let state = self.shared.queue();
        state.ready.is_empty() && state.unacked.is_empty()
    }

    pub fn live_subscriber_count(&self) -> usize {
        self.shared.live.receiver_count()
    }

    /// Waits until at least `count` live subscribers are attached.
    pub async fn wait_for_live_subscribers(&self, count: usize) {
        while self.live_subscriber_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for InMemoryBroker {
    async fn publish_task(&self, task: &FeedUpdateTask) -> Result<(), BrokerError> {
        if self.shared.closed.is_cancelled() {
            return Err(BrokerError::Closed);
        }
        let body = task.encode()?;
        self.shared.enqueue(task.priority.value(), body);
        Ok(())
    }

    async fn consume_tasks(&self) -> Result<Box<dyn TaskConsumer>, BrokerError> {
        if self.shared.closed.is_cancelled() {
            return Err(BrokerError::Closed);
        }
        Ok(Box::new(InMemoryTaskConsumer {
            shared: Arc::clone(&self.shared),
        }))
    }
}

#[async_trait]
impl LiveEventChannel for InMemoryBroker {
    async fn publish_live(&self, recipient: &UserId, event: &FeedEvent) -> Result<(), BrokerError> {
        if self.shared.closed.is_cancelled() {
            return Err(BrokerError::Closed);
        }
        let delivery = LiveDelivery {
            routing_key: live_routing_key(recipient),
            body: serde_json::to_vec(event)?,
        };
        // No subscribers is not an error for a best-effort channel.
        let _ = self.shared.live.send(delivery);
        Ok(())
    }

    async fn subscribe_live(&self) -> Result<Box<dyn LiveConsumer>, BrokerError> {
        if self.shared.closed.is_cancelled() {
            return Err(BrokerError::Closed);
        }
        Ok(Box::new(InMemoryLiveConsumer {
            receiver: self.shared.live.subscribe(),
            closed: self.shared.closed.clone(),
        }))
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn close(&self) -> Result<(), BrokerError> {
        self.shared.closed.cancel();
        self.shared.available.notify_waiters();
        tracing::info!("In-memory broker closed");
        Ok(())
    }
}

struct InMemoryTaskConsumer {
    shared: Arc<Shared>,
}

#[async_trait]
impl TaskConsumer for InMemoryTaskConsumer {
    async fn next(&mut self) -> Option<Result<TaskDelivery, BrokerError>> {
        loop {
            // Register interest before checking, so a publish between the
            // check and the await is not missed.
            let notified = self.shared.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.closed.is_cancelled() {
                return None;
            }

            let taken = {
                let mut state = self.shared.queue();
                state.ready.pop().map(|queued| {
                    let delivery = (queued.id, queued.body.clone(), queued.redelivered);
                    state.unacked.insert(queued.id, queued);
                    delivery
                })
            };

            if let Some((id, body, redelivered)) = taken {
                let acker = InMemoryAcker {
                    shared: Arc::clone(&self.shared),
                    id,
                };
                return Some(Ok(TaskDelivery::new(body, redelivered, Box::new(acker))));
            }

            notified.await;
        }
    }
}

struct InMemoryAcker {
    shared: Arc<Shared>,
    id: u64,
}

#[async_trait]
impl Acknowledger for InMemoryAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        let mut state = self.shared.queue();
        match state.unacked.remove(&self.id) {
            Some(_) => {
                state.acked += 1;
                Ok(())
            }
            None => Err(BrokerError::Acknowledge(format!(
                "delivery {} already settled",
                self.id
            ))),
        }
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        let requeued = {
            let mut state = self.shared.queue();
            let Some(mut queued) = state.unacked.remove(&self.id) else {
                return Err(BrokerError::Acknowledge(format!(
                    "delivery {} already settled",
                    self.id
                )));
            };

            if !requeue {
                state.rejected += 1;
                false
            } else if queued.requeues >= self.shared.config.max_redeliveries {
                tracing::warn!(
                    delivery = self.id,
                    requeues = queued.requeues,
                    "Task exceeded redelivery limit, dead-lettered"
                );
                state.dead_lettered += 1;
                let cap = self.shared.config.max_dead_letters;
                if cap > 0 {
                    if state.dead_letters.len() >= cap {
                        state.dead_letters.pop_front();
                    }
                    state.dead_letters.push_back(queued.body);
                }
                false
            } else {
                queued.requeues += 1;
                queued.redelivered = true;
                state.ready.push(queued);
                true
            }
        };

        if requeued {
            self.shared.available.notify_waiters();
        }
        Ok(())
    }
}

struct InMemoryLiveConsumer {
    receiver: broadcast::Receiver<LiveDelivery>,
    closed: CancellationToken,
}

#[async_trait]
impl LiveConsumer for InMemoryLiveConsumer {
    async fn next(&mut self) -> Option<Result<LiveDelivery, BrokerError>> {
        loop {
            tokio::select! {
                _ = self.closed.cancelled() => return None,
                received = self.receiver.recv() => match received {
                    Ok(delivery) => return Some(Ok(delivery)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Live subscriber lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    }
}
