//! Message broker ports: the durable task queue and the live event channel.
//!
//! ```text
//!   FanoutScheduler ──publish_task──▶ [ task queue ] ──TaskConsumer──▶ MaterializationWorker
//!         │
//!         └──publish_live──▶ feed.event.{recipient} ──LiveConsumer──▶ LiveEventConsumer ──▶ Hub
//! ```
//!
//! The task queue is at-least-once and priority-aware; consumers must ack,
//! reject (drop permanently) or requeue every delivery. The live channel is
//! best-effort and unacknowledged.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::feed::{FeedEvent, FeedUpdateTask};
use crate::domain::foundation::UserId;

/// Routing key prefix of the live channel.
pub const LIVE_ROUTING_PREFIX: &str = "feed.event.";

/// Binding that matches every recipient's live routing key.
pub const LIVE_BINDING_PATTERN: &str = "feed.event.#";

/// Routing key for events addressed to `recipient`.
pub fn live_routing_key(recipient: &UserId) -> String {
    format!("{}{}", LIVE_ROUTING_PREFIX, recipient)
}

/// Recovers the recipient from a live routing key.
///
/// Returns `None` for keys outside the live namespace or with an empty id.
pub fn recipient_from_routing_key(routing_key: &str) -> Option<UserId> {
    routing_key
        .strip_prefix(LIVE_ROUTING_PREFIX)
        .and_then(|id| UserId::new(id).ok())
}

/// Errors raised by broker adapters.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Consume failed: {0}")]
    Consume(String),

    #[error("Acknowledgement failed: {0}")]
    Acknowledge(String),

    #[error("Payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Broker is closed")]
    Closed,
}

/// Settles one task delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), BrokerError>;

    /// Negative acknowledgement; `requeue = false` drops the message.
    async fn nack(&self, requeue: bool) -> Result<(), BrokerError>;
}

/// A task message handed to a consumer, not yet settled.
pub struct TaskDelivery {
    pub body: Vec<u8>,
    pub redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl TaskDelivery {
    pub fn new(body: Vec<u8>, redelivered: bool, acker: Box<dyn Acknowledger>) -> Self {
        Self {
            body,
            redelivered,
            acker,
        }
    }

    /// Removes the task from the queue.
    pub async fn ack(self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }

    /// Drops the task permanently; used for payloads retry cannot repair.
    pub async fn reject(self) -> Result<(), BrokerError> {
        self.acker.nack(false).await
    }

    /// Returns the task to the queue for another attempt.
    pub async fn requeue(self) -> Result<(), BrokerError> {
        self.acker.nack(true).await
    }
}

impl std::fmt::Debug for TaskDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDelivery")
            .field("bytes", &self.body.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

/// Stream of task deliveries.
///
/// `next` must be cancel-safe so it can sit in a `select!` next to a
/// shutdown signal. `None` means the subscription has ended for good.
#[async_trait]
pub trait TaskConsumer: Send {
    async fn next(&mut self) -> Option<Result<TaskDelivery, BrokerError>>;
}

/// Durable, priority-capable queue of [`FeedUpdateTask`]s.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn publish_task(&self, task: &FeedUpdateTask) -> Result<(), BrokerError>;

    async fn consume_tasks(&self) -> Result<Box<dyn TaskConsumer>, BrokerError>;
}

/// One message received from the live channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveDelivery {
    pub routing_key: String,
    pub body: Vec<u8>,
}

/// Stream of live deliveries. Same cancel-safety contract as [`TaskConsumer`].
#[async_trait]
pub trait LiveConsumer: Send {
    async fn next(&mut self) -> Option<Result<LiveDelivery, BrokerError>>;
}

/// Topic channel keyed by recipient (`feed.event.{recipient}`).
#[async_trait]
pub trait LiveEventChannel: Send + Sync {
    async fn publish_live(&self, recipient: &UserId, event: &FeedEvent) -> Result<(), BrokerError>;

    /// Subscribes to every recipient's routing key.
    async fn subscribe_live(&self) -> Result<Box<dyn LiveConsumer>, BrokerError>;
}

/// A broker offering both channels, with an explicit shutdown.
#[async_trait]
pub trait MessageBroker: TaskQueue + LiveEventChannel {
    /// Releases the connection. Publishing afterwards fails with `Closed`.
    async fn close(&self) -> Result<(), BrokerError>;
}
