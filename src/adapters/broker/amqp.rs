//! RabbitMQ broker.
//!
//! Topology:
//! - Task queue `feed.materialization`: durable, `x-message-ttl` bounds
//!   redelivery, `x-max-priority = 5`. Tasks go through the default
//!   exchange, persistent, with message id `recipient:post:nanos`.
//! - Live channel: durable topic exchange `feed.events`. Each process binds
//!   a server-named exclusive queue with `feed.event.#` and consumes it
//!   without acks.
//!
//! Publishing retries with exponential backoff; consumers reconnect with
//! backoff and jitter until the broker is closed.

use std::time::Duration;

use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use deadpool_lapin::{Manager, Pool, PoolError};
use futures::StreamExt;
use lapin::{
    acker::Acker,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, Consumer, ExchangeKind,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::feed::{FeedEvent, FeedUpdateTask, Priority};
use crate::domain::foundation::UserId;
use crate::ports::{
    live_routing_key, Acknowledger, BrokerError, LiveConsumer, LiveDelivery, LiveEventChannel,
    MessageBroker, TaskConsumer, TaskDelivery, TaskQueue, LIVE_BINDING_PATTERN,
};

const MAX_PUBLISH_RETRIES: usize = 5;
const TASK_CONSUMER_TAG: &str = "feed-fanout-worker";
const LIVE_CONSUMER_TAG: &str = "feed-fanout-live";

/// Configuration for [`AmqpBroker`].
#[derive(Clone, Debug)]
pub struct AmqpConfig {
    pub url: String,
    pub exchange: String,
    pub task_queue: String,
    pub message_ttl: Duration,
    pub prefetch: u16,
    pub pool_size: usize,
}

impl AmqpConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exchange: "feed.events".to_string(),
            task_queue: "feed.materialization".to_string(),
            message_ttl: Duration::from_secs(24 * 60 * 60),
            prefetch: 16,
            pool_size: 10,
        }
    }
}

/// Broker priority for a task priority: 1 (high) maps to 5, 5 (low) to 1.
pub fn amqp_priority(priority: Priority) -> u8 {
    Priority::MAX_VALUE + 1 - priority.value()
}

fn task_queue_arguments(config: &AmqpConfig) -> FieldTable {
    let mut args = FieldTable::default();
    args.insert(
        "x-message-ttl".into(),
        AMQPValue::LongUInt(config.message_ttl.as_millis().min(u32::MAX as u128) as u32),
    );
    args.insert(
        "x-max-priority".into(),
        AMQPValue::ShortShortUInt(Priority::MAX_VALUE),
    );
    args
}

fn reconnect_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(30))
        .with_jitter()
}

async fn open_channel(pool: &Pool) -> Result<Channel, BrokerError> {
    let conn = pool.get().await.map_err(|e: PoolError| {
        BrokerError::Connection(format!("Failed to get connection from pool: {}", e))
    })?;
    conn.create_channel()
        .await
        .map_err(|e| BrokerError::Connection(format!("Failed to create channel: {}", e)))
}

async fn declare_topology(channel: &Channel, config: &AmqpConfig) -> Result<(), BrokerError> {
    channel
        .exchange_declare(
            &config.exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| BrokerError::Connection(format!("Failed to declare exchange: {}", e)))?;

    channel
        .queue_declare(
            &config.task_queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            task_queue_arguments(config),
        )
        .await
        .map_err(|e| BrokerError::Connection(format!("Failed to declare queue: {}", e)))?;

    Ok(())
}

/// RabbitMQ implementation of both broker channels.
pub struct AmqpBroker {
    pool: Pool,
    config: AmqpConfig,
    closed: CancellationToken,
}

impl AmqpBroker {
    /// Connects and declares the exchange and task queue.
    pub async fn connect(config: AmqpConfig) -> Result<Self, BrokerError> {
        let manager = Manager::new(config.url.clone(), Default::default());
        let pool = Pool::builder(manager)
            .max_size(config.pool_size.max(1))
            .build()
            .map_err(|e| BrokerError::Connection(format!("Failed to create pool: {}", e)))?;

        let channel = open_channel(&pool).await?;
        declare_topology(&channel, &config).await?;

        info!(
            exchange = %config.exchange,
            queue = %config.task_queue,
            "Connected to AMQP"
        );

        Ok(Self {
            pool,
            config,
            closed: CancellationToken::new(),
        })
    }

    async fn publish_with_retry(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), BrokerError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(MAX_PUBLISH_RETRIES)
            .with_jitter()
            .build();

        let mut last_error = None;

        for (attempt, delay) in std::iter::once(Duration::ZERO).chain(backoff).enumerate() {
            if self.closed.is_cancelled() {
                return Err(BrokerError::Closed);
            }
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }

            // Fresh channel per attempt picks up a reconnected pool.
            let channel = match open_channel(&self.pool).await {
                Ok(ch) => ch,
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Failed to get channel, retrying");
                    last_error = Some(e);
                    continue;
                }
            };

            match channel
                .basic_publish(
                    exchange,
                    routing_key,
                    BasicPublishOptions::default(),
                    payload,
                    properties.clone(),
                )
                .await
            {
                Ok(confirm) => match confirm.await {
                    Ok(_) => {
                        debug!(exchange = %exchange, routing_key = %routing_key, "Published");
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(attempt = attempt + 1, error = %e, "Publish confirmation failed, retrying");
                        last_error = Some(BrokerError::Publish(format!(
                            "Publish confirmation failed: {}",
                            e
                        )));
                    }
                },
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Publish failed, retrying");
                    last_error = Some(BrokerError::Publish(format!("Failed to publish: {}", e)));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| BrokerError::Publish("Max retries exceeded".to_string())))
    }
}

#[async_trait]
impl TaskQueue for AmqpBroker {
    async fn publish_task(&self, task: &FeedUpdateTask) -> Result<(), BrokerError> {
        let payload = task.encode()?;
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2)
            .with_priority(amqp_priority(task.priority))
            .with_message_id(task.message_id().into())
            .with_timestamp(task.created_at.as_datetime().timestamp().max(0) as u64);

        // Default exchange routes by queue name.
        self.publish_with_retry("", &self.config.task_queue, &payload, properties)
            .await
    }

    async fn consume_tasks(&self) -> Result<Box<dyn TaskConsumer>, BrokerError> {
        if self.closed.is_cancelled() {
            return Err(BrokerError::Closed);
        }
        Ok(Box::new(AmqpTaskConsumer {
            pool: self.pool.clone(),
            config: self.config.clone(),
            closed: self.closed.clone(),
            active: None,
            backoff: reconnect_backoff().build(),
        }))
    }
}

#[async_trait]
impl LiveEventChannel for AmqpBroker {
    async fn publish_live(&self, recipient: &UserId, event: &FeedEvent) -> Result<(), BrokerError> {
        let payload = serde_json::to_vec(event)?;
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(1);

        self.publish_with_retry(
            &self.config.exchange,
            &live_routing_key(recipient),
            &payload,
            properties,
        )
        .await
    }

    async fn subscribe_live(&self) -> Result<Box<dyn LiveConsumer>, BrokerError> {
        if self.closed.is_cancelled() {
            return Err(BrokerError::Closed);
        }
        Ok(Box::new(AmqpLiveConsumer {
            pool: self.pool.clone(),
            exchange: self.config.exchange.clone(),
            closed: self.closed.clone(),
            active: None,
            backoff: reconnect_backoff().build(),
        }))
    }
}

#[async_trait]
impl MessageBroker for AmqpBroker {
    async fn close(&self) -> Result<(), BrokerError> {
        self.closed.cancel();
        self.pool.close();
        info!("AMQP broker closed");
        Ok(())
    }
}

/// Waits out one backoff step. Returns false if the broker closed meanwhile.
async fn pause(backoff: &mut ExponentialBackoff, closed: &CancellationToken) -> bool {
    let delay = backoff.next().unwrap_or(Duration::from_secs(30));
    tokio::select! {
        _ = closed.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

// ============================================================================
// Task consumer
// ============================================================================

struct AmqpTaskConsumer {
    pool: Pool,
    config: AmqpConfig,
    closed: CancellationToken,
    // Channel kept alongside its consumer for the consumer's lifetime.
    active: Option<(Channel, Consumer)>,
    backoff: ExponentialBackoff,
}

impl AmqpTaskConsumer {
    async fn setup(&self) -> Result<(Channel, Consumer), BrokerError> {
        let channel = open_channel(&self.pool).await?;
        declare_topology(&channel, &self.config).await?;

        channel
            .basic_qos(self.config.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::Consume(format!("Failed to set prefetch: {}", e)))?;

        let consumer = channel
            .basic_consume(
                &self.config.task_queue,
                TASK_CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Consume(format!("Failed to start consumer: {}", e)))?;

        Ok((channel, consumer))
    }
}

#[async_trait]
impl TaskConsumer for AmqpTaskConsumer {
    async fn next(&mut self) -> Option<Result<TaskDelivery, BrokerError>> {
        loop {
            if self.closed.is_cancelled() {
                return None;
            }

            if self.active.is_none() {
                match self.setup().await {
                    Ok(active) => {
                        info!(queue = %self.config.task_queue, "Task consumer connected");
                        self.active = Some(active);
                        self.backoff = reconnect_backoff().build();
                    }
                    Err(e) => {
                        error!(error = %e, queue = %self.config.task_queue, "Failed to set up task consumer, retrying after backoff");
                        if !pause(&mut self.backoff, &self.closed).await {
                            return None;
                        }
                    }
                }
                continue;
            }

            let Some((_, consumer)) = self.active.as_mut() else {
                continue;
            };

            match consumer.next().await {
                Some(Ok(delivery)) => {
                    let acker = AmqpAcker {
                        acker: delivery.acker,
                    };
                    return Some(Ok(TaskDelivery::new(
                        delivery.data,
                        delivery.redelivered,
                        Box::new(acker),
                    )));
                }
                Some(Err(e)) => {
                    error!(error = %e, "Task consumer delivery error, will reconnect");
                    self.active = None;
                }
                None => {
                    info!("Task consumer stream ended, reconnecting");
                    self.active = None;
                    if !pause(&mut self.backoff, &self.closed).await {
                        return None;
                    }
                }
            }
        }
    }
}

struct AmqpAcker {
    acker: Acker,
}

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Acknowledge(e.to_string()))
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.acker
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Acknowledge(e.to_string()))
    }
}

// ============================================================================
// Live consumer
// ============================================================================

struct AmqpLiveConsumer {
    pool: Pool,
    exchange: String,
    closed: CancellationToken,
    active: Option<(Channel, Consumer)>,
    backoff: ExponentialBackoff,
}

impl AmqpLiveConsumer {
    async fn setup(&self) -> Result<(Channel, Consumer), BrokerError> {
        let channel = open_channel(&self.pool).await?;

        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Consume(format!("Failed to declare exchange: {}", e)))?;

        // Server-named, exclusive: one private queue per process.
        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Consume(format!("Failed to declare live queue: {}", e)))?;

        channel
            .queue_bind(
                queue.name().as_str(),
                &self.exchange,
                LIVE_BINDING_PATTERN,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Consume(format!("Failed to bind live queue: {}", e)))?;

        let consumer = channel
            .basic_consume(
                queue.name().as_str(),
                LIVE_CONSUMER_TAG,
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Consume(format!("Failed to start live consumer: {}", e)))?;

        info!(queue = %queue.name().as_str(), binding = LIVE_BINDING_PATTERN, "Live consumer bound");
        Ok((channel, consumer))
    }
}

#[async_trait]
impl LiveConsumer for AmqpLiveConsumer {
    async fn next(&mut self) -> Option<Result<LiveDelivery, BrokerError>> {
        loop {
            if self.closed.is_cancelled() {
                return None;
            }

            if self.active.is_none() {
                match self.setup().await {
                    Ok(active) => {
                        self.active = Some(active);
                        self.backoff = reconnect_backoff().build();
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to set up live consumer, retrying after backoff");
                        if !pause(&mut self.backoff, &self.closed).await {
                            return None;
                        }
                    }
                }
                continue;
            }

            let Some((_, consumer)) = self.active.as_mut() else {
                continue;
            };

            match consumer.next().await {
                Some(Ok(delivery)) => {
                    return Some(Ok(LiveDelivery {
                        routing_key: delivery.routing_key.to_string(),
                        body: delivery.data,
                    }));
                }
                Some(Err(e)) => {
                    error!(error = %e, "Live consumer delivery error, will reconnect");
                    self.active = None;
                }
                None => {
                    info!("Live consumer stream ended, reconnecting");
                    self.active = None;
                    if !pause(&mut self.backoff, &self.closed).await {
                        return None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::ShortString;

    #[test]
    fn task_priority_inverts_for_broker() {
        assert_eq!(amqp_priority(Priority::HIGH), 5);
        assert_eq!(amqp_priority(Priority::MEDIUM), 3);
        assert_eq!(amqp_priority(Priority::LOW), 1);
    }

    #[test]
    fn default_config_uses_standard_names() {
        let config = AmqpConfig::new("amqp://localhost:5672");
        assert_eq!(config.exchange, "feed.events");
        assert_eq!(config.task_queue, "feed.materialization");
        assert_eq!(config.message_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn task_queue_declares_ttl_and_max_priority() {
        let args = task_queue_arguments(&AmqpConfig::new("amqp://localhost"));
        let inner = args.inner();
        assert_eq!(
            inner.get(&ShortString::from("x-message-ttl")),
            Some(&AMQPValue::LongUInt(86_400_000))
        );
        assert_eq!(
            inner.get(&ShortString::from("x-max-priority")),
            Some(&AMQPValue::ShortShortUInt(5))
        );
    }
}
