//! Forwards live-channel events to the recipients' sockets on this process.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::domain::feed::FeedEvent;
use crate::ports::{recipient_from_routing_key, BrokerError, LiveDelivery, LiveEventChannel};

use super::hub::{DeliveryReport, LiveConnectionHub};
use super::messages::post_frame;

/// Consumes `feed.event.*` and hands each event to the hub.
pub struct LiveEventConsumer {
    channel: Arc<dyn LiveEventChannel>,
    hub: Arc<LiveConnectionHub>,
}

impl LiveEventConsumer {
    pub fn new(channel: Arc<dyn LiveEventChannel>, hub: Arc<LiveConnectionHub>) -> Self {
        Self { channel, hub }
    }

    /// Runs until `shutdown` is cancelled or the subscription ends.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), BrokerError> {
        let mut consumer = self.channel.subscribe_live().await?;
        tracing::info!("Live event consumer started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Live event consumer stopping");
                    return Ok(());
                }
                next = consumer.next() => match next {
                    Some(Ok(delivery)) => {
                        self.forward(&delivery).await;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Live channel delivery failed");
                    }
                    None => {
                        tracing::warn!("Live channel subscription ended");
                        return Ok(());
                    }
                },
            }
        }
    }

    /// Routes one delivery. Returns `None` when the message is unusable.
    pub async fn forward(&self, delivery: &LiveDelivery) -> Option<DeliveryReport> {
        let Some(recipient) = recipient_from_routing_key(&delivery.routing_key) else {
            tracing::warn!(routing_key = %delivery.routing_key, "Unroutable live event");
            return None;
        };

        let event: FeedEvent = match serde_json::from_slice(&delivery.body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(recipient_id = %recipient, error = %e, "Malformed live event");
                return None;
            }
        };

        let frame = match post_frame(&event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode post frame");
                return None;
            }
        };

        let report = self.hub.send(&recipient, frame).await;
        tracing::debug!(
            recipient_id = %recipient,
            post_id = %event.post_id,
            delivered = report.delivered,
            evicted = report.evicted,
            "Live event forwarded"
        );
        Some(report)
    }
}
