//! Direct live-push path: broadcasts every new post to all live sockets.
//!
//! Disabled by default. With it enabled a recipient can be notified twice,
//! once here and once through the live channel.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::feed::{EventKind, FeedDomainEvent, FeedEvent};
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{EventHandler, EventSubscriber};

use super::hub::LiveConnectionHub;
use super::messages::post_frame;

pub struct DirectBroadcastHandler {
    hub: Arc<LiveConnectionHub>,
}

impl DirectBroadcastHandler {
    pub fn new_shared(hub: Arc<LiveConnectionHub>) -> Arc<Self> {
        Arc::new(Self { hub })
    }

    pub fn register(self: &Arc<Self>, subscriber: &dyn EventSubscriber) {
        subscriber.subscribe(EventKind::PostCreated, self.clone());
    }
}

#[async_trait]
impl EventHandler for DirectBroadcastHandler {
    async fn handle(&self, event: &FeedDomainEvent) -> Result<(), DomainError> {
        let FeedDomainEvent::PostCreated(created) = event;

        let frame = post_frame(&FeedEvent::from(created)).map_err(|e| {
            DomainError::new(ErrorCode::InternalError, format!("encode post frame: {}", e))
        })?;
        let report = self.hub.broadcast(frame).await;

        tracing::debug!(
            post_id = %created.post_id,
            delivered = report.delivered,
            evicted = report.evicted,
            "Post broadcast to live connections"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "DirectBroadcastHandler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::InProcessEventBus;
    use crate::domain::feed::PostCreatedEvent;
    use crate::domain::foundation::{PostId, UserId};
    use crate::ports::EventPublisher;

    #[tokio::test]
    async fn post_created_is_broadcast_to_everyone() {
        let hub = Arc::new(LiveConnectionHub::default());
        let mut alice = hub.register(UserId::new("alice").unwrap()).await.unwrap();
        let mut bob = hub.register(UserId::new("bob").unwrap()).await.unwrap();

        let bus = InProcessEventBus::new();
        DirectBroadcastHandler::new_shared(hub.clone()).register(&bus);

        let event = PostCreatedEvent::new(
            PostId::new("p-1").unwrap(),
            UserId::new("author").unwrap(),
            "hi",
        );
        let report = bus.publish(event.into()).wait().await;

        assert!(report.is_success());
        assert!(alice.outbound.recv().await.unwrap().contains("p-1"));
        assert!(bob.outbound.recv().await.unwrap().contains("p-1"));
    }
}
