//! PostCreatedHandler - runs the fan-out for every post published on the bus.
//!
//! The handler returns once the audience is resolved. Publishing to the
//! selected recipients continues on a background task owned by the scheduler.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::feed::{EventKind, FeedDomainEvent};
use crate::domain::foundation::DomainError;
use crate::ports::{EventHandler, EventSubscriber};

use super::scheduler::FanoutScheduler;

pub struct PostCreatedHandler {
    scheduler: Arc<FanoutScheduler>,
}

impl PostCreatedHandler {
    pub fn new(scheduler: Arc<FanoutScheduler>) -> Self {
        Self { scheduler }
    }

    /// Subscribes a new handler for `post.created` on `subscriber`.
    pub fn register(scheduler: Arc<FanoutScheduler>, subscriber: &dyn EventSubscriber) {
        subscriber.subscribe(EventKind::PostCreated, Arc::new(Self::new(scheduler)));
    }
}

#[async_trait]
impl EventHandler for PostCreatedHandler {
    async fn handle(&self, event: &FeedDomainEvent) -> Result<(), DomainError> {
        let FeedDomainEvent::PostCreated(post) = event;
        let plan = self.scheduler.plan(post).await?;
        if !plan.is_empty() {
            self.scheduler.spawn_delivery(plan);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "PostCreatedHandler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::broker::InMemoryBroker;
    use crate::adapters::events::InProcessEventBus;
    use crate::adapters::memory::InMemoryAudienceResolver;
    use crate::domain::feed::PostCreatedEvent;
    use crate::domain::foundation::{ErrorCode, PostId, UserId};
    use crate::ports::{EventPublisher, HandlerResult};

    fn setup(
        resolver: InMemoryAudienceResolver,
    ) -> (InProcessEventBus, InMemoryBroker, Arc<FanoutScheduler>) {
        let broker = InMemoryBroker::new();
        let scheduler = Arc::new(FanoutScheduler::new(
            Arc::new(resolver),
            Arc::new(broker.clone()),
            Arc::new(broker.clone()),
        ));
        let bus = InProcessEventBus::new();
        PostCreatedHandler::register(scheduler.clone(), &bus);
        (bus, broker, scheduler)
    }

    fn post() -> FeedDomainEvent {
        PostCreatedEvent::new(
            PostId::new("p-9").unwrap(),
            UserId::new("author").unwrap(),
            "news",
        )
        .into()
    }

    #[tokio::test]
    async fn published_post_is_fanned_out() {
        let (bus, broker, scheduler) =
            setup(InMemoryAudienceResolver::new().with_connections("author", ["x", "y"]));

        let report = bus.publish(post()).wait().await;
        assert!(report.is_success());

        scheduler.drain().await;
        assert_eq!(broker.pending_tasks().len(), 2);
    }

    #[tokio::test]
    async fn resolver_failure_is_reported_to_publisher() {
        let resolver = InMemoryAudienceResolver::new();
        resolver.set_unavailable(true);
        let (bus, broker, scheduler) = setup(resolver);

        let report = bus.publish(post()).wait().await;

        assert!(!report.is_success());
        assert_eq!(scheduler.deliveries_in_flight(), 0);
        match &report.outcomes[0].result {
            HandlerResult::Failed(err) => assert_eq!(err.code, ErrorCode::AudienceUnavailable),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(broker.pending_tasks().is_empty());
    }
}
