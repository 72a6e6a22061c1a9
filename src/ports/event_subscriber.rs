//! EventSubscriber port - Interface for subscribing to domain events.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::feed::{EventKind, FeedDomainEvent};
use crate::domain::foundation::DomainError;

/// Handler for processing domain events.
///
/// Handlers are invoked concurrently with their siblings; an error or
/// panic in one never reaches the others or the publisher.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process an event.
    async fn handle(&self, event: &FeedDomainEvent) -> Result<(), DomainError>;

    /// Handler name for logging and dispatch reports.
    fn name(&self) -> &'static str;
}

/// Port for subscribing to domain events.
///
/// Subscriptions are expected to be registered at startup.
pub trait EventSubscriber: Send + Sync {
    /// Subscribe handler to a specific event kind.
    fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>);

    /// Subscribe the same handler to several event kinds.
    fn subscribe_all(&self, kinds: &[EventKind], handler: Arc<dyn EventHandler>) {
        for kind in kinds {
            self.subscribe(*kind, handler.clone());
        }
    }
}

/// Combined trait for event bus implementations.
pub trait EventBus: super::EventPublisher + EventSubscriber {}

// Blanket implementation - any type that implements both traits is an EventBus
impl<T: super::EventPublisher + EventSubscriber> EventBus for T {}
