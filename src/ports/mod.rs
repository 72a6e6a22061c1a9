//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the application layer and the outside world. Adapters implement these ports.
//!
//! ## Event Ports
//!
//! - `EventPublisher` - Fire-and-forget publishing with observable dispatch
//! - `EventSubscriber` / `EventHandler` - Subscription by event kind
//!
//! ## Pipeline Ports
//!
//! - `AudienceResolver` - Connections of an author
//! - `TaskQueue` / `LiveEventChannel` / `MessageBroker` - Durable tasks and live routing
//! - `FeedStore` - Materialized feed rows
//! - `FeedJobRepository` - Materialization audit records
//!
//! ## Edge Ports
//!
//! - `TokenValidator` - Bearer credential validation

mod audience_resolver;
mod event_publisher;
mod event_subscriber;
mod feed_store;
mod job_repository;
mod message_broker;
mod token_validator;

pub use audience_resolver::AudienceResolver;
pub use event_publisher::{
    DispatchHandle, DispatchReport, EventPublisher, HandlerOutcome, HandlerResult,
};
pub use event_subscriber::{EventBus, EventHandler, EventSubscriber};
pub use feed_store::FeedStore;
pub use job_repository::FeedJobRepository;
pub use message_broker::{
    live_routing_key, recipient_from_routing_key, Acknowledger, BrokerError, LiveConsumer,
    LiveDelivery, LiveEventChannel, MessageBroker, TaskConsumer, TaskDelivery, TaskQueue,
    LIVE_BINDING_PATTERN, LIVE_ROUTING_PREFIX,
};
pub use token_validator::TokenValidator;
