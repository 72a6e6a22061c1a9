//! Message broker adapters.
//!
//! - `InMemoryBroker` - Process-local queue and live channel (tests, single node)
//! - `AmqpBroker` - RabbitMQ via lapin with pooled connections

mod amqp;
mod in_memory;

pub use amqp::{amqp_priority, AmqpBroker, AmqpConfig};
pub use in_memory::{InMemoryBroker, InMemoryBrokerConfig};
