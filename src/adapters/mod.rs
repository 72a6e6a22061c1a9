//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the pipeline to external systems:
//! - `auth` - Bearer token validation (JWT, mock)
//! - `broker` - Durable task queue and live channel (RabbitMQ, in-memory)
//! - `events` - In-process event bus
//! - `http` - Axum routes for the feed API
//! - `memory` - In-memory storage for tests and single-node runs
//! - `postgres` - PostgreSQL storage
//! - `websocket` - Live connection hub and socket handler

pub mod auth;
pub mod broker;
pub mod events;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod websocket;

pub use broker::{AmqpBroker, InMemoryBroker};
pub use events::InProcessEventBus;
pub use websocket::LiveConnectionHub;
