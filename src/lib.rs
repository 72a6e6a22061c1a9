//! Feed Fanout - fan-out on write for social feeds
//!
//! When a post is created, the author's connections are resolved, sampled
//! down to a per-post cap and turned into prioritized durable tasks. Workers
//! materialize each task into the recipient's feed, while a live channel
//! pushes the post to any socket the recipient has open.
//!
//! - `domain` - ids, events, tasks, jobs and feed entries
//! - `ports` - traits the pipeline depends on
//! - `adapters` - broker, storage, HTTP and WebSocket implementations
//! - `application` - scheduler, worker and feed queries
//! - `config` / `telemetry` / `app` - process setup

pub mod adapters;
pub mod app;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
