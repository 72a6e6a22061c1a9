//! WebSocket adapters for live feed notifications.
//!
//! # Architecture
//!
//! ```text
//!  broker live channel (feed.event.#)          event bus (optional)
//!              │                                       │
//!              ▼                                       ▼
//!     ┌───────────────────┐               ┌────────────────────────┐
//!     │ LiveEventConsumer │               │ DirectBroadcastHandler │
//!     └───────────────────┘               └────────────────────────┘
//!              │ send(recipient)                       │ broadcast
//!              ▼                                       ▼
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                    LiveConnectionHub                        │
//!     │   alice: conn-1, conn-2        bob: conn-3                  │
//!     └─────────────────────────────────────────────────────────────┘
//!              │ bounded buffer per connection
//!              ▼
//!        ws_handler write pump → client
//! ```
//!
//! # Components
//!
//! - [`hub`] - Connection registry and backpressure policy
//! - [`messages`] - Envelope protocol types
//! - [`handler`] - Axum WebSocket upgrade handler
//! - [`live_consumer`] - Broker live channel to hub
//! - [`event_bridge`] - Optional direct broadcast from the event bus

pub mod event_bridge;
pub mod handler;
pub mod hub;
pub mod live_consumer;
pub mod messages;

pub use event_bridge::DirectBroadcastHandler;
pub use handler::{websocket_router, ws_handler, WebSocketState};
pub use hub::{
    ConnectionId, DeliveryReport, HubError, LiveConnectionHub, Registration,
    DEFAULT_OUTBOUND_CAPACITY,
};
pub use live_consumer::LiveEventConsumer;
pub use messages::{post_frame, ClientEnvelope, PostPayload, ServerMessage};
