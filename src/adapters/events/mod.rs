//! Event bus adapters.
//!
//! - `InProcessEventBus` - Supervised, bounded, fire-and-forget dispatch

mod in_process;

pub use in_process::{EventBusConfig, EventBusStats, InProcessEventBus};
