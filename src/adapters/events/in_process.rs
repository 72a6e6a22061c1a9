//! Supervised in-process event bus.
//!
//! Each handler invocation runs on its own tokio task, gated by a semaphore
//! so a burst of posts cannot spawn unbounded concurrent work. Errors and
//! panics are caught per handler, logged, and counted; they never reach
//! sibling handlers or the publisher.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `max_concurrent_handlers` | 64 | Handler invocations allowed to run at once |

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Semaphore;

use crate::domain::feed::{EventKind, FeedDomainEvent};
use crate::ports::{DispatchHandle, EventHandler, EventPublisher, EventSubscriber, HandlerResult};

/// Configuration for [`InProcessEventBus`].
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub max_concurrent_handlers: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            max_concurrent_handlers: 64,
        }
    }
}

impl EventBusConfig {
    pub fn with_max_concurrent_handlers(mut self, max: usize) -> Self {
        self.max_concurrent_handlers = max.max(1);
        self
    }
}

/// Point-in-time copy of the bus counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventBusStats {
    pub published: u64,
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub panicked: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

/// Event bus dispatching to handlers on spawned, bounded tasks.
///
/// `publish` must be called from within a tokio runtime.
pub struct InProcessEventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Arc<dyn EventHandler>>>>,
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
}

impl InProcessEventBus {
    /// Creates a bus with default configuration.
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    pub fn with_config(config: EventBusConfig) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            permits: Arc::new(Semaphore::new(config.max_concurrent_handlers.max(1))),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            published: self.counters.published.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }

    /// Number of handlers subscribed to `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&kind)
            .map_or(0, Vec::len)
    }

    fn handlers_for(&self, kind: EventKind) -> Vec<Arc<dyn EventHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for InProcessEventBus {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_handler(
    handler: Arc<dyn EventHandler>,
    event: Arc<FeedDomainEvent>,
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
) -> HandlerResult {
    // The semaphore is never closed, so acquisition only fails on shutdown races.
    let _permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return HandlerResult::Panicked("handler pool closed".to_string()),
    };

    let outcome = AssertUnwindSafe(handler.handle(&event)).catch_unwind().await;

    match outcome {
        Ok(Ok(())) => {
            counters.succeeded.fetch_add(1, Ordering::Relaxed);
            HandlerResult::Succeeded
        }
        Ok(Err(err)) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                handler = handler.name(),
                event = %event.kind(),
                error = %err,
                "Event handler failed"
            );
            HandlerResult::Failed(err)
        }
        Err(panic) => {
            counters.panicked.fetch_add(1, Ordering::Relaxed);
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(
                handler = handler.name(),
                event = %event.kind(),
                panic = %message,
                "Event handler panicked"
            );
            HandlerResult::Panicked(message)
        }
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: FeedDomainEvent) -> DispatchHandle {
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        let kind = event.kind();
        let handlers = self.handlers_for(kind);
        if handlers.is_empty() {
            tracing::debug!(event = %kind, "No handlers subscribed");
            return DispatchHandle::empty();
        }

        let event = Arc::new(event);
        let tasks = handlers
            .into_iter()
            .map(|handler| {
                self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                let name = handler.name();
                let task = tokio::spawn(run_handler(
                    handler,
                    Arc::clone(&event),
                    Arc::clone(&self.permits),
                    Arc::clone(&self.counters),
                ));
                (name, task)
            })
            .collect();

        DispatchHandle::new(tasks)
    }
}

impl EventSubscriber for InProcessEventBus {
    fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        tracing::debug!(event = %kind, handler = handler.name(), "Handler subscribed");
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(kind)
            .or_default()
            .push(handler);
    }
}
