//! EventPublisher port - Interface for publishing domain events.
//!
//! Publishing is fire-and-forget: handlers run independently and the caller
//! never waits on them. The returned [`DispatchHandle`] can be awaited to
//! observe per-handler outcomes, or simply dropped.

use tokio::task::JoinHandle;

use crate::domain::feed::FeedDomainEvent;
use crate::domain::foundation::DomainError;

/// Port for publishing domain events.
pub trait EventPublisher: Send + Sync {
    /// Dispatch `event` to every handler subscribed to its kind.
    ///
    /// Must not block on handler execution.
    fn publish(&self, event: FeedDomainEvent) -> DispatchHandle;
}

/// How a single handler invocation ended.
#[derive(Debug, Clone)]
pub enum HandlerResult {
    Succeeded,
    Failed(DomainError),
    Panicked(String),
}

#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    pub handler: &'static str,
    pub result: HandlerResult,
}

/// Outcomes of every handler invoked for one publish.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<HandlerOutcome>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, HandlerResult::Succeeded))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Join handles of the handler tasks spawned for one publish.
///
/// Dropping the handle detaches the tasks; they keep running.
#[derive(Debug, Default)]
pub struct DispatchHandle {
    tasks: Vec<(&'static str, JoinHandle<HandlerResult>)>,
}

impl DispatchHandle {
    pub fn new(tasks: Vec<(&'static str, JoinHandle<HandlerResult>)>) -> Self {
        Self { tasks }
    }

    /// Handle for a publish that matched no subscribers.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn handler_count(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every handler and collects their outcomes.
    pub async fn wait(self) -> DispatchReport {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        for (handler, task) in self.tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(join_err) => HandlerResult::Panicked(join_err.to_string()),
            };
            outcomes.push(HandlerOutcome { handler, result });
        }
        DispatchReport { outcomes }
    }
}
