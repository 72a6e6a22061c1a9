//! MaterializationWorker - the durable task consumer loop.
//!
//! Settlement per delivery:
//! - success: ack
//! - malformed payload: reject, never requeued
//! - storage failure: nack with requeue, bounded by the broker's redelivery policy

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::ports::{BrokerError, TaskDelivery, TaskQueue};

use super::materializer::{FeedMaterializer, MaterializeError};

/// Deliveries processed concurrently.
pub const DEFAULT_WORKER_CONCURRENCY: usize = 8;

/// Pause after a failed receive before asking again.
const RECEIVE_ERROR_DELAY: Duration = Duration::from_secs(1);

/// How one delivery was settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Rejected,
    Requeued,
}

#[derive(Debug, Default)]
struct Counters {
    acked: AtomicU64,
    rejected: AtomicU64,
    requeued: AtomicU64,
}

/// Snapshot of worker activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub acked: u64,
    pub rejected: u64,
    pub requeued: u64,
}

pub struct MaterializationWorker {
    queue: Arc<dyn TaskQueue>,
    materializer: Arc<FeedMaterializer>,
    permits: Arc<Semaphore>,
    concurrency: usize,
    counters: Arc<Counters>,
}

impl MaterializationWorker {
    pub fn new(queue: Arc<dyn TaskQueue>, materializer: Arc<FeedMaterializer>) -> Self {
        Self::with_concurrency(queue, materializer, DEFAULT_WORKER_CONCURRENCY)
    }

    pub fn with_concurrency(
        queue: Arc<dyn TaskQueue>,
        materializer: Arc<FeedMaterializer>,
        concurrency: usize,
    ) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            queue,
            materializer,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            acked: self.counters.acked.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            requeued: self.counters.requeued.load(Ordering::Relaxed),
        }
    }

    /// Consumes tasks until `shutdown` is cancelled or the queue closes.
    ///
    /// In-flight tasks are left to finish on their own; their deliveries are
    /// still settled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), BrokerError> {
        let mut consumer = self.queue.consume_tasks().await?;
        info!(concurrency = self.concurrency, "Materialization worker started");

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let delivery = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = consumer.next() => match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => {
                        warn!(error = %e, "Failed to receive feed task");
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(RECEIVE_ERROR_DELAY) => continue,
                        }
                    }
                    None => {
                        warn!("Task queue subscription ended");
                        break;
                    }
                },
            };

            let materializer = Arc::clone(&self.materializer);
            let counters = Arc::clone(&self.counters);
            tokio::spawn(async move {
                let _permit = permit;
                match settle(&materializer, delivery).await {
                    Settlement::Acked => counters.acked.fetch_add(1, Ordering::Relaxed),
                    Settlement::Rejected => counters.rejected.fetch_add(1, Ordering::Relaxed),
                    Settlement::Requeued => counters.requeued.fetch_add(1, Ordering::Relaxed),
                };
            });
        }

        info!("Materialization worker stopped accepting tasks");
        Ok(())
    }
}

/// Materializes one delivery and settles it with the broker.
pub async fn settle(materializer: &FeedMaterializer, delivery: TaskDelivery) -> Settlement {
    let redelivered = delivery.redelivered;
    let (settlement, outcome) = match materializer.materialize(&delivery.body).await {
        Ok(_) => (Settlement::Acked, delivery.ack().await),
        Err(e @ MaterializeError::Malformed(_)) => {
            error!(error = %e, redelivered, "Rejecting malformed feed task");
            (Settlement::Rejected, delivery.reject().await)
        }
        Err(e @ MaterializeError::Storage { .. }) => {
            warn!(error = %e, redelivered, "Feed task failed, requeueing");
            (Settlement::Requeued, delivery.requeue().await)
        }
    };

    if let Err(e) = outcome {
        warn!(settlement = ?settlement, error = %e, "Failed to settle feed task");
    }
    settlement
}
