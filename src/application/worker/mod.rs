//! Materialization: durable tasks into per-recipient feed rows.

mod materializer;
mod runner;
mod sweeper;

pub use materializer::{decode_task, FeedChange, FeedMaterializer, MaterializeError, Materialized};
pub use runner::{settle, MaterializationWorker, Settlement, WorkerStats, DEFAULT_WORKER_CONCURRENCY};
pub use sweeper::{StaleJobSweeper, DEFAULT_STALE_JOB_TIMEOUT, DEFAULT_SWEEP_INTERVAL};
